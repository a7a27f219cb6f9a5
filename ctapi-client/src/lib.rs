//! # ctapi-client
//!
//! Handle-indexed tag lists with batch refresh for CtApi SCADA links.
//!
//! The vendor driver is an external collaborator behind the traits in
//! [`backend::connector`]. On top of it the crate provides:
//! - [`Session`]: scoped ownership of one open connection
//! - [`TagList`]: name → handle mapping, one-round-trip refresh, and a
//!   local value snapshot
//! - [`CtApiClient`]: an async [`TagListProvider`] that runs a session on a
//!   dedicated worker thread with per-request timeouts
//!
//! ## Features
//! - `simulator` (default): in-memory server, [`SimConnector`]
//! - `test-support`: enables `MockTagListProvider` and `MockConnectedList`
//!   via `mockall`

pub mod backend;
mod client;
mod config;
mod errors;
mod helpers;
mod provider;
mod session;
mod tag_list;
mod typedefs;
mod worker;

// Stable public API
pub use backend::connector::{ConnectedList, ConnectedSession, CtConnector};
pub use client::CtApiClient;
pub use config::SessionConfig;
pub use errors::{CtError, CtResult, CtStatus, format_status, friendly_status_hint};
pub use helpers::describe_remote;
pub use provider::{TagListProvider, read_tags};
pub use session::Session;
pub use tag_list::TagList;
pub use typedefs::{ConnectParams, OpenFlags, TagHandle, TagValue};

#[cfg(feature = "simulator")]
pub use backend::sim::SimConnector;

// Test support re-export
#[cfg(feature = "test-support")]
pub use backend::connector::MockConnectedList;
#[cfg(feature = "test-support")]
pub use provider::MockTagListProvider;
