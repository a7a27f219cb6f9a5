//! Transport backends for the tag-list core.
//!
//! The simulator is gated behind the `simulator` feature.

pub mod connector;

#[cfg(feature = "simulator")]
pub mod sim;
