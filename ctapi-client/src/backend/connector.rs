//! Seam between the tag-list core and the vendor driver.
//!
//! The three traits mirror the CtApi call chain: a connector opens a
//! session, a session creates lists, and a list subscribes tags and
//! refreshes them in one batch. Errors are plain `anyhow` errors; the core
//! classifies them into [`CtError`](crate::CtError) by the operation that
//! failed. Attach a [`CtStatus`](crate::CtStatus) to get friendly hints.

use crate::typedefs::{ConnectParams, TagHandle};

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

pub trait CtConnector: Send + Sync {
    type Session: ConnectedSession;

    /// Open a session to the server described by `params`.
    fn open(&self, params: &ConnectParams) -> anyhow::Result<Self::Session>;
}

pub trait ConnectedSession {
    type List: ConnectedList;

    /// Create an empty tag list bound to this session.
    fn new_list(&self) -> anyhow::Result<Self::List>;

    /// Close the session. Called exactly once by [`Session`](crate::Session).
    fn close(&mut self) -> anyhow::Result<()>;
}

#[cfg_attr(any(test, feature = "test-support"), automock)]
pub trait ConnectedList {
    fn subscribe(&mut self, tag: &str) -> anyhow::Result<TagHandle>;

    /// Returns `Ok(false)` when the remote side had nothing to remove.
    fn unsubscribe(&mut self, handle: TagHandle) -> anyhow::Result<bool>;

    /// Refresh every handle in `handles` in one round-trip.
    fn batch_refresh(&mut self, handles: &[TagHandle]) -> anyhow::Result<()>;

    /// Value of `handle` as of the last `batch_refresh`.
    fn fetch_value(&self, handle: TagHandle) -> anyhow::Result<f64>;

    fn release(&mut self) -> anyhow::Result<()>;
}
