//! Scoped ownership of a remote session.
//!
//! Ensures the remote close is called exactly once per successful open,
//! whether the caller closes explicitly, returns early, or panics.

use crate::backend::connector::{ConnectedSession, CtConnector};
use crate::errors::{CtError, CtResult};
use crate::helpers::describe_remote;
use crate::tag_list::TagList;
use crate::typedefs::ConnectParams;

/// Drop guard for an open CtApi session.
///
/// [`Session::open`] opens the connection; [`Session::close`] consumes the
/// guard and reports the close result. A guard dropped without `close`
/// still closes the session and logs any failure.
///
/// Tag lists created by [`Session::new_list`] borrow the session, so the
/// compiler rejects closing a session while one of its lists is alive.
#[derive(Debug)]
pub struct Session<S: ConnectedSession> {
    inner: Option<S>,
    address: String,
}

impl<S: ConnectedSession> Session<S> {
    /// Open a session through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`CtError::Connection`] if the remote open fails.
    pub fn open<C>(connector: &C, params: &ConnectParams) -> CtResult<Self>
    where
        C: CtConnector<Session = S>,
    {
        let span = tracing::info_span!(
            "ctapi.open",
            address = %params.address,
            user = %params.user,
            flags = ?params.flags
        );
        let _enter = span.enter();

        let inner = connector.open(params).map_err(|e| {
            let msg = describe_remote(&e);
            tracing::error!(error = %msg, "Failed to open session");
            CtError::Connection(msg)
        })?;

        tracing::info!("Session opened");
        Ok(Self {
            inner: Some(inner),
            address: params.address.clone(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Create a tag list bound to this session.
    ///
    /// # Errors
    ///
    /// Returns [`CtError::Connection`] if the remote side cannot allocate
    /// the list.
    pub fn new_list(&self) -> CtResult<TagList<'_, S::List>> {
        let inner = self.inner.as_ref().ok_or(CtError::SessionClosed)?;
        let list = inner.new_list().map_err(|e| {
            let msg = describe_remote(&e);
            tracing::warn!(address = %self.address, error = %msg, "Failed to create tag list");
            CtError::Connection(msg)
        })?;
        tracing::debug!(address = %self.address, "Tag list created");
        Ok(TagList::from_remote(list))
    }

    /// Close the session and report the result.
    ///
    /// # Errors
    ///
    /// Returns [`CtError::Connection`] if the remote close fails. The
    /// session is considered closed either way.
    pub fn close(mut self) -> CtResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> CtResult<()> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };
        let span = tracing::info_span!("ctapi.close", address = %self.address);
        let _enter = span.enter();

        inner.close().map_err(|e| {
            let msg = describe_remote(&e);
            tracing::warn!(error = %msg, "Session close failed");
            CtError::Connection(msg)
        })?;
        tracing::info!("Session closed");
        Ok(())
    }
}

impl<S: ConnectedSession> Drop for Session<S> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::debug!(address = %self.address, "Session dropped without close, closing");
            // Failure is already logged by `shutdown`.
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::connector::MockConnectedList;
    use crate::typedefs::OpenFlags;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingConnector {
        fail_close: bool,
    }

    #[derive(Debug)]
    struct CountingSession {
        closes: Rc<Cell<u32>>,
        fail_close: bool,
    }

    impl ConnectedSession for CountingSession {
        type List = MockConnectedList;

        fn new_list(&self) -> anyhow::Result<MockConnectedList> {
            let mut list = MockConnectedList::new();
            list.expect_release().returning(|| Ok(()));
            Ok(list)
        }

        fn close(&mut self) -> anyhow::Result<()> {
            self.closes.set(self.closes.get() + 1);
            if self.fail_close {
                anyhow::bail!("link down");
            }
            Ok(())
        }
    }

    impl CtConnector for CountingConnector {
        type Session = CountingSession;

        fn open(&self, params: &ConnectParams) -> anyhow::Result<CountingSession> {
            if params.address.is_empty() {
                anyhow::bail!("no address");
            }
            Ok(CountingSession {
                closes: Rc::new(Cell::new(0)),
                fail_close: self.fail_close,
            })
        }
    }

    fn params(address: &str) -> ConnectParams {
        ConnectParams {
            address: address.into(),
            user: "view".into(),
            password: "view".into(),
            flags: OpenFlags::READ_ONLY,
        }
    }

    fn open_counting(fail_close: bool) -> (Session<CountingSession>, Rc<Cell<u32>>) {
        let session = Session::open(&CountingConnector { fail_close }, &params("localhost"))
            .expect("open should succeed");
        let closes = Rc::clone(&session.inner.as_ref().unwrap().closes);
        (session, closes)
    }

    #[test]
    fn open_failure_is_connection_error() {
        let err = Session::open(&CountingConnector { fail_close: false }, &params(""))
            .unwrap_err();
        assert!(matches!(err, CtError::Connection(msg) if msg == "no address"));
    }

    #[test]
    fn explicit_close_closes_once() {
        let (session, closes) = open_counting(false);
        assert_eq!(session.address(), "localhost");
        session.close().unwrap();
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn drop_closes_once() {
        let (session, closes) = open_counting(false);
        drop(session);
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn failed_close_is_reported_and_not_repeated_on_drop() {
        let (session, closes) = open_counting(true);
        let err = session.close().unwrap_err();
        assert!(matches!(err, CtError::Connection(_)));
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn close_on_error_path_via_drop() {
        fn failing_operation(session: &Session<CountingSession>) -> CtResult<()> {
            let _list = session.new_list()?;
            Err(CtError::Refresh("simulated".into()))
        }

        let (session, closes) = open_counting(false);
        let result = failing_operation(&session);
        assert!(result.is_err());
        drop(session);
        assert_eq!(closes.get(), 1);
    }
}
