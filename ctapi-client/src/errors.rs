use crate::typedefs::TagHandle;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for tag-list operations.
pub type CtResult<T> = Result<T, CtError>;

/// Centralized error enum for the CtApi client.
///
/// Remote failures are classified by the operation that hit them, so a
/// caller can tell "the link is down" from "that tag does not exist".
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CtError {
    /// Opening, closing, or creating a list on the session failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The remote side rejected adding or removing a tag.
    #[error("Subscription failed for '{tag}': {reason}")]
    Subscription { tag: String, reason: String },

    /// The batch round-trip failed. No value in the snapshot was changed.
    #[error("Refresh failed: {0}")]
    Refresh(String),

    /// The handle was never added to this list, or has been removed.
    #[error("Unknown tag handle {0}")]
    UnknownHandle(TagHandle),

    /// The handle is active but no refresh has completed since it was added.
    #[error("Tag handle {0} has not been refreshed yet")]
    NotRefreshed(TagHandle),

    /// Tag names must be non-empty.
    #[error("Invalid tag name: {0:?}")]
    InvalidTagName(String),

    /// The refreshed value cannot be represented as a finite float.
    #[error("Data conversion failed: {0}")]
    Conversion(String),

    /// A request did not complete within its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The session has already been closed.
    #[error("Session is closed")]
    SessionClosed,

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for CtError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Async task join failed: {err}"))
    }
}

/// Numeric status reported by the CtApi driver (a Win32 error code).
///
/// Transports attach this to the `anyhow::Error` they return so that the
/// core can add a friendly hint when it classifies the failure.
///
/// # Examples
///
/// ```
/// use ctapi_client::CtStatus;
/// let err = anyhow::Error::new(CtStatus { code: 5 }).context("ctOpen failed");
/// assert_eq!(ctapi_client::describe_remote(&err),
///     "ctOpen failed: CtApi status 5 (Access denied — check the user name and password)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("CtApi status {code}")]
pub struct CtStatus {
    pub code: u32,
}

/// Maps well-known CtApi status codes to actionable user hints.
pub fn friendly_status_hint(code: u32) -> Option<&'static str> {
    match code {
        2 => Some("Tag not found in the SCADA project"),
        5 => Some("Access denied — check the user name and password"),
        6 => Some("Invalid handle — the session or list is no longer valid"),
        53 => Some("Network path not found — check the server address"),
        87 => Some("Invalid parameter passed to the driver"),
        1326 => Some("Logon failure — unknown user name or bad password"),
        1460 => Some("Driver timed out waiting for the server"),
        1722 => Some("RPC server unavailable — the target host may be offline"),
        _ => None,
    }
}

/// Helper to format a status code with its hint, if any.
pub fn format_status(code: u32) -> String {
    match friendly_status_hint(code) {
        Some(hint) => format!("{code}: {hint}"),
        None => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_status_with_and_without_hint() {
        assert_eq!(
            format_status(1722),
            "1722: RPC server unavailable — the target host may be offline"
        );
        assert_eq!(format_status(9999), "9999");
    }

    #[test]
    fn error_messages_name_the_failure() {
        let err = CtError::Subscription {
            tag: "Pump1_PV".into(),
            reason: "unknown tag".into(),
        };
        assert_eq!(err.to_string(), "Subscription failed for 'Pump1_PV': unknown tag");
        assert_eq!(
            CtError::UnknownHandle(TagHandle(3)).to_string(),
            "Unknown tag handle #3"
        );
        let timeout = CtError::Timeout {
            operation: "read",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(timeout.to_string(), "read timed out after 250ms");
    }
}
