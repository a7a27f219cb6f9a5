use crate::errors::{CtStatus, friendly_status_hint};
use chrono::{DateTime, Local};

/// Renders a transport error with its full context chain, adding a
/// friendly hint when a [`CtStatus`] is attached anywhere in the chain.
///
/// # Examples
/// ```
/// use ctapi_client::describe_remote;
///
/// let err = anyhow::anyhow!("socket closed").context("ctListRead failed");
/// assert_eq!(describe_remote(&err), "ctListRead failed: socket closed");
/// ```
pub fn describe_remote(err: &anyhow::Error) -> String {
    let hint = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<CtStatus>())
        .and_then(|status| friendly_status_hint(status.code));
    match hint {
        Some(hint) => format!("{err:#} ({hint})"),
        None => format!("{err:#}"),
    }
}

/// Format a refresh time as a local time string.
pub fn format_refresh_time(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Trimmed tag name, or `None` if nothing is left.
pub fn normalize_tag_name(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
