use crate::errors::CtResult;
use crate::typedefs::{TagHandle, TagValue};
use async_trait::async_trait;

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

/// Async trait for tag-list operations against one session.
///
/// This is the stable public API. Implementations serialize every call
/// against the underlying list, so callers may share one provider between
/// tasks.
#[cfg_attr(any(test, feature = "test-support"), automock)]
#[async_trait]
pub trait TagListProvider: Send + Sync {
    /// Subscribe a tag by name.
    ///
    /// # Errors
    /// Returns `Err` if the name is empty or the remote side rejects it.
    async fn add_tag(&self, tag: &str) -> CtResult<TagHandle>;

    /// Remove a subscription. `Ok(false)` means there was nothing to remove.
    ///
    /// # Errors
    /// Returns `Err` if the remote unsubscribe call fails.
    async fn delete_tag(&self, handle: TagHandle) -> CtResult<bool>;

    /// Remove a subscription by tag name. Unknown names return `Ok(false)`.
    ///
    /// # Errors
    /// Returns `Err` if the remote unsubscribe call fails.
    async fn delete_tag_by_name(&self, tag: &str) -> CtResult<bool>;

    /// Refresh every subscribed tag in one round-trip.
    ///
    /// # Errors
    /// Returns `Err` if the batch refresh fails; no value is updated then.
    async fn read(&self) -> CtResult<()>;

    /// Value of `handle` from the last successful [`read`](Self::read).
    ///
    /// # Errors
    /// Returns `Err` for unknown, removed, or not-yet-refreshed handles.
    async fn get_float_value(&self, handle: TagHandle) -> CtResult<f64>;

    /// Like [`get_float_value`](Self::get_float_value), with name and time.
    ///
    /// # Errors
    /// Same as [`get_float_value`](Self::get_float_value).
    async fn get_value(&self, handle: TagHandle) -> CtResult<TagValue>;

    /// Every refreshed value, sorted by tag name.
    ///
    /// # Errors
    /// Returns `Err` if the session is closed or unreachable.
    async fn values(&self) -> CtResult<Vec<TagValue>>;

    /// Subscribed tags and their handles, sorted by tag name.
    ///
    /// # Errors
    /// Returns `Err` if the session is closed or unreachable.
    async fn tags(&self) -> CtResult<Vec<(String, TagHandle)>>;

    /// Close the session. Safe to call more than once.
    ///
    /// # Errors
    /// Returns `Err` if the remote close fails.
    async fn close(&self) -> CtResult<()>;
}

/// Subscribe `tags` (if not already), refresh once, and return their values
/// in the order given.
///
/// # Errors
///
/// Returns the first subscription error, the refresh error, or the first
/// value error encountered.
pub async fn read_tags(provider: &dyn TagListProvider, tags: &[&str]) -> CtResult<Vec<TagValue>> {
    let mut handles = Vec::with_capacity(tags.len());
    for tag in tags {
        handles.push(provider.add_tag(tag).await?);
    }
    provider.read().await?;

    let mut values = Vec::with_capacity(handles.len());
    for handle in handles {
        values.push(provider.get_value(handle).await?);
    }
    tracing::debug!(count = values.len(), "read_tags completed");
    Ok(values)
}
