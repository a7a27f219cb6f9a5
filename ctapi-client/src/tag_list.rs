//! Handle-indexed tag list with batch refresh.
//!
//! A [`TagList`] maps tag names to the opaque handles the remote side
//! assigns, and keeps a local snapshot of the values fetched by the last
//! successful [`TagList::read`]. Values are only ever read from that
//! snapshot; the remote round-trip happens once per `read`.
//!
//! A handle moves through `Unregistered → Active → Refreshed → Removed`.
//! Reading a removed (or never added) handle is always
//! [`CtError::UnknownHandle`]; there is no zero fallback.

use crate::backend::connector::ConnectedList;
use crate::errors::{CtError, CtResult};
use crate::helpers::{describe_remote, format_refresh_time, normalize_tag_name};
use crate::typedefs::{TagHandle, TagValue};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::marker::PhantomData;

#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    values: HashMap<TagHandle, f64>,
    refreshed_at: Option<DateTime<Local>>,
    generation: u64,
}

/// A set of tag subscriptions bound to one [`Session`](crate::Session).
///
/// Mutating calls take `&mut self`, so a list has a single writer; value
/// reads take `&self` and may be shared between readers between refreshes.
#[derive(Debug)]
pub struct TagList<'s, L: ConnectedList> {
    remote: L,
    by_name: HashMap<String, TagHandle>,
    by_handle: HashMap<TagHandle, String>,
    snapshot: Snapshot,
    released: bool,
    _session: PhantomData<&'s ()>,
}

impl<L: ConnectedList> TagList<'_, L> {
    pub(crate) fn from_remote(remote: L) -> Self {
        Self {
            remote,
            by_name: HashMap::new(),
            by_handle: HashMap::new(),
            snapshot: Snapshot::default(),
            released: false,
            _session: PhantomData,
        }
    }

    /// Subscribe `name` and return its handle.
    ///
    /// Adding a name that is already in the list returns its existing
    /// handle without a remote call. The name is trimmed first.
    ///
    /// # Errors
    ///
    /// - [`CtError::InvalidTagName`] if `name` is empty or whitespace.
    /// - [`CtError::Subscription`] if the remote side rejects the tag, or
    ///   hands back a handle already used by another tag in this list.
    ///
    /// The list is unchanged on error.
    pub fn add(&mut self, name: &str) -> CtResult<TagHandle> {
        let tag = normalize_tag_name(name)
            .ok_or_else(|| CtError::InvalidTagName(name.to_string()))?;
        if let Some(&handle) = self.by_name.get(tag) {
            tracing::debug!(tag = %tag, handle = %handle, "Tag already in list");
            return Ok(handle);
        }

        let span = tracing::info_span!("ctapi.add", tag = %tag);
        let _enter = span.enter();

        let handle = self.remote.subscribe(tag).map_err(|e| {
            let reason = describe_remote(&e);
            tracing::warn!(error = %reason, "Remote side rejected tag");
            CtError::Subscription {
                tag: tag.to_string(),
                reason,
            }
        })?;

        if let Some(owner) = self.by_handle.get(&handle) {
            tracing::warn!(handle = %handle, owner = %owner, "Remote handle already in use");
            return Err(CtError::Subscription {
                tag: tag.to_string(),
                reason: format!("remote returned handle {handle} already held by '{owner}'"),
            });
        }

        self.by_name.insert(tag.to_string(), handle);
        self.by_handle.insert(handle, tag.to_string());
        tracing::info!(handle = %handle, "Tag added");
        Ok(handle)
    }

    /// Remove the subscription for `handle`.
    ///
    /// Returns `Ok(true)` if the remote side confirmed the removal and
    /// `Ok(false)` if there was nothing to remove: either the handle is not
    /// in this list (no remote call is made), or the remote side no longer
    /// knew it (the stale local entry is dropped).
    ///
    /// # Errors
    ///
    /// Returns [`CtError::Subscription`] if the remote call fails; the
    /// list is unchanged.
    pub fn delete(&mut self, handle: TagHandle) -> CtResult<bool> {
        let Some(tag) = self.by_handle.get(&handle).cloned() else {
            tracing::debug!(handle = %handle, "Delete of unknown handle ignored");
            return Ok(false);
        };

        let span = tracing::info_span!("ctapi.delete", tag = %tag, handle = %handle);
        let _enter = span.enter();

        let confirmed = self.remote.unsubscribe(handle).map_err(|e| {
            let reason = describe_remote(&e);
            tracing::warn!(error = %reason, "Remote unsubscribe failed");
            CtError::Subscription {
                tag: tag.clone(),
                reason,
            }
        })?;

        self.by_name.remove(&tag);
        self.by_handle.remove(&handle);
        self.snapshot.values.remove(&handle);

        if confirmed {
            tracing::info!("Tag removed");
        } else {
            tracing::warn!("Remote side had no subscription, dropped stale entry");
        }
        Ok(confirmed)
    }

    /// [`TagList::delete`] by tag name. Unknown names return `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Same as [`TagList::delete`].
    pub fn delete_by_name(&mut self, name: &str) -> CtResult<bool> {
        match normalize_tag_name(name).and_then(|tag| self.by_name.get(tag)) {
            Some(&handle) => self.delete(handle),
            None => Ok(false),
        }
    }

    /// Refresh every active tag in one batch round-trip.
    ///
    /// The snapshot is replaced only when the refresh and every value
    /// fetch succeed; on error every previously stored value is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CtError::Refresh`] if the batch call or any value fetch
    /// fails.
    pub fn read(&mut self) -> CtResult<()> {
        let next = self.refresh()?;
        self.swap_snapshot(next);
        tracing::info!(generation = self.snapshot.generation, "read completed");
        Ok(())
    }

    /// Batch refresh and fetch every value into a snapshot that is not yet
    /// installed. The current snapshot is untouched either way.
    pub(crate) fn refresh(&mut self) -> CtResult<Snapshot> {
        let mut handles: Vec<TagHandle> = self.by_handle.keys().copied().collect();
        handles.sort_unstable();

        let span = tracing::info_span!("ctapi.read", tag_count = handles.len());
        let _enter = span.enter();

        let mut values = HashMap::with_capacity(handles.len());
        if !handles.is_empty() {
            self.remote.batch_refresh(&handles).map_err(|e| {
                let msg = describe_remote(&e);
                tracing::warn!(error = %msg, "Batch refresh failed, snapshot kept");
                CtError::Refresh(msg)
            })?;

            for handle in &handles {
                let value = self.remote.fetch_value(*handle).map_err(|e| {
                    let tag = self.by_handle.get(handle).map_or("?", String::as_str);
                    let msg = format!("'{tag}': {}", describe_remote(&e));
                    tracing::warn!(error = %msg, "Value fetch failed, snapshot kept");
                    CtError::Refresh(msg)
                })?;
                values.insert(*handle, value);
            }
        }

        Ok(Snapshot {
            values,
            refreshed_at: Some(Local::now()),
            generation: self.snapshot.generation + 1,
        })
    }

    /// Install `next` and hand back the snapshot it replaced.
    pub(crate) fn swap_snapshot(&mut self, next: Snapshot) -> Snapshot {
        std::mem::replace(&mut self.snapshot, next)
    }

    /// Value of `handle` from the last successful [`TagList::read`].
    ///
    /// # Errors
    ///
    /// - [`CtError::UnknownHandle`] if the handle was never added or has
    ///   been removed.
    /// - [`CtError::NotRefreshed`] if no `read` has succeeded since the
    ///   handle was added.
    /// - [`CtError::Conversion`] if the refreshed value is NaN or infinite.
    pub fn get_float_value(&self, handle: TagHandle) -> CtResult<f64> {
        if !self.by_handle.contains_key(&handle) {
            return Err(CtError::UnknownHandle(handle));
        }
        match self.snapshot.values.get(&handle) {
            None => Err(CtError::NotRefreshed(handle)),
            Some(value) if !value.is_finite() => Err(CtError::Conversion(format!(
                "value of {handle} is not a finite number ({value})"
            ))),
            Some(value) => Ok(*value),
        }
    }

    /// Like [`TagList::get_float_value`], with the tag name and refresh time.
    ///
    /// # Errors
    ///
    /// Same as [`TagList::get_float_value`].
    pub fn get_value(&self, handle: TagHandle) -> CtResult<TagValue> {
        let value = self.get_float_value(handle)?;
        let tag = self
            .by_handle
            .get(&handle)
            .cloned()
            .ok_or(CtError::UnknownHandle(handle))?;
        Ok(TagValue {
            tag,
            handle,
            value,
            refreshed_at: self
                .snapshot
                .refreshed_at
                .map_or_else(String::new, format_refresh_time),
        })
    }

    /// Every refreshed, finite value, sorted by tag name.
    pub fn values(&self) -> Vec<TagValue> {
        self.tags()
            .into_iter()
            .filter_map(|(_, handle)| self.get_value(handle).ok())
            .collect()
    }

    pub fn handle(&self, name: &str) -> Option<TagHandle> {
        normalize_tag_name(name).and_then(|tag| self.by_name.get(tag).copied())
    }

    /// Active tags and their handles, sorted by tag name.
    pub fn tags(&self) -> Vec<(String, TagHandle)> {
        let mut tags: Vec<(String, TagHandle)> = self
            .by_name
            .iter()
            .map(|(name, handle)| (name.clone(), *handle))
            .collect();
        tags.sort();
        tags
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Local time of the last successful refresh.
    pub fn last_refresh(&self) -> Option<DateTime<Local>> {
        self.snapshot.refreshed_at
    }

    /// Number of successful refreshes so far.
    pub fn refresh_generation(&self) -> u64 {
        self.snapshot.generation
    }

    /// Free the list on the remote side.
    ///
    /// # Errors
    ///
    /// Returns [`CtError::Connection`] if the remote free fails.
    pub fn release(mut self) -> CtResult<()> {
        self.release_remote()
    }

    fn release_remote(&mut self) -> CtResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.remote.release().map_err(|e| {
            let msg = describe_remote(&e);
            tracing::warn!(error = %msg, tag_count = self.by_handle.len(), "Failed to release tag list");
            CtError::Connection(msg)
        })?;
        tracing::debug!(tag_count = self.by_handle.len(), "Tag list released");
        Ok(())
    }
}

impl<L: ConnectedList> Drop for TagList<'_, L> {
    fn drop(&mut self) {
        // Failure is already logged by `release_remote`.
        let _ = self.release_remote();
    }
}
