use crate::backend::connector::CtConnector;
use crate::config::SessionConfig;
use crate::errors::{CtError, CtResult};
use crate::provider::TagListProvider;
use crate::typedefs::{TagHandle, TagValue};
use crate::worker::{ListRequest, ListWorker};
use async_trait::async_trait;
use std::sync::Arc;

/// Concrete [`TagListProvider`] backed by a dedicated worker thread.
///
/// The worker owns the session and its tag list for the client's whole
/// life. Dropping the client without [`close`](TagListProvider::close)
/// still closes the session once pending requests drain.
pub struct CtApiClient {
    worker: ListWorker,
}

impl CtApiClient {
    /// Open a session through `connector` and create its tag list.
    ///
    /// # Errors
    ///
    /// Returns [`CtError::Connection`] if the session or list cannot be
    /// created, or [`CtError::Timeout`] if that takes longer than
    /// `config.request_timeout`.
    pub async fn connect<C: CtConnector + 'static>(
        connector: C,
        config: SessionConfig,
    ) -> CtResult<Self> {
        tracing::info!(address = %config.address, "Initializing CtApiClient...");
        let timeout = config.request_timeout;
        let connector = Arc::new(connector);
        let start = tokio::task::spawn_blocking(move || ListWorker::start(connector, &config));

        let worker = tokio::time::timeout(timeout, start)
            .await
            .map_err(|_| CtError::Timeout {
                operation: "open",
                timeout,
            })???;

        tracing::info!("CtApiClient initialized successfully");
        Ok(Self { worker })
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_closed()
    }
}

#[async_trait]
impl TagListProvider for CtApiClient {
    async fn add_tag(&self, tag: &str) -> CtResult<TagHandle> {
        let tag = tag.to_string();
        self.worker
            .send_request("add", |reply| ListRequest::Add { tag, reply })
            .await
    }

    async fn delete_tag(&self, handle: TagHandle) -> CtResult<bool> {
        self.worker
            .send_request("delete", |reply| ListRequest::Delete { handle, reply })
            .await
    }

    async fn delete_tag_by_name(&self, tag: &str) -> CtResult<bool> {
        let tag = tag.to_string();
        self.worker
            .send_request("delete", |reply| ListRequest::DeleteByName { tag, reply })
            .await
    }

    async fn read(&self) -> CtResult<()> {
        self.worker
            .send_request("read", |reply| ListRequest::Read { reply })
            .await
    }

    async fn get_float_value(&self, handle: TagHandle) -> CtResult<f64> {
        self.worker
            .send_request("get_float_value", |reply| ListRequest::GetFloatValue {
                handle,
                reply,
            })
            .await
    }

    async fn get_value(&self, handle: TagHandle) -> CtResult<TagValue> {
        self.worker
            .send_request("get_value", |reply| ListRequest::GetValue { handle, reply })
            .await
    }

    async fn values(&self) -> CtResult<Vec<TagValue>> {
        self.worker
            .send_request("values", |reply| ListRequest::Values { reply })
            .await
    }

    async fn tags(&self) -> CtResult<Vec<(String, TagHandle)>> {
        self.worker
            .send_request("tags", |reply| ListRequest::Tags { reply })
            .await
    }

    async fn close(&self) -> CtResult<()> {
        self.worker.close().await
    }
}
