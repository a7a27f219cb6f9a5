//! Dedicated thread that owns one session and its tag list.
//!
//! All requests arrive over a bounded channel and run one at a time, so
//! adds, deletes, refreshes, and value reads never interleave. Each reply
//! goes back on its own oneshot channel.
//!
//! Every request carries the caller's deadline. The worker skips requests
//! that expired in the queue, and undoes an add or a refresh whose caller
//! gave up before the reply could be delivered, so a `Timeout` leaves the
//! list as it was. Deletes cannot be undone once the remote side has
//! dropped the subscription; a retry then returns `Ok(false)`.

use crate::backend::connector::{ConnectedList, CtConnector};
use crate::config::SessionConfig;
use crate::errors::{CtError, CtResult};
use crate::session::Session;
use crate::tag_list::TagList;
use crate::typedefs::{ConnectParams, TagHandle, TagValue};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

pub enum ListRequest {
    Add {
        tag: String,
        reply: oneshot::Sender<CtResult<TagHandle>>,
    },
    Delete {
        handle: TagHandle,
        reply: oneshot::Sender<CtResult<bool>>,
    },
    DeleteByName {
        tag: String,
        reply: oneshot::Sender<CtResult<bool>>,
    },
    Read {
        reply: oneshot::Sender<CtResult<()>>,
    },
    GetFloatValue {
        handle: TagHandle,
        reply: oneshot::Sender<CtResult<f64>>,
    },
    GetValue {
        handle: TagHandle,
        reply: oneshot::Sender<CtResult<TagValue>>,
    },
    Values {
        reply: oneshot::Sender<CtResult<Vec<TagValue>>>,
    },
    Tags {
        reply: oneshot::Sender<CtResult<Vec<(String, TagHandle)>>>,
    },
    Close {
        reply: oneshot::Sender<CtResult<()>>,
    },
}

impl ListRequest {
    fn caller_gone(&self) -> bool {
        match self {
            Self::Add { reply, .. } => reply.is_closed(),
            Self::Delete { reply, .. } | Self::DeleteByName { reply, .. } => reply.is_closed(),
            Self::Read { reply } | Self::Close { reply } => reply.is_closed(),
            Self::GetFloatValue { reply, .. } => reply.is_closed(),
            Self::GetValue { reply, .. } => reply.is_closed(),
            Self::Values { reply } => reply.is_closed(),
            Self::Tags { reply } => reply.is_closed(),
        }
    }

    fn reject(self, err: CtError) {
        match self {
            Self::Add { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Self::Delete { reply, .. } | Self::DeleteByName { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Self::Read { reply } | Self::Close { reply } => {
                let _ = reply.send(Err(err));
            }
            Self::GetFloatValue { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Self::GetValue { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Self::Values { reply } => {
                let _ = reply.send(Err(err));
            }
            Self::Tags { reply } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// A request on its way to the worker, with the deadline it must start by.
struct QueuedRequest {
    operation: &'static str,
    timeout: Duration,
    deadline: Instant,
    request: ListRequest,
}

impl QueuedRequest {
    fn is_abandoned(&self) -> bool {
        Instant::now() >= self.deadline || self.request.caller_gone()
    }

    fn expire(self) {
        tracing::debug!(operation = self.operation, "Skipping request abandoned in queue");
        self.request.reject(CtError::Timeout {
            operation: self.operation,
            timeout: self.timeout,
        });
    }
}

pub struct ListWorker {
    sender: mpsc::Sender<QueuedRequest>,
    handle: Option<std::thread::JoinHandle<()>>,
    close_outcome: Arc<OnceLock<CtResult<()>>>,
    request_timeout: Duration,
}

impl ListWorker {
    /// Spawn the worker, open the session, and create its tag list.
    ///
    /// Blocks until the session is open. Call it from a blocking context
    /// (e.g. `spawn_blocking`), not from inside an async task.
    pub fn start<C: CtConnector + 'static>(
        connector: Arc<C>,
        config: &SessionConfig,
    ) -> CtResult<Self> {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let (init_tx, init_rx) = oneshot::channel();
        let params = config.connect_params();
        let close_outcome = Arc::new(OnceLock::new());
        let outcome = Arc::clone(&close_outcome);

        let handle = std::thread::Builder::new()
            .name("ctapi-worker".into())
            .spawn(move || Self::run(connector.as_ref(), &params, init_tx, rx, &outcome))
            .map_err(|e| CtError::Internal(format!("Failed to spawn worker thread: {e}")))?;

        init_rx
            .blocking_recv()
            .map_err(|_| CtError::Internal("Worker thread panicked during init".into()))??;

        tracing::debug!("Worker thread started");

        Ok(Self {
            sender: tx,
            handle: Some(handle),
            close_outcome,
            request_timeout: config.request_timeout,
        })
    }

    fn run<C: CtConnector>(
        connector: &C,
        params: &ConnectParams,
        init_tx: oneshot::Sender<CtResult<()>>,
        mut rx: mpsc::Receiver<QueuedRequest>,
        close_outcome: &OnceLock<CtResult<()>>,
    ) {
        let session = match Session::open(connector, params) {
            Ok(session) => session,
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };
        let mut list = match session.new_list() {
            Ok(list) => list,
            Err(e) => {
                let _ = init_tx.send(Err(e));
                return;
            }
        };
        let _ = init_tx.send(Ok(()));

        let mut close_reply = None;
        while let Some(queued) = rx.blocking_recv() {
            if queued.is_abandoned() {
                queued.expire();
                continue;
            }
            match queued.request {
                ListRequest::Close { reply } => {
                    close_reply = Some(reply);
                    break;
                }
                request => Self::dispatch(&mut list, request),
            }
        }

        let released = list.release();
        let outcome = session.close().and(released);
        let _ = close_outcome.set(outcome.clone());
        match close_reply {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => tracing::debug!("Worker channel dropped, session closed"),
        }
        tracing::debug!("Worker thread exiting cleanly");
    }

    fn dispatch<L: ConnectedList>(list: &mut TagList<'_, L>, req: ListRequest) {
        match req {
            ListRequest::Add { tag, reply } => {
                let existed = list.handle(&tag).is_some();
                match reply.send(list.add(&tag)) {
                    Err(Ok(handle)) if !existed => Self::undo_add(list, handle),
                    _ => {}
                }
            }
            ListRequest::Delete { handle, reply } => {
                if reply.send(list.delete(handle)).is_err() {
                    tracing::warn!(handle = %handle, "Delete finished after its caller gave up");
                }
            }
            ListRequest::DeleteByName { tag, reply } => {
                if reply.send(list.delete_by_name(&tag)).is_err() {
                    tracing::warn!(tag = %tag, "Delete finished after its caller gave up");
                }
            }
            ListRequest::Read { reply } => match list.refresh() {
                Ok(next) => {
                    let previous = list.swap_snapshot(next);
                    if reply.send(Ok(())).is_err() {
                        list.swap_snapshot(previous);
                        tracing::warn!("Caller gave up during read, refresh discarded");
                    } else {
                        tracing::info!(generation = list.refresh_generation(), "read completed");
                    }
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            ListRequest::GetFloatValue { handle, reply } => {
                let _ = reply.send(list.get_float_value(handle));
            }
            ListRequest::GetValue { handle, reply } => {
                let _ = reply.send(list.get_value(handle));
            }
            ListRequest::Values { reply } => {
                let _ = reply.send(Ok(list.values()));
            }
            ListRequest::Tags { reply } => {
                let _ = reply.send(Ok(list.tags()));
            }
            ListRequest::Close { reply } => {
                let _ = reply.send(Err(CtError::SessionClosed));
            }
        }
    }

    fn undo_add<L: ConnectedList>(list: &mut TagList<'_, L>, handle: TagHandle) {
        match list.delete(handle) {
            Ok(_) => tracing::warn!(handle = %handle, "Caller gave up during add, tag removed again"),
            Err(e) => {
                tracing::error!(handle = %handle, error = %e, "Could not undo add after caller gave up");
            }
        }
    }

    /// Send a request and wait for its reply, bounded by the request timeout.
    ///
    /// On `Timeout` the request has either not run or been undone, except
    /// for deletes (see the module docs).
    pub async fn send_request<F, R>(&self, operation: &'static str, req_builder: F) -> CtResult<R>
    where
        F: FnOnce(oneshot::Sender<CtResult<R>>) -> ListRequest,
    {
        if self.is_closed() {
            return Err(CtError::SessionClosed);
        }
        if self
            .handle
            .as_ref()
            .is_some_and(std::thread::JoinHandle::is_finished)
        {
            tracing::error!(operation, "Worker thread panicked or exited unexpectedly");
            return Err(CtError::Internal("Worker thread exited unexpectedly".into()));
        }

        self.exchange(operation, req_builder).await
    }

    /// Close the session and stop the worker.
    ///
    /// Once the worker has closed the session, every later call returns the
    /// same outcome. A close that times out before the worker starts it
    /// leaves the session open and can be retried.
    pub async fn close(&self) -> CtResult<()> {
        if let Some(outcome) = self.close_outcome.get() {
            return outcome.clone();
        }
        match self.exchange("close", |reply| ListRequest::Close { reply }).await {
            // Another close got there first and the worker has exited.
            Err(CtError::Internal(msg)) => self
                .close_outcome
                .get()
                .cloned()
                .unwrap_or(Err(CtError::Internal(msg))),
            result => result,
        }
    }

    async fn exchange<F, R>(&self, operation: &'static str, req_builder: F) -> CtResult<R>
    where
        F: FnOnce(oneshot::Sender<CtResult<R>>) -> ListRequest,
    {
        let timeout = self.request_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        let timed_out = || {
            tracing::warn!(operation, timeout = ?timeout, "Request timed out");
            CtError::Timeout { operation, timeout }
        };

        let (tx, mut rx) = oneshot::channel();
        let queued = QueuedRequest {
            operation,
            timeout,
            deadline: deadline.into_std(),
            request: req_builder(tx),
        };
        match tokio::time::timeout_at(deadline, self.sender.send(queued)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(CtError::Internal(
                    "Worker channel closed (worker stopped)".into(),
                ));
            }
            Err(_) => return Err(timed_out()),
        }

        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CtError::Internal("Worker shut down during request".into())),
            Err(_) => {
                // After close() the worker either has already replied, or its
                // reply fails and it undoes the request.
                rx.close();
                rx.try_recv().unwrap_or_else(|_| Err(timed_out()))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_outcome.get().is_some()
    }
}
