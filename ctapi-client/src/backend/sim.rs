//! In-memory SCADA server implementing the connector traits.
//!
//! [`SimConnector`] is cheap to clone; every clone shares one server
//! state, so a test can keep a clone to change tag values, inject faults,
//! and inspect session counters while a client owns another.

use crate::backend::connector::{ConnectedList, ConnectedSession, CtConnector};
use crate::errors::CtStatus;
use crate::typedefs::{ConnectParams, TagHandle};
use anyhow::Context;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const STATUS_NOT_FOUND: u32 = 2;
const STATUS_INVALID_HANDLE: u32 = 6;
const STATUS_LOGON_FAILURE: u32 = 1326;
const STATUS_RPC_UNAVAILABLE: u32 = 1722;

#[derive(Debug, Default)]
struct SimState {
    tags: HashMap<String, f64>,
    credentials: Option<(String, String)>,
    next_handle: u32,
    opened: u32,
    closed: u32,
    refreshes: u32,
    fail_open: Option<u32>,
    fail_refreshes: u32,
    fail_fetch: HashSet<String>,
    refresh_delay: Duration,
}

/// Simulated CtApi server.
///
/// # Examples
///
/// ```
/// use ctapi_client::{SimConnector, Session, ConnectParams, OpenFlags};
///
/// let sim = SimConnector::new().with_tag("Tank1_LVL", 42.5);
/// let params = ConnectParams {
///     address: "localhost".into(),
///     user: String::new(),
///     password: String::new(),
///     flags: OpenFlags::READ_ONLY,
/// };
/// let session = Session::open(&sim, &params)?;
/// let mut list = session.new_list()?;
/// let handle = list.add("Tank1_LVL")?;
/// list.read()?;
/// assert_eq!(list.get_float_value(handle)?, 42.5);
/// drop(list);
/// session.close()?;
/// # Ok::<(), ctapi_client::CtError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimConnector {
    state: Arc<Mutex<SimState>>,
}

impl SimConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag to the simulated address space.
    #[must_use]
    pub fn with_tag(self, name: &str, value: f64) -> Self {
        self.set_value(name, value);
        self
    }

    /// Requires this user name and password on open.
    #[must_use]
    pub fn with_credentials(self, user: &str, password: &str) -> Self {
        self.lock().credentials = Some((user.to_string(), password.to_string()));
        self
    }

    /// Sets (or creates) a tag's current server-side value.
    pub fn set_value(&self, name: &str, value: f64) {
        self.lock().tags.insert(name.to_string(), value);
    }

    /// Removes a tag from the address space. Existing subscriptions stay,
    /// but have no data after the next refresh.
    pub fn remove_tag(&self, name: &str) {
        self.lock().tags.remove(name);
    }

    /// Makes every subsequent open fail with `code`, or succeed again on `None`.
    pub fn fail_open(&self, code: Option<u32>) {
        self.lock().fail_open = code;
    }

    /// Makes the next `count` batch refreshes fail.
    pub fn fail_next_refreshes(&self, count: u32) {
        self.lock().fail_refreshes = count;
    }

    /// Makes value fetches for `tag` fail until cleared.
    pub fn fail_fetch(&self, tag: &str, fail: bool) {
        let mut state = self.lock();
        if fail {
            state.fail_fetch.insert(tag.to_string());
        } else {
            state.fail_fetch.remove(tag);
        }
    }

    /// Blocks each batch refresh for `delay`.
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.lock().refresh_delay = delay;
    }

    pub fn opened_sessions(&self) -> u32 {
        self.lock().opened
    }

    pub fn closed_sessions(&self) -> u32 {
        self.lock().closed
    }

    /// Number of batch refreshes that reached the server, failed or not.
    pub fn refresh_count(&self) -> u32 {
        self.lock().refreshes
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn status(code: u32) -> anyhow::Error {
    anyhow::Error::new(CtStatus { code })
}

impl CtConnector for SimConnector {
    type Session = SimSession;

    fn open(&self, params: &ConnectParams) -> anyhow::Result<SimSession> {
        let mut state = self.lock();
        if let Some(code) = state.fail_open {
            return Err(status(code))
                .with_context(|| format!("ctOpen('{}') failed", params.address));
        }
        if let Some((user, password)) = &state.credentials {
            if *user != params.user || *password != params.password {
                return Err(status(STATUS_LOGON_FAILURE))
                    .with_context(|| format!("ctOpen('{}') failed", params.address));
            }
        }
        state.opened += 1;
        Ok(SimSession {
            state: Arc::clone(&self.state),
            open: true,
        })
    }
}

#[derive(Debug)]
pub struct SimSession {
    state: Arc<Mutex<SimState>>,
    open: bool,
}

impl ConnectedSession for SimSession {
    type List = SimList;

    fn new_list(&self) -> anyhow::Result<SimList> {
        if !self.open {
            return Err(status(STATUS_INVALID_HANDLE)).context("ctListNew failed");
        }
        Ok(SimList {
            state: Arc::clone(&self.state),
            subscriptions: HashMap::new(),
            snapshot: HashMap::new(),
        })
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if !self.open {
            return Err(status(STATUS_INVALID_HANDLE)).context("ctClose failed");
        }
        self.open = false;
        lock_state(&self.state).closed += 1;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimList {
    state: Arc<Mutex<SimState>>,
    subscriptions: HashMap<TagHandle, String>,
    snapshot: HashMap<TagHandle, f64>,
}

impl ConnectedList for SimList {
    fn subscribe(&mut self, tag: &str) -> anyhow::Result<TagHandle> {
        let mut state = lock_state(&self.state);
        if !state.tags.contains_key(tag) {
            return Err(status(STATUS_NOT_FOUND))
                .with_context(|| format!("ctListAdd('{tag}') failed"));
        }
        state.next_handle += 1;
        let handle = TagHandle(state.next_handle);
        self.subscriptions.insert(handle, tag.to_string());
        Ok(handle)
    }

    fn unsubscribe(&mut self, handle: TagHandle) -> anyhow::Result<bool> {
        self.snapshot.remove(&handle);
        Ok(self.subscriptions.remove(&handle).is_some())
    }

    fn batch_refresh(&mut self, handles: &[TagHandle]) -> anyhow::Result<()> {
        let delay = lock_state(&self.state).refresh_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = lock_state(&self.state);
        state.refreshes += 1;
        if state.fail_refreshes > 0 {
            state.fail_refreshes -= 1;
            return Err(status(STATUS_RPC_UNAVAILABLE)).context("ctListRead failed");
        }
        for handle in handles {
            let value = self
                .subscriptions
                .get(handle)
                .and_then(|tag| state.tags.get(tag));
            match value {
                Some(value) => {
                    self.snapshot.insert(*handle, *value);
                }
                // Tag gone from the server: no data until it comes back.
                None => {
                    self.snapshot.remove(handle);
                }
            }
        }
        Ok(())
    }

    fn fetch_value(&self, handle: TagHandle) -> anyhow::Result<f64> {
        let tag = self
            .subscriptions
            .get(&handle)
            .ok_or_else(|| status(STATUS_INVALID_HANDLE))
            .with_context(|| format!("ctListData({handle}) failed"))?;
        if lock_state(&self.state).fail_fetch.contains(tag) {
            return Err(status(STATUS_RPC_UNAVAILABLE))
                .with_context(|| format!("ctListData('{tag}') failed"));
        }
        self.snapshot
            .get(&handle)
            .copied()
            .ok_or_else(|| status(STATUS_NOT_FOUND))
            .with_context(|| format!("ctListData('{tag}') has no data"))
    }

    fn release(&mut self) -> anyhow::Result<()> {
        self.subscriptions.clear();
        self.snapshot.clear();
        Ok(())
    }
}
