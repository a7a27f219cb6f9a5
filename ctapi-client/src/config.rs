use crate::typedefs::{
    ConnectParams, DEFAULT_CHANNEL_CAPACITY, DEFAULT_REQUEST_TIMEOUT, OpenFlags,
};
use std::fmt;
use std::time::Duration;

pub const ENV_ADDRESS: &str = "CTAPI_ADDRESS";
pub const ENV_USER: &str = "CTAPI_USER";
pub const ENV_PASSWORD: &str = "CTAPI_PASSWORD";
pub const ENV_TIMEOUT_MS: &str = "CTAPI_TIMEOUT_MS";

/// Settings for [`CtApiClient::connect`](crate::CtApiClient::connect).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ctapi_client::{OpenFlags, SessionConfig};
///
/// let config = SessionConfig::new("scada01")
///     .with_credentials("view", "view")
///     .with_flags(OpenFlags::READ_ONLY | OpenFlags::BATCH)
///     .with_request_timeout(Duration::from_secs(2));
/// assert_eq!(config.address, "scada01");
/// assert!(!config.flags.contains(OpenFlags::RECONNECT));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub address: String,
    pub user: String,
    pub password: String,
    pub flags: OpenFlags,
    /// Deadline for each request sent to the worker, including open.
    pub request_timeout: Duration,
    /// Depth of the worker request queue.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            user: String::new(),
            password: String::new(),
            flags: OpenFlags::READ_ONLY
                | OpenFlags::BATCH
                | OpenFlags::EXTENDED
                | OpenFlags::RECONNECT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Self::default()
        }
    }

    /// Reads `CTAPI_ADDRESS`, `CTAPI_USER`, `CTAPI_PASSWORD` and
    /// `CTAPI_TIMEOUT_MS`. Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(address) = lookup(ENV_ADDRESS).filter(|a| !a.trim().is_empty()) {
            config.address = address;
        }
        if let Some(user) = lookup(ENV_USER) {
            config.user = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            config.password = password;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.request_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %raw, var = ENV_TIMEOUT_MS, "Ignoring invalid timeout"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            address: self.address.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            flags: self.flags,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("flags", &self.flags)
            .field("request_timeout", &self.request_timeout)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_open_with_all_flags() {
        let config = SessionConfig::default();
        assert_eq!(config.address, "localhost");
        assert_eq!(config.flags.bits(), 0xF);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn from_lookup_reads_all_variables() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (ENV_ADDRESS, "scada02"),
            (ENV_USER, "view"),
            (ENV_PASSWORD, "secret"),
            (ENV_TIMEOUT_MS, "1500"),
        ]));
        assert_eq!(config.address, "scada02");
        assert_eq!(config.user, "view");
        assert_eq!(config.password, "secret");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn from_lookup_ignores_bad_values() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (ENV_ADDRESS, "  "),
            (ENV_TIMEOUT_MS, "soon"),
        ]));
        assert_eq!(config.address, "localhost");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);

        let zero = SessionConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_MS, "0")]));
        assert_eq!(zero.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn debug_redacts_password() {
        let config = SessionConfig::new("h").with_credentials("u", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
        assert_eq!(config.connect_params().password, "hunter2");
    }

    #[test]
    fn channel_capacity_is_at_least_one() {
        assert_eq!(SessionConfig::default().with_channel_capacity(0).channel_capacity, 1);
    }
}
