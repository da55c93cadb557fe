//! Configuration types for connections, servers and process termination
//!
//! Every struct has defaults matching the engine's expectations and can be
//! overridden from `ENGINE_LINK_*` environment variables.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};

/// Path the engine serves its API socket on
pub const DEFAULT_ENDPOINT_PATH: &str = "/sc2api";

/// Largest frame either side will encode or decode
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// What a timed-out receive does to the connection
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Close the socket, discard unread responses and fire the timeout callback
    #[default]
    Disconnect,
    /// Fail only the timed-out call; queued responses and the socket survive
    FailCall,
}

impl FromStr for TimeoutPolicy {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disconnect" => Ok(TimeoutPolicy::Disconnect),
            "fail-call" | "fail_call" | "failcall" => Ok(TimeoutPolicy::FailCall),
            _ => Err(SharedError::invalid_config("timeout_policy", s)),
        }
    }
}

/// Client connection settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConnectConfig {
    pub path: String,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub auto_reconnect: bool,
    pub reconnect_backoff: Duration,
    pub max_frame_bytes: usize,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ENDPOINT_PATH.to_string(),
            poll_interval: Duration::from_millis(1000),
            max_attempts: 30,
            auto_reconnect: true,
            reconnect_backoff: Duration::from_millis(1000),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            timeout_policy: TimeoutPolicy::Disconnect,
        }
    }
}

impl ConnectConfig {
    /// Total time `connect` waits for the handshake
    pub fn handshake_budget(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub fn from_env() -> SharedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (environment or test map)
    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = lookup("ENGINE_LINK_PATH") {
            config.path = path;
        }
        if let Some(ms) = parse_value::<u64, _>(&lookup, "ENGINE_LINK_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_value(&lookup, "ENGINE_LINK_MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }
        if let Some(reconnect) = parse_value(&lookup, "ENGINE_LINK_AUTO_RECONNECT")? {
            config.auto_reconnect = reconnect;
        }
        if let Some(bytes) = parse_value(&lookup, "ENGINE_LINK_MAX_FRAME_BYTES")? {
            config.max_frame_bytes = bytes;
        }
        if let Some(policy) = parse_value(&lookup, "ENGINE_LINK_TIMEOUT_POLICY")? {
            config.timeout_policy = policy;
        }
        Ok(config)
    }
}

/// Host listener settings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    pub path: String,
    /// Close sockets that stay silent this long
    pub idle_timeout: Option<Duration>,
    pub max_frame_bytes: usize,
    /// Drop a departed client's queued requests and responses
    pub purge_on_disconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8167,
            path: DEFAULT_ENDPOINT_PATH.to_string(),
            idle_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            purge_on_disconnect: true,
        }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_purge_on_disconnect(mut self, purge: bool) -> Self {
        self.purge_on_disconnect = purge;
        self
    }

    pub fn from_env() -> SharedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(address) = parse_value(&lookup, "ENGINE_LINK_BIND_ADDRESS")? {
            config.bind_address = address;
        }
        if let Some(port) = parse_value(&lookup, "ENGINE_LINK_PORT")? {
            config.port = port;
        }
        if let Some(path) = lookup("ENGINE_LINK_PATH") {
            config.path = path;
        }
        if let Some(ms) = parse_value::<u64, _>(&lookup, "ENGINE_LINK_IDLE_TIMEOUT_MS")? {
            config.idle_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(bytes) = parse_value(&lookup, "ENGINE_LINK_MAX_FRAME_BYTES")? {
            config.max_frame_bytes = bytes;
        }
        if let Some(purge) = parse_value(&lookup, "ENGINE_LINK_PURGE_ON_DISCONNECT")? {
            config.purge_on_disconnect = purge;
        }
        Ok(config)
    }
}

/// Graceful-then-forced termination settings
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TerminateConfig {
    pub grace_period: Duration,
    pub poll_interval: Duration,
}

impl Default for TerminateConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl TerminateConfig {
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn from_env() -> SharedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> SharedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(ms) = parse_value::<u64, _>(&lookup, "ENGINE_LINK_GRACE_PERIOD_MS")? {
            config.grace_period = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_value::<u64, _>(&lookup, "ENGINE_LINK_TERMINATE_POLL_MS")? {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        Ok(config)
    }
}

fn parse_value<T, F>(lookup: &F, key: &str) -> SharedResult<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SharedError::invalid_config(key, raw)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_connect_defaults_give_thirty_second_handshake() {
        let config = ConnectConfig::default();
        assert_eq!(config.handshake_budget(), Duration::from_secs(30));
        assert_eq!(config.path, "/sc2api");
        assert_eq!(config.timeout_policy, TimeoutPolicy::Disconnect);
    }

    #[test]
    fn test_connect_overrides() {
        let config = ConnectConfig::from_lookup(lookup_from(&[
            ("ENGINE_LINK_POLL_INTERVAL_MS", "250"),
            ("ENGINE_LINK_MAX_ATTEMPTS", "4"),
            ("ENGINE_LINK_TIMEOUT_POLICY", "fail-call"),
        ]))
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.handshake_budget(), Duration::from_secs(1));
        assert_eq!(config.timeout_policy, TimeoutPolicy::FailCall);
    }

    #[test]
    fn test_invalid_value_names_the_key() {
        let err = ConnectConfig::from_lookup(lookup_from(&[("ENGINE_LINK_MAX_ATTEMPTS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("ENGINE_LINK_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_server_idle_timeout_zero_disables() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("ENGINE_LINK_PORT", "9100"),
            ("ENGINE_LINK_IDLE_TIMEOUT_MS", "0"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9100);
        assert!(config.idle_timeout.is_none());
        assert!(config.purge_on_disconnect);
    }

    #[test]
    fn test_terminate_defaults() {
        let config = TerminateConfig::default();
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }
}
