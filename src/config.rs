//! Client configuration.
//!
//! Values resolve in three layers: built-in defaults, an optional YAML file,
//! then `PARLOR_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::connection::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, ReconnectConfig,
};
use crate::error::{Error, Result};

/// Default origin of the shared real-time socket.
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:4000/ws";

/// Default base URL of the assistant backend.
pub const DEFAULT_AI_URL: &str = "http://localhost:8001";

/// Client-side deadline for the synchronous chat call.  Longer than the
/// backend's own 90 second limit so its timeout reaches the caller first.
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(95);

/// Deadline for opening the streaming WebSocket.
pub const DEFAULT_WS_OPEN_TIMEOUT: Duration = Duration::from_secs(20);

/// Environment variable overriding [`ClientConfig::socket_url`].
pub const ENV_SOCKET_URL: &str = "PARLOR_SOCKET_URL";
/// Environment variable overriding [`ClientConfig::ai_url`].
pub const ENV_AI_URL: &str = "PARLOR_AI_URL";
/// Environment variable overriding [`ClientConfig::ai_ws_url`].
pub const ENV_AI_WS_URL: &str = "PARLOR_AI_WS_URL";

/// Where to connect and how patiently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// URL of the shared real-time socket.
    pub socket_url: String,
    /// HTTP base of the assistant backend.
    pub ai_url: String,
    /// WebSocket base of the assistant backend; derived from `ai_url` when unset.
    pub ai_ws_url: Option<String>,
    /// Synchronous chat deadline, in seconds.
    pub chat_timeout_secs: f64,
    /// WebSocket open deadline, in seconds.
    pub ws_open_timeout_secs: f64,
    /// Reconnection attempts for the shared socket.
    pub reconnect_attempts: u32,
    /// Pause between reconnection attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Deadline for one shared socket connect, in seconds.
    pub connect_timeout_secs: f64,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            ai_url: DEFAULT_AI_URL.to_string(),
            ai_ws_url: None,
            chat_timeout_secs: DEFAULT_CHAT_TIMEOUT.as_secs_f64(),
            ws_open_timeout_secs: DEFAULT_WS_OPEN_TIMEOUT.as_secs_f64(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs_f64(),
        }
    }

    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = url.into();
        self
    }

    pub fn with_ai_url(mut self, url: impl Into<String>) -> Self {
        self.ai_url = url.into();
        self
    }

    pub fn with_ai_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ai_ws_url = Some(url.into());
        self
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_ws_open_timeout(mut self, timeout: Duration) -> Self {
        self.ws_open_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_reconnect(mut self, reconnect: &ReconnectConfig) -> Self {
        self.reconnect_attempts = reconnect.max_attempts;
        self.reconnect_delay_ms = reconnect.delay.as_millis() as u64;
        self.connect_timeout_secs = reconnect.connect_timeout.as_secs_f64();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.chat_timeout_secs).unwrap_or(DEFAULT_CHAT_TIMEOUT)
    }

    pub fn ws_open_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.ws_open_timeout_secs).unwrap_or(DEFAULT_WS_OPEN_TIMEOUT)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.connect_timeout_secs).unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.reconnect_attempts,
            delay: Duration::from_millis(self.reconnect_delay_ms),
            connect_timeout: self.connect_timeout(),
        }
    }

    /// The assistant's WebSocket base: explicit, or `ai_url` with `http`
    /// swapped for `ws` and `https` for `wss`.
    pub fn ai_ws_base(&self) -> Result<String> {
        match &self.ai_ws_url {
            Some(url) => Ok(url.trim_end_matches('/').to_string()),
            None => websocket_base(&self.ai_url),
        }
    }

    /// Load a YAML file.  Keys not present keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read {}: {e}", path.display()), e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            Error::serialization(format!("invalid configuration: {e}"), Some(Box::new(e)))
        })
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name| lookup(name).filter(|value: &String| !value.is_empty());
        if let Some(url) = lookup(ENV_SOCKET_URL) {
            self.socket_url = url;
        }
        if let Some(url) = lookup(ENV_AI_URL) {
            self.ai_url = url;
        }
        if let Some(url) = lookup(ENV_AI_WS_URL) {
            self.ai_ws_url = Some(url);
        }
        self
    }

    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::new(),
        };
        Ok(config.with_env_overrides())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn websocket_base(http_base: &str) -> Result<String> {
    let mut url = Url::parse(http_base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::url(
                format!("cannot derive a WebSocket URL from scheme {other:?}"),
                None,
            ));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::url(format!("cannot switch {http_base} to {scheme}"), None))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.ai_url, "http://localhost:8001");
        assert_eq!(config.chat_timeout(), Duration::from_secs(95));
        assert_eq!(config.ws_open_timeout(), Duration::from_secs(20));
        assert_eq!(config.connect_timeout(), Duration::from_secs(20));
        assert_eq!(config.reconnect(), ReconnectConfig::default());
        assert_eq!(config.ai_ws_base().unwrap(), "ws://localhost:8001");
    }

    #[test]
    fn websocket_base_follows_tls() {
        let config = ClientConfig::new().with_ai_url("https://assistant.example.com/");
        assert_eq!(config.ai_ws_base().unwrap(), "wss://assistant.example.com");
        let config = ClientConfig::new().with_ai_url("http://10.0.0.5:8001/proxy");
        assert_eq!(config.ai_ws_base().unwrap(), "ws://10.0.0.5:8001/proxy");
        let config = ClientConfig::new().with_ai_url("ftp://nope");
        assert!(config.ai_ws_base().is_err());
        let config = ClientConfig::new().with_ai_ws_url("wss://ws.example.com/");
        assert_eq!(config.ai_ws_base().unwrap(), "wss://ws.example.com");
    }

    #[test]
    fn yaml_overrides_some_keys() {
        let config = ClientConfig::from_yaml(
            "ai_url: http://assistant:9000\nchat_timeout_secs: 30\nreconnect_attempts: 2\n",
        )
        .unwrap();
        assert_eq!(config.ai_url, "http://assistant:9000");
        assert_eq!(config.chat_timeout(), Duration::from_secs(30));
        assert_eq!(config.reconnect().max_attempts, 2);
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let err = ClientConfig::from_yaml("ai_uri: http://typo\n").unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_AI_URL, "http://from-env:8001"),
            (ENV_SOCKET_URL, ""),
            (ENV_AI_WS_URL, "ws://ws-from-env"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::new()
            .with_overrides(|name| env.get(name).map(|value| value.to_string()));
        assert_eq!(config.ai_url, "http://from-env:8001");
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
        assert_eq!(config.ai_ws_base().unwrap(), "ws://ws-from-env");
    }

    #[test]
    fn builder() {
        let config = ClientConfig::new()
            .with_socket_url("ws://chat:4000/ws")
            .with_chat_timeout(Duration::from_secs(10))
            .with_ws_open_timeout(Duration::from_millis(1500))
            .with_reconnect(&ReconnectConfig {
                max_attempts: 1,
                delay: Duration::from_millis(250),
                connect_timeout: Duration::from_secs(3),
            });
        assert_eq!(config.socket_url, "ws://chat:4000/ws");
        assert_eq!(config.chat_timeout(), Duration::from_secs(10));
        assert_eq!(config.ws_open_timeout(), Duration::from_millis(1500));
        assert_eq!(config.reconnect_delay_ms, 250);
        assert_eq!(config.reconnect().connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn connect_timeout_from_yaml() {
        let config = ClientConfig::from_yaml("connect_timeout_secs: 2.5
").unwrap();
        assert_eq!(config.reconnect().connect_timeout, Duration::from_millis(2500));
        let config = ClientConfig::new().with_connect_timeout(Duration::from_secs(7));
        assert_eq!(config.reconnect().connect_timeout, Duration::from_secs(7));
        let config = ClientConfig::from_yaml("connect_timeout_secs: -1
").unwrap();
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
    }
}
