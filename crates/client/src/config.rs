//! Client configuration from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_WS_PATH: &str = "/ws";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: String,
        min: u64,
        max: u64,
    },
    #[error("unknown transport {0:?}, expected \"sockjs\" or \"websocket\"")]
    UnknownTransport(String),
    #[error("invalid base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Retry policy for a connect cycle.
///
/// Attempt `n` (1-based) that fails is followed by a wait of
/// `n * base_delay` before the next one, until `max_retries` attempts have
/// failed. `max_retries` is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after `attempts` failures, or `None` once the
    /// cycle has to give up.
    pub fn delay_after(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.max_retries {
            return None;
        }
        Some(self.base_delay.checked_mul(attempts).unwrap_or(Duration::MAX))
    }
}

/// How the broker endpoint is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// SockJS session over WebSocket at `<ws_path>/<server>/<session>/websocket`.
    #[default]
    SockJs,
    /// Plain WebSocket at `<ws_path>`.
    WebSocket,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sockjs" => Ok(TransportKind::SockJs),
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            _ => Err(ConfigError::UnknownTransport(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend origin for both REST and the broker endpoint.
    pub base_url: String,
    /// Broker endpoint path, appended to `base_url`.
    pub ws_path: String,
    pub transport: TransportKind,
    pub retry: RetryPolicy,
    /// How long to wait for `CONNECTED` after the socket opens.
    pub handshake_timeout: Duration,
    /// Where the session is persisted. `None` uses the platform config dir.
    pub storage_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            transport: TransportKind::default(),
            retry: RetryPolicy::default(),
            handshake_timeout: Duration::from_secs(10),
            storage_dir: None,
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment.
    ///
    /// Environment variables:
    /// - `ROOMCHAT_API_URL`: backend origin (default: "http://localhost:8080")
    /// - `ROOMCHAT_WS_PATH`: broker endpoint path (default: "/ws")
    /// - `ROOMCHAT_TRANSPORT`: "sockjs" or "websocket" (default: "sockjs")
    /// - `ROOMCHAT_MAX_RETRIES`: connect attempts per cycle (default: 3)
    /// - `ROOMCHAT_RETRY_DELAY_MS`: backoff unit in ms (default: 2000)
    /// - `ROOMCHAT_HANDSHAKE_TIMEOUT_MS`: wait for `CONNECTED` (default: 10000)
    /// - `ROOMCHAT_STORAGE_DIR`: session directory (default: platform config dir)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("ROOMCHAT_API_URL") {
            config.base_url = url;
        }
        if let Some(path) = lookup("ROOMCHAT_WS_PATH") {
            config.ws_path = path;
        }
        if let Some(transport) = lookup("ROOMCHAT_TRANSPORT") {
            config.transport = transport.parse()?;
        }
        if let Some(n) = parse_number(&lookup, "ROOMCHAT_MAX_RETRIES")? {
            config.retry.max_retries = u32::try_from(n)
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| ConfigError::OutOfRange {
                    name: "ROOMCHAT_MAX_RETRIES",
                    value: n.to_string(),
                    min: 1,
                    max: u64::from(u32::MAX),
                })?;
        }
        if let Some(ms) = parse_number(&lookup, "ROOMCHAT_RETRY_DELAY_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_number(&lookup, "ROOMCHAT_HANDSHAKE_TIMEOUT_MS")? {
            config.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(dir) = lookup("ROOMCHAT_STORAGE_DIR") {
            config.storage_dir = Some(PathBuf::from(dir));
        }

        config.ws_endpoint("probe")?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_ws_path(mut self, ws_path: impl Into<String>) -> Self {
        self.ws_path = ws_path.into();
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Broker URL for a credential: `<base_url><ws_path>?token=<credential>`
    /// with the scheme switched to `ws`/`wss`.
    pub fn ws_endpoint(&self, credential: &str) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(invalid(format!("unsupported scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| invalid(format!("cannot switch scheme to {scheme}")))?;

        let base_path = url.path().trim_end_matches('/').to_string();
        let ws_path = self.ws_path.trim_start_matches('/');
        url.set_path(&format!("{base_path}/{ws_path}"));
        url.set_query(None);
        url.query_pairs_mut().append_pair("token", credential);
        Ok(url)
    }

    /// Host header value for the STOMP `CONNECT` frame.
    pub fn broker_host(&self) -> String {
        Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidNumber { name, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_backend_contract() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.transport, TransportKind::SockJs);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(2000));
        assert_eq!(
            config.ws_endpoint("abc").unwrap().as_str(),
            "ws://localhost:8080/ws?token=abc"
        );
    }

    #[test]
    fn endpoint_switches_to_wss_and_keeps_base_path() {
        let config = ClientConfig::default().with_base_url("https://chat.example.com/backend/");
        assert_eq!(
            config.ws_endpoint("a b").unwrap().as_str(),
            "wss://chat.example.com/backend/ws?token=a+b"
        );
        assert_eq!(config.broker_host(), "chat.example.com");
    }

    #[test]
    fn overrides_from_environment() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ROOMCHAT_API_URL", "http://10.0.0.2:9000"),
            ("ROOMCHAT_WS_PATH", "/ws/websocket"),
            ("ROOMCHAT_TRANSPORT", "WebSocket"),
            ("ROOMCHAT_MAX_RETRIES", "5"),
            ("ROOMCHAT_RETRY_DELAY_MS", "100"),
        ]))
        .unwrap();
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert_eq!(
            config.ws_endpoint("t").unwrap().as_str(),
            "ws://10.0.0.2:9000/ws/websocket?token=t"
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            ClientConfig::from_lookup(lookup(&[("ROOMCHAT_MAX_RETRIES", "three")])),
            Err(ConfigError::InvalidNumber {
                name: "ROOMCHAT_MAX_RETRIES",
                value: "three".to_string()
            })
        );
        assert_eq!(
            ClientConfig::from_lookup(lookup(&[("ROOMCHAT_TRANSPORT", "xhr")])),
            Err(ConfigError::UnknownTransport("xhr".to_string()))
        );
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("ROOMCHAT_API_URL", "ftp://host")])),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn retry_delays_are_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(2000)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(4000)));
        assert_eq!(policy.delay_after(3), None);
    }

    #[test]
    fn max_retries_must_fit_and_be_positive() {
        for value in ["0", "4294967296"] {
            assert!(
                matches!(
                    ClientConfig::from_lookup(lookup(&[("ROOMCHAT_MAX_RETRIES", value)])),
                    Err(ConfigError::OutOfRange { name: "ROOMCHAT_MAX_RETRIES", .. })
                ),
                "{value} accepted"
            );
        }
        let config =
            ClientConfig::from_lookup(lookup(&[("ROOMCHAT_MAX_RETRIES", "4294967295")])).unwrap();
        assert_eq!(config.retry.max_retries, u32::MAX);
    }

    #[test]
    fn huge_delays_saturate() {
        let policy = RetryPolicy {
            max_retries: u32::MAX,
            base_delay: Duration::MAX,
        };
        assert_eq!(policy.delay_after(2), Some(Duration::MAX));
    }
}
