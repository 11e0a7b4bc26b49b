use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Naming constants
pub mod naming {
    /// TLD of service addresses and LNS names
    pub const SERVICE_TLD: &str = "bdx";

    /// TLD of relay (master node) addresses
    pub const ROUTER_TLD: &str = "mnode";

    /// TLDs the address codec accepts
    pub const ALLOWED_TLDS: &[&str] = &[SERVICE_TLD, ROUTER_TLD];

    /// Longest LNS primary label without dashes
    pub const MAX_LNS_NAME_LEN: usize = 32;

    /// Longest punycode LNS primary label
    pub const MAX_LNS_PUNYCODE_LEN: usize = 63;
}

/// DNS wire constants
pub mod dns {
    /// Longest single label on the wire
    pub const MAX_LABEL_LEN: usize = 63;

    /// Longest encoded name on the wire, including length octets
    pub const MAX_NAME_WIRE_LEN: usize = 255;

    /// Maximum compression pointers followed while decoding one name
    pub const MAX_POINTER_HOPS: usize = 16;
}

/// Directory daemon RPC constants
pub mod rpc {
    /// Default directory daemon endpoint
    pub const DEFAULT_DIRECTORY_URL: &str = "127.0.0.1:29091";

    /// Maximum frame size accepted from the directory daemon (10 MB)
    pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

    /// Per-request timeout
    pub const REQUEST_TIMEOUT_MS: u64 = 15_000;

    /// Attempts made to fetch the identity key at startup
    pub const IDENTITY_ATTEMPTS: u32 = 5;

    /// Deadline for a single identity key attempt
    pub const IDENTITY_TIMEOUT_MS: u64 = 10_000;

    /// Pause between identity key attempts
    pub const IDENTITY_RETRY_DELAY_MS: u64 = 1_000;

    /// First pause before reconnecting a dropped directory session
    pub const RECONNECT_DELAY_MS: u64 = 1_000;

    /// Reconnect pauses double up to this
    pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

    /// Status code the daemon puts in the first reply part on success
    pub const STATUS_OK: &str = "200";

    pub const GET_MASTER_PRIVKEYS: &str = "admin.get_master_privkeys";
    pub const GET_MASTER_NODES: &str = "rpc.get_master_nodes";
    pub const GET_HEIGHT: &str = "rpc.get_height";
    pub const LNS_RESOLVE: &str = "rpc.lns_resolve";
    pub const REPORT_PEER_STATUS: &str = "admin.report_peer_status";
    pub const SUBSCRIBE_BLOCKS: &str = "sub.block";

    /// Inbound: daemon asks for our peer statistics
    pub const GET_PEER_STATS: &str = "bdxnet.get_peer_stats";

    /// Inbound: daemon announces a new block
    pub const NOTIFY_BLOCK: &str = "notify.block";

    /// LNS record type for bdxnet service addresses
    pub const LNS_TYPE_BDXNET: u8 = 2;
}

/// Directory client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Directory daemon endpoint (host:port)
    pub directory_url: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// How many times to try fetching the identity key at startup
    pub identity_attempts: u32,

    /// Deadline for each identity key attempt in milliseconds
    pub identity_timeout_ms: u64,

    /// Pause between identity key attempts in milliseconds
    pub identity_retry_delay_ms: u64,

    /// First pause before reconnecting after the session drops, in
    /// milliseconds; doubles on each failed attempt
    pub reconnect_delay_ms: u64,

    /// Restrict relays to the directory's master node list
    pub whitelist_routers: bool,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            directory_url: rpc::DEFAULT_DIRECTORY_URL.to_string(),
            request_timeout_ms: rpc::REQUEST_TIMEOUT_MS,
            identity_attempts: rpc::IDENTITY_ATTEMPTS,
            identity_timeout_ms: rpc::IDENTITY_TIMEOUT_MS,
            identity_retry_delay_ms: rpc::IDENTITY_RETRY_DELAY_MS,
            reconnect_delay_ms: rpc::RECONNECT_DELAY_MS,
            whitelist_routers: true,
            verbose: false,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory_url(mut self, url: impl Into<String>) -> Self {
        self.directory_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis(timeout);
        self
    }

    pub fn with_identity_retries(mut self, attempts: u32, timeout: Duration, delay: Duration) -> Self {
        self.identity_attempts = attempts;
        self.identity_timeout_ms = millis(timeout);
        self.identity_retry_delay_ms = millis(delay);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = millis(delay);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }

    pub fn identity_retry_delay(&self) -> Duration {
        Duration::from_millis(self.identity_retry_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.directory_url, rpc::DEFAULT_DIRECTORY_URL);
        assert_eq!(config.identity_attempts, rpc::IDENTITY_ATTEMPTS);
        assert!(config.whitelist_routers);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .with_directory_url("10.0.0.1:4000")
            .with_request_timeout(Duration::from_secs(3))
            .with_identity_retries(2, Duration::from_secs(4), Duration::from_secs(0));

        assert_eq!(config.directory_url, "10.0.0.1:4000");
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.identity_attempts, 2);
        assert_eq!(config.identity_timeout(), Duration::from_secs(4));
        assert_eq!(config.identity_retry_delay(), Duration::ZERO);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str("directory_url = \"example:1\"\n").unwrap();
        assert_eq!(config.directory_url, "example:1");
        assert_eq!(config.request_timeout_ms, rpc::REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn test_sub_second_durations_survive() {
        let config = ClientConfig::new()
            .with_request_timeout(Duration::from_millis(500))
            .with_identity_retries(3, Duration::from_millis(200), Duration::from_millis(1))
            .with_reconnect_delay(Duration::from_millis(20));

        assert_eq!(config.request_timeout(), Duration::from_millis(500));
        assert_eq!(config.identity_timeout(), Duration::from_millis(200));
        assert_eq!(config.identity_retry_delay(), Duration::from_millis(1));
        assert_eq!(config.reconnect_delay(), Duration::from_millis(20));

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("request_timeout_ms = 500"));
        let reloaded: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("bdxnet-config-{}.toml", std::process::id()));
        let config = ClientConfig::new().with_verbose(true);
        config.to_file(&path).unwrap();
        let loaded = ClientConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_allowed_tlds() {
        assert!(naming::ALLOWED_TLDS.contains(&naming::SERVICE_TLD));
        assert!(naming::ALLOWED_TLDS.contains(&naming::ROUTER_TLD));
    }
}
