pub mod config;
pub mod error;
pub mod peer_stats;
pub mod types;

pub use config::{dns, naming, rpc, ClientConfig, ConfigError};
pub use error::{BdxNetError, Result};
pub use peer_stats::PeerStats;
pub use types::Timestamp;
