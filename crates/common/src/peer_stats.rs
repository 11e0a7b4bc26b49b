use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Connection statistics kept by the router for one relay
///
/// The directory daemon periodically asks for these to score relays, so the
/// field names are part of the wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStats {
    /// Hex encoded router id the stats belong to
    pub router_id: String,

    pub num_connection_attempts: u64,
    pub num_connection_successes: u64,
    pub num_connection_rejections: u64,
    pub num_connection_timeouts: u64,

    pub num_path_builds: u64,

    pub num_packets_attempted: u64,
    pub num_packets_sent: u64,
    pub num_packets_dropped: u64,
    pub num_packets_resent: u64,

    /// Highest observed throughput, bytes per second
    pub peak_bandwidth_bytes_per_sec: u64,

    /// When the relay's contact record was last refreshed
    pub last_rc_updated: Timestamp,
}

impl PeerStats {
    pub fn new(router_id: impl Into<String>) -> Self {
        Self {
            router_id: router_id.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_starts_empty() {
        let stats = PeerStats::new("ab".repeat(32));
        assert_eq!(stats.router_id, "ab".repeat(32));
        assert_eq!(stats.num_connection_attempts, 0);
        assert_eq!(stats.last_rc_updated, Timestamp::default());
    }
}
