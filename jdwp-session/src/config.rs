// Session tuning knobs
//
// Loading these from disk is left to the embedding tool; the core only takes
// the struct.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum allowed JDWP packet size (10MB)
pub const DEFAULT_MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout applied to every request issued by the object model
    pub request_timeout: Duration,
    pub handshake_timeout: Duration,
    pub max_packet_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(5),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}
