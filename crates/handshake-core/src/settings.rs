//! Settings supplied by the owning process.
//!
//! Both structs deserialize from any serde format and fall back to the
//! factory values for missing fields.

use crate::{Address, Identity, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// How long a connecting peer waits for its acknowledgement.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 32011;

/// What a session does with a greeting on an already acknowledged stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GreetingPolicy {
    /// Answer every greeting; a long-lived stream may handshake many times.
    #[default]
    Repeat,
    /// One handshake per stream; a second greeting is a protocol violation.
    SingleShot,
}

/// Configuration of the connecting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub local_identity: Identity,
    /// Named target addresses; one connection is maintained per entry.
    pub members: BTreeMap<String, Address>,
    pub handshake_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl ClientSettings {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            local_identity: Identity::new("Gladys"),
            members: BTreeMap::from([(
                "server".to_string(),
                Address::new(DEFAULT_HOST, DEFAULT_PORT),
            )]),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64,
            retry: RetryPolicy::default(),
        }
    }
}

/// Configuration of the accepting side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub local_identity: Identity,
    pub address: Address,
    pub greeting_policy: GreetingPolicy,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            local_identity: Identity::new("Buster"),
            address: Address::new(DEFAULT_HOST, DEFAULT_PORT),
            greeting_policy: GreetingPolicy::default(),
        }
    }
}
