//! Terminal results.

use crate::{Acknowledgement, Address, ProtocolViolation};
use std::fmt;
use std::time::Duration;

/// How a connection, session, or group ended.
///
/// Every actor produces exactly one of these when it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handshake completed; carries the peer's reply.
    Acknowledged(Acknowledgement),
    /// The transport could not establish the stream.
    ConnectFailed { address: Address, reason: String },
    /// No acknowledgement arrived before the deadline.
    Timeout { after: Duration },
    /// Cancelled by the owner.
    Aborted,
    /// The peer closed the stream.
    PeerClosed,
    /// The stream terminated abnormally.
    PeerAbandoned { reason: String },
    ProtocolViolation(ProtocolViolation),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Acknowledged(_))
    }

    /// Failures a reconnection group may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::Timeout { .. })
    }

    pub fn acknowledgement(&self) -> Option<&Acknowledgement> {
        match self {
            Self::Acknowledged(ack) => Some(ack),
            _ => None,
        }
    }
}

impl From<ProtocolViolation> for Outcome {
    fn from(violation: ProtocolViolation) -> Self {
        Self::ProtocolViolation(violation)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acknowledged(ack) => write!(
                f,
                "acknowledged by {} (addressed to {})",
                ack.responder_name, ack.addressed_to
            ),
            Self::ConnectFailed { address, reason } => {
                write!(f, "cannot connect to {address}: {reason}")
            }
            Self::Timeout { after } => write!(f, "timed out after {after:?}"),
            Self::Aborted => f.write_str("aborted"),
            Self::PeerClosed => f.write_str("closed by peer"),
            Self::PeerAbandoned { reason } => write!(f, "abandoned: {reason}"),
            Self::ProtocolViolation(v) => write!(f, "protocol violation: {v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_and_timeouts_retry() {
        let failed = Outcome::ConnectFailed {
            address: Address::new("127.0.0.1", 1),
            reason: "refused".into(),
        };
        assert!(failed.is_retryable());
        assert!(
            Outcome::Timeout {
                after: Duration::from_secs(3)
            }
            .is_retryable()
        );
        assert!(!Outcome::Aborted.is_retryable());
        assert!(!Outcome::PeerClosed.is_retryable());
        assert!(!Outcome::from(ProtocolViolation::UnexpectedGreeting).is_retryable());
    }
}
