//! Handshake messages.
//!
//! The connecting side sends one [`Greeting`] as soon as its transport
//! reports the stream connected. The accepting side answers with an
//! [`Acknowledgement`] addressed back to the greeter.

use crate::Identity;
use serde::{Deserialize, Serialize};

/// Sent by the connecting peer to introduce itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub sender_name: Identity,
}

impl Greeting {
    pub fn new(sender_name: impl Into<Identity>) -> Self {
        Self {
            sender_name: sender_name.into(),
        }
    }

    /// Build the reply to this greeting on behalf of `responder`.
    pub fn acknowledge(&self, responder: &Identity) -> Acknowledgement {
        Acknowledgement {
            responder_name: responder.clone(),
            addressed_to: self.sender_name.clone(),
        }
    }
}

/// Sent by the accepting peer in reply to a [`Greeting`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub responder_name: Identity,
    /// Echo of the greeting's `sender_name`.
    pub addressed_to: Identity,
}

impl Acknowledgement {
    /// Check that this acknowledgement answers a greeting sent as `local`.
    pub fn verify(&self, local: &Identity) -> Result<(), ProtocolViolation> {
        if &self.addressed_to == local {
            Ok(())
        } else {
            Err(ProtocolViolation::Misaddressed {
                expected: local.clone(),
                actual: self.addressed_to.clone(),
            })
        }
    }
}

/// Messages carried over a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Greeting(Greeting),
    Acknowledgement(Acknowledgement),
}

impl WireMessage {
    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Greeting(_) => "greeting",
            Self::Acknowledgement(_) => "acknowledgement",
        }
    }
}

impl From<Greeting> for WireMessage {
    fn from(greeting: Greeting) -> Self {
        Self::Greeting(greeting)
    }
}

impl From<Acknowledgement> for WireMessage {
    fn from(ack: Acknowledgement) -> Self {
        Self::Acknowledgement(ack)
    }
}

/// A malformed or misordered handshake message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("acknowledgement addressed to {actual}, expected {expected}")]
    Misaddressed { expected: Identity, actual: Identity },
    #[error("second greeting from {sender} on an acknowledged stream")]
    DuplicateGreeting { sender: Identity },
    #[error("greeting received by the connecting side")]
    UnexpectedGreeting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledgement_echoes_sender() {
        let hello = Greeting::new("Gladys");
        let ack = hello.acknowledge(&Identity::new("Buster"));
        assert_eq!(ack.responder_name, Identity::new("Buster"));
        assert_eq!(ack.addressed_to, hello.sender_name);
        assert!(ack.verify(&Identity::new("Gladys")).is_ok());
    }

    #[test]
    fn misaddressed_acknowledgement_is_a_violation() {
        let ack = Greeting::new("Gladys").acknowledge(&Identity::new("Buster"));
        assert_eq!(
            ack.verify(&Identity::new("Mabel")),
            Err(ProtocolViolation::Misaddressed {
                expected: Identity::new("Mabel"),
                actual: Identity::new("Gladys"),
            })
        );
    }

    #[test]
    fn wire_format_is_tagged() {
        let msg = WireMessage::from(Greeting::new("Gladys"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "greeting", "sender_name": "Gladys" })
        );

        let ack: WireMessage = serde_json::from_value(serde_json::json!({
            "type": "acknowledgement",
            "responder_name": "Buster",
            "addressed_to": "Gladys",
        }))
        .unwrap();
        assert_eq!(ack.kind(), "acknowledgement");
    }
}
