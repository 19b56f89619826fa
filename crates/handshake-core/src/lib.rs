//! Core types for the handshake protocol.
//!
//! This crate provides the data model shared by both ends of a connection:
//! addresses, identities, the two handshake messages, terminal outcomes, and
//! the retry policy. It has no runtime; the transport and the actors that
//! drive a handshake live in the `handshake-net`, `handshake-client` and
//! `handshake-server` crates.

mod address;
mod identity;
mod message;
mod outcome;
mod retry;
mod settings;

pub use address::{Address, AddressParseError};
pub use identity::Identity;
pub use message::{Acknowledgement, Greeting, ProtocolViolation, WireMessage};
pub use outcome::Outcome;
pub use retry::{Backoff, RetryPolicy};
pub use settings::{ClientSettings, GreetingPolicy, ServerSettings, DEFAULT_HANDSHAKE_TIMEOUT};
