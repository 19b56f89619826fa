//! Connecting side of the handshake.
//!
//! A [`Connection`] drives one handshake attempt against one address and
//! ends with exactly one [`Outcome`](handshake_core::Outcome). A [`Group`]
//! keeps a named set of connections alive, retrying failures according to a
//! [`RetryPolicy`](handshake_core::RetryPolicy), and tells its owner when the
//! whole set is ready or when it gives up.

mod connection;
mod group;

#[cfg(test)]
mod testing;

pub use connection::{
    Connection, ConnectionHandle, Established, Finished, State, Transition, connect_once,
};
pub use group::{Group, GroupHandle, GroupStatus, GroupUpdate, MemberChange};
