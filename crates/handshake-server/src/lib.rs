//! Accepting side of the handshake.
//!
//! The [`Supervisor`] owns a listener and starts one [`Session`] per accepted
//! stream. Sessions share nothing but a copy of the server's identity, so a
//! stalled or misbehaving peer only ever holds up its own session.

mod session;
mod supervisor;

pub use session::{Session, SessionEnd, SessionId};
pub use supervisor::{Supervisor, SupervisorHandle, SupervisorReport, listen};
