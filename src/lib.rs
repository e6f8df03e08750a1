//! Head unit side of the Android Auto session layer.
//!
//! The [`Supervisor`] waits for a phone on USB or TCP and keeps at most one
//! [`Session`](session::Session) alive at a time. A session runs one channel
//! service per projected function (video, audio in and out, input,
//! bluetooth), each on its own actor, plus a control channel whose heartbeat
//! is watched by a [`Pinger`].
//!
//! The crate does not encode messages or drive hardware. The embedding
//! application supplies a [`MessengerFactory`](session::MessengerFactory) for
//! the wire protocol, a [`DriverFactory`](driver::DriverFactory) for devices,
//! and installs a `log` backend.

pub mod bluetooth;
pub mod channel;
pub mod completion;
pub mod config;
pub mod driver;
pub mod error;
pub mod pinger;
pub mod protocol;
pub mod service;
pub mod session;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testing;

pub use completion::{Completion, Outcome, Resolver};
pub use config::Config;
pub use error::{AutoAppError, Result};
pub use pinger::Pinger;
pub use session::{ServiceSession, ServiceSessionFactory};
pub use supervisor::{Supervisor, SupervisorState};
pub use transport::{Transport, spawn_tcp_acceptor};
