//! Pure domain core for the task-execution daemon.
//!
//! Nothing in this crate performs I/O: no tokio, no filesystem, no
//! network. Everything here is deterministic given its inputs, which is
//! what lets the state machine, usage tracker, and scheduler be covered
//! by property tests instead of integration tests.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod state_machine;
pub mod types;
pub mod usage;

pub use clock::Clock;
pub use error::{ErrorKind, TaskdError};
