//! Conversation orchestration and attachment handling for Parley.

mod error;
mod locks;
mod orchestrator;
pub mod transcript;
pub mod uploads;

pub use error::ChatError;
pub use locks::{SessionGuard, SessionLocks};
pub use orchestrator::{Orchestrator, UploadAck};
pub use uploads::UploadDir;
