//! Per-browser session state and bounded conversation history for Parley.

pub mod error;
pub mod history;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use history::{History, MAX_HISTORY_TURNS};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use types::{PendingAttachment, Session, SessionId};
