//! Shared conversation types and error hierarchy for Parley.

pub mod error;
pub mod message;
pub mod provider;
pub mod util;

pub use error::{ApiError, ConfigError};
pub use message::*;
pub use provider::GenerativeModel;
pub use util::preview;
