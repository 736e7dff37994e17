//! Gemini generateContent and Files API client for Parley.

mod client;
mod poll;
mod provider;

pub use client::ApiClient;
pub use poll::{PollConfig, wait_until_active};
pub use provider::GeminiProvider;
