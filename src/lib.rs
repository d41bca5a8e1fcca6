//! PackagingPal - a chat assistant for sourcing cosmetic packaging
//!
//! Conversational turns run against the OpenAI Responses API. When the model
//! emits the search trigger, the product catalogue is queried and a second
//! recommendation turn is run over the hits.

pub mod chat;
pub mod config;
pub mod error;
pub mod image;
pub mod prompt;
pub mod provider;
pub mod render;
pub mod repl;
pub mod responses;
pub mod search;
pub mod server;
pub mod transcript;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{ChatSession, SessionFactory, SessionOptions, TurnEvent};
pub use error::{PalError, Result};
