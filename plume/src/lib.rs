//! Plume - streaming client for OpenAI-compatible chat completion APIs.
//!
//! This crate covers one narrow job well: send a chat completion request
//! with `"stream": true` and turn the server-sent-event response into an
//! ordered sequence of text fragments as the bytes arrive, without waiting
//! for event boundaries to line up with network chunks.

pub mod client;
pub mod completion;
pub mod error;
pub mod message;
pub mod streaming;

pub use client::{ChatClient, ChatClientBuilder};
pub use completion::CompletionModel;
pub use error::{Error, Result};
pub use message::{ChatMessage, MessageRole};
pub use streaming::{ChatStream, Feed, FragmentStream, StreamDecoder};
