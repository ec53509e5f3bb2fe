//! Critique-Clients: capability clients for CritiqueBot
//!
//! The pipeline never talks to a remote service directly. It goes through
//! the `TextGeneration` and `WebSearch` traits defined here, which have
//! HTTP implementations (OpenAI-compatible chat completions, Tavily search)
//! and in-memory fakes for tests.

pub mod error;
pub mod fakes;
pub mod openai;
pub mod tavily;
pub mod traits;

pub use error::CapabilityError;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use tavily::{TavilyClient, TavilyConfig};
pub use traits::{
    CapabilityClients, CapabilityResult, SearchDepth, SearchHit, TextGeneration, WebSearch,
};
