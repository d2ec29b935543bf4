//! The [`Model`] capability, a no-network mock for tests, local/remote
//! adapters speaking each provider's native wire format, and a curated
//! profile→model pricing table for cost accounting.
//!
//! # Local Providers
//!
//! Local providers connect to LLM servers running on localhost or local
//! network:
//! - **Ollama** - Popular local LLM runner with wide model support
//!
//! # Remote Providers
//!
//! Remote providers connect to cloud-hosted LLM APIs:
//! - **OpenAI** - OpenAI-compatible chat-completions models
//! - **Claude** - Anthropic's Messages API
//! - **Gemini** - Google's Gemini models
//!
//! # Example Usage
//!
//! ## Local Provider (Ollama)
//!
//! ```rust,ignore
//! use mesh_llm::local::OllamaClient;
//! use mesh_llm::config::LocalLlmConfig;
//! use mesh_llm::model::{Model, ChatRequest};
//! use mesh_core::messages::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = LocalLlmConfig::new("http://localhost:11434", "llama2");
//!     let client = OllamaClient::new(config);
//!
//!     let request = ChatRequest::new(vec![Message::human("What is Rust?")]);
//!     let response = client.chat(request).await?;
//!     println!("Response: {}", response.message.text().unwrap());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Remote Provider (OpenAI)
//!
//! ```rust,ignore
//! use mesh_llm::remote::OpenAiClient;
//! use mesh_llm::config::RemoteLlmConfig;
//! use mesh_llm::model::{Model, ChatRequest};
//! use mesh_core::messages::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::from_env("OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4")?;
//!     let client = OpenAiClient::new(config);
//!
//!     let request = ChatRequest::new(vec![Message::human("Explain quantum computing briefly")])
//!         .with_temperature(0.7);
//!     let response = client.chat(request).await?;
//!     println!("Response: {}", response.message.text().unwrap());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mock;
pub mod model;
pub mod pricing;
pub mod provider_utils;

#[macro_use]
mod provider_macros;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;

pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use mock::MockModel;
pub use model::{
    ChatConfig, ChatEventStream, ChatRequest, ChatResponse, ChatStreamEvent, FinishReason, Model,
    ReasoningContent, ReasoningMode, ToolDefinition, UsageMetadata,
};
pub use pricing::{default_pricing, ModelPricing, ModelProfile, PricingTable};
pub use provider_utils::{ModelInfo, ProviderUtils};
