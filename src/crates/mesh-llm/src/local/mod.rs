//! Local LLM provider implementations.
//!
//! This module contains implementations for LLMs running on localhost or
//! local networks. These providers don't require API keys and offer:
//! - Lower latency
//! - Better privacy (data stays local)
//! - No API costs
//! - Offline operation
//!
//! # Providers
//!
//! - **Ollama** - Popular local LLM runner with wide model support

pub mod ollama;

pub use ollama::OllamaClient;
