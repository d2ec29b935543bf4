//! Remote LLM provider implementations.
//!
//! This module contains implementations for cloud-hosted LLM APIs.
//! These providers require API keys and offer:
//! - Access to powerful models (GPT-4, Claude 3, Gemini, etc.)
//! - No local hardware requirements
//! - Managed infrastructure and scaling
//! - Regular model updates
//!
//! # Providers
//!
//! - **Claude** - Anthropic's Claude models (Claude 3 Opus, Sonnet, Haiku)
//! - **OpenAI** - OpenAI-compatible chat-completions models (GPT-4, GPT-3.5)
//! - **Gemini** - Google's Gemini models (Gemini Pro, Gemini 1.5 Pro)

pub mod claude;
pub mod gemini;
pub mod openai;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
