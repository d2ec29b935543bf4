//! Fallback context/usage estimation helpers.

pub mod token_counter;

pub use token_counter::{TokenCount, TokenCounter};
