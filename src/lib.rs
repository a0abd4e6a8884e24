//! Lead Chat — conversational lead capture against a remote flow handler.

pub mod api;
pub mod chatbot;
pub mod config;
pub mod error;
pub mod host;
