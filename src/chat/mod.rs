//! Chat application module for interactive coding conversations.
//!
//! This module provides the REPL-facing pieces built on top of the aicoder library:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: the owned conversation and the turns run against it
//! - [`transcript`]: YAML session files

mod config;
mod session;
pub mod transcript;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use config::{ChatArgs, ChatConfig, DEFAULT_MODEL};
pub use session::ChatSession;
pub use transcript::SessionRecord;
