//! Aeonisk Engine - the multi-agent session core
//!
//! The engine drives a structured-turn session: a DM agent, player agents,
//! and optional enemy agents sequenced through a phased round protocol, with
//! every narrative outcome mediated by the mechanics engine and every event
//! appended to a JSONL training log.

pub mod agents;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod infrastructure;
pub mod log;

#[cfg(test)]
mod e2e_tests;

pub use config::{load_session_config, AppConfig};
pub use coordinator::{LlmFactory, SessionCoordinator};
pub use error::SessionError;
