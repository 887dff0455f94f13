//! # ctsync Common Library
//!
//! Shared code for the contact reconciliation workspace:
//! - Error type and `Result` alias
//! - TOML / environment configuration loading
//! - Progress event types and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
