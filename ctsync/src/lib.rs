//! ctsync library interface
//!
//! Reconciles an owner's internal contact store with an external address
//! book reached through an automation bridge. One call to
//! `SyncOrchestrator::run` is one full pass.

pub mod adapters;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod oracle;
pub mod orchestrator;
pub mod ports;
pub mod resolver;
pub mod retry;
pub mod scorer;
pub mod translator;
pub mod types;

pub use crate::error::{BridgeError, DecodeError, OracleError, StoreError, SyncError};
pub use crate::orchestrator::{SyncOptions, SyncOrchestrator, SyncResult};
