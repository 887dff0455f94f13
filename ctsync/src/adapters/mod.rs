//! Collaborator implementations
//!
//! In-memory store and bridge, optionally backed by a JSON file so the CLI
//! can run passes against a pair of local snapshots.

pub mod memory;

pub use memory::{MemoryBridge, MemoryStore};
