//! Collaborator interfaces
//!
//! The engine talks to the durable store, the format translator and the
//! automation bridge only through these traits. Implementations live in
//! `adapters` (and in test doubles).

use crate::error::{BridgeError, StoreError};
use crate::types::{ContactFields, ExternalContact, InternalContact};
use async_trait::async_trait;

/// Durable store of internal contacts
///
/// Assumed strongly consistent within a pass.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Whether the owner is known; unknown owners are a configuration error
    async fn owner_exists(&self, _owner_id: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn list_internal_contacts(&self, owner_id: &str) -> Result<Vec<InternalContact>, StoreError>;

    async fn create_internal_contact(
        &self,
        owner_id: &str,
        fields: ContactFields,
    ) -> Result<InternalContact, StoreError>;

    async fn update_internal_contact(
        &self,
        id: &str,
        patch: ContactFields,
    ) -> Result<InternalContact, StoreError>;
}

/// Conversion between internal records and the portable external form
pub trait FormatTranslator: Send + Sync {
    fn to_external(&self, contact: &InternalContact) -> ExternalContact;

    fn from_external(&self, contact: &ExternalContact) -> ContactFields;

    /// Problems that exclude the record from matching; empty when valid
    fn validate(&self, contact: &ExternalContact) -> Vec<String>;
}

/// Black-box enumerate/mutate interface to the external application
///
/// Single-process endpoint: callers must not issue concurrent mutations.
#[async_trait]
pub trait AutomationBridge: Send + Sync {
    async fn count(&self) -> Result<usize, BridgeError>;

    /// Records `start..=end`, 1-based inclusive
    ///
    /// Every returned record must carry a `uid`; `upsert` uses it to update
    /// the record in place.
    async fn fetch_range(&self, start: usize, end: usize) -> Result<Vec<ExternalContact>, BridgeError>;

    /// Create or update; records with a `uid` update in place
    async fn upsert(&self, contact: &ExternalContact) -> Result<(), BridgeError>;
}
