//! In-memory `ContactStore` and `AutomationBridge`
//!
//! Both keep their records behind a tokio `RwLock` and count mutations so
//! callers can verify that a dry run wrote nothing. When opened from a path,
//! `persist()` writes the current state back as pretty-printed JSON.

use crate::error::{BridgeError, StoreError};
use crate::ports::{AutomationBridge, ContactStore};
use crate::types::{ContactFields, ExternalContact, InternalContact};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// Store
// ============================================================================

/// On-disk layout of a store snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub owners: BTreeSet<String>,
    #[serde(default)]
    pub contacts: Vec<InternalContact>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreSnapshot>,
    path: Option<PathBuf>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one known owner
    pub fn with_owner(owner_id: impl Into<String>) -> Self {
        let mut snapshot = StoreSnapshot::default();
        snapshot.owners.insert(owner_id.into());
        Self::from_snapshot(snapshot)
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            path: None,
            writes: AtomicUsize::new(0),
        }
    }

    /// Load a JSON snapshot; a missing file opens an empty store bound to `path`
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let snapshot = if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| StoreError::Io(format!("Read {} failed: {}", path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| StoreError::Io(format!("Parse {} failed: {}", path.display(), e)))?
        } else {
            StoreSnapshot::default()
        };

        let mut store = Self::from_snapshot(snapshot);
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Register an owner
    pub async fn add_owner(&self, owner_id: impl Into<String>) {
        self.state.write().await.owners.insert(owner_id.into());
    }

    /// Insert or replace a record by id without counting it as a sync write
    pub async fn insert(&self, contact: InternalContact) {
        let mut state = self.state.write().await;
        state.owners.insert(contact.owner_id.clone());
        match state.contacts.iter_mut().find(|c| c.id == contact.id) {
            Some(existing) => *existing = contact,
            None => state.contacts.push(contact),
        }
    }

    pub async fn contacts(&self) -> Vec<InternalContact> {
        self.state.read().await.contacts.clone()
    }

    pub async fn get(&self, id: &str) -> Option<InternalContact> {
        self.state.read().await.contacts.iter().find(|c| c.id == id).cloned()
    }

    /// Creates and updates performed through `ContactStore`
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Write the snapshot back to the file it was opened from
    pub async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&*state)
                .map_err(|e| StoreError::Write(format!("Serialize store failed: {}", e)))?
        };
        tokio::fs::write(path, json)
            .await
            .map_err(|e| StoreError::Io(format!("Write {} failed: {}", path.display(), e)))?;
        info!(path = %path.display(), "Store persisted");
        Ok(())
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn owner_exists(&self, owner_id: &str) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state.owners.contains(owner_id) || state.contacts.iter().any(|c| c.owner_id == owner_id))
    }

    async fn list_internal_contacts(&self, owner_id: &str) -> Result<Vec<InternalContact>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create_internal_contact(
        &self,
        owner_id: &str,
        fields: ContactFields,
    ) -> Result<InternalContact, StoreError> {
        let now = Utc::now();
        let mut contact = InternalContact {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            entity_type: "person".to_string(),
            name: String::new(),
            emails: Vec::new(),
            phones: Vec::new(),
            company: None,
            title: None,
            address: None,
            website: None,
            notes: String::new(),
            tags: BTreeSet::new(),
            relationship: None,
            importance: None,
            last_interaction: None,
            created_at: now,
            updated_at: now,
        };
        fields.apply_to(&mut contact);

        self.state.write().await.contacts.push(contact.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(id = %contact.id, name = %contact.name, "Internal contact created");
        Ok(contact)
    }

    async fn update_internal_contact(
        &self,
        id: &str,
        patch: ContactFields,
    ) -> Result<InternalContact, StoreError> {
        let mut state = self.state.write().await;
        let contact = state
            .contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(contact);
        let updated = contact.clone();
        drop(state);

        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(id = %updated.id, "Internal contact updated");
        Ok(updated)
    }
}

// ============================================================================
// Bridge
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryBridge {
    records: RwLock<Vec<ExternalContact>>,
    path: Option<PathBuf>,
    upserts: AtomicUsize,
}

impl MemoryBridge {
    /// Records without a uid are assigned one so every fetched record can be
    /// updated in place
    pub fn new(records: Vec<ExternalContact>) -> Self {
        let records = records.into_iter().map(with_uid).collect();
        Self {
            records: RwLock::new(records),
            path: None,
            upserts: AtomicUsize::new(0),
        }
    }

    /// Load a JSON array of records; a missing file opens an empty address book
    pub async fn open(path: &Path) -> Result<Self, BridgeError> {
        let records = if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| BridgeError::Io(format!("Read {} failed: {}", path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| BridgeError::Io(format!("Parse {} failed: {}", path.display(), e)))?
        } else {
            Vec::new()
        };

        let mut bridge = Self::new(records);
        bridge.path = Some(path.to_path_buf());
        Ok(bridge)
    }

    pub async fn records(&self) -> Vec<ExternalContact> {
        self.records.read().await.clone()
    }

    /// Upserts performed through `AutomationBridge`
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub async fn persist(&self) -> Result<(), BridgeError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let records = self.records.read().await;
            serde_json::to_string_pretty(&*records)
                .map_err(|e| BridgeError::Io(format!("Serialize address book failed: {}", e)))?
        };
        tokio::fs::write(path, json)
            .await
            .map_err(|e| BridgeError::Io(format!("Write {} failed: {}", path.display(), e)))?;
        info!(path = %path.display(), "Address book persisted");
        Ok(())
    }
}

fn with_uid(mut contact: ExternalContact) -> ExternalContact {
    if contact.uid.as_deref().map_or(true, |uid| uid.trim().is_empty()) {
        contact.uid = Some(Uuid::new_v4().to_string());
    }
    contact
}

#[async_trait]
impl AutomationBridge for MemoryBridge {
    async fn count(&self) -> Result<usize, BridgeError> {
        Ok(self.records.read().await.len())
    }

    async fn fetch_range(&self, start: usize, end: usize) -> Result<Vec<ExternalContact>, BridgeError> {
        let records = self.records.read().await;
        let count = records.len();
        if start == 0 || start > end || end > count {
            return Err(BridgeError::InvalidRange { start, end, count });
        }
        Ok(records[start - 1..end].to_vec())
    }

    async fn upsert(&self, contact: &ExternalContact) -> Result<(), BridgeError> {
        let mut records = self.records.write().await;
        let mut incoming = contact.clone();
        incoming.modified_at = Some(Utc::now());

        let existing = incoming
            .uid
            .as_deref()
            .and_then(|uid| records.iter().position(|r| r.uid.as_deref() == Some(uid)));

        match existing {
            Some(idx) => records[idx] = incoming,
            None => records.push(with_uid(incoming)),
        }
        drop(records);

        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
