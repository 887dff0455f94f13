//! Test Helper Utilities
//!
//! Shared fixtures and collaborator doubles for ctsync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ctsync::adapters::{MemoryBridge, MemoryStore};
use ctsync::oracle::{CheckerConfig, DuplicationChecker, Oracle};
use ctsync::ports::AutomationBridge;
use ctsync::retry::RetryPolicy;
use ctsync::translator::PortableTranslator;
use ctsync::types::{DuplicationVerdict, ExternalContact, InternalContact};
use ctsync::{BridgeError, OracleError, SyncOptions, SyncOrchestrator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const OWNER: &str = "owner-1";

pub fn internal(id: &str, name: &str) -> InternalContact {
    let stamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    InternalContact {
        id: id.to_string(),
        owner_id: OWNER.to_string(),
        entity_type: "person".to_string(),
        name: name.to_string(),
        emails: vec![],
        phones: vec![],
        company: None,
        title: None,
        address: None,
        website: None,
        notes: String::new(),
        tags: Default::default(),
        relationship: None,
        importance: None,
        last_interaction: None,
        created_at: stamp,
        updated_at: stamp,
    }
}

pub fn external(uid: &str, name: &str) -> ExternalContact {
    ExternalContact {
        uid: Some(uid.to_string()),
        display_name: name.to_string(),
        ..Default::default()
    }
}

pub fn options() -> SyncOptions {
    let mut options = SyncOptions::new(OWNER);
    options.bridge_retry_delay = Duration::from_millis(1);
    options
}

pub async fn store_with(contacts: Vec<InternalContact>) -> Arc<MemoryStore> {
    let store = MemoryStore::with_owner(OWNER);
    for contact in contacts {
        store.insert(contact).await;
    }
    Arc::new(store)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1)).without_jitter()
}

pub fn orchestrator(
    store: Arc<MemoryStore>,
    bridge: Arc<dyn AutomationBridge>,
    checker: DuplicationChecker,
    options: SyncOptions,
) -> SyncOrchestrator {
    SyncOrchestrator::new(store, bridge, Arc::new(PortableTranslator::new()), checker, options)
        .with_bridge_retry(fast_retry())
}

/// Checker backed by a test oracle with zero delays
pub fn oracle_checker(oracle: Arc<dyn Oracle>, threshold: u8) -> DuplicationChecker {
    let config = CheckerConfig {
        enabled: true,
        threshold,
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
        inter_call_delay: Duration::ZERO,
    };
    DuplicationChecker::new(config, Some(oracle))
        .unwrap()
        .with_retry_policy(fast_retry())
}

/// Oracle that always answers the same verdict
pub struct FixedOracle {
    pub verdict: DuplicationVerdict,
    pub calls: AtomicUsize,
}

impl FixedOracle {
    pub fn new(confidence: u8, is_duplicate: bool) -> Self {
        Self {
            verdict: DuplicationVerdict {
                confidence,
                is_duplicate,
                reasoning: "fixed".to_string(),
            },
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Oracle for FixedOracle {
    async fn judge(
        &self,
        _internal: &InternalContact,
        _external: &ExternalContact,
    ) -> Result<DuplicationVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict.clone())
    }
}

/// Oracle that never answers
pub struct DownOracle {
    pub calls: AtomicUsize,
}

impl DownOracle {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Oracle for DownOracle {
    async fn judge(
        &self,
        _internal: &InternalContact,
        _external: &ExternalContact,
    ) -> Result<DuplicationVerdict, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::Timeout)
    }
}

/// Bridge wrapper that rejects chosen records and fails early handshakes
pub struct FlakyBridge {
    pub inner: MemoryBridge,
    /// Upserts whose display name contains this are rejected
    pub reject_marker: Option<String>,
    /// Number of `count()` calls that fail before succeeding
    pub handshake_failures: AtomicUsize,
    pub count_calls: AtomicUsize,
}

impl FlakyBridge {
    pub fn new(records: Vec<ExternalContact>) -> Self {
        Self {
            inner: MemoryBridge::new(records),
            reject_marker: None,
            handshake_failures: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(mut self, marker: &str) -> Self {
        self.reject_marker = Some(marker.to_string());
        self
    }

    pub fn failing_handshakes(self, failures: usize) -> Self {
        self.handshake_failures.store(failures, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl AutomationBridge for FlakyBridge {
    async fn count(&self) -> Result<usize, BridgeError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.handshake_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.handshake_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BridgeError::Unavailable("address book not running".to_string()));
        }
        self.inner.count().await
    }

    async fn fetch_range(&self, start: usize, end: usize) -> Result<Vec<ExternalContact>, BridgeError> {
        self.inner.fetch_range(start, end).await
    }

    async fn upsert(&self, contact: &ExternalContact) -> Result<(), BridgeError> {
        if let Some(marker) = &self.reject_marker {
            if contact.display_name.contains(marker.as_str()) {
                return Err(BridgeError::Rejected(contact.display_name.clone()));
            }
        }
        self.inner.upsert(contact).await
    }
}
