//! Sync Orchestrator
//!
//! Runs one reconciliation pass through five ordered phases:
//!
//! 1. **LOAD**: owner check, bridge handshake, sequential batched fetch, validation
//! 2. **MATCH**: tiered identity pairing
//! 3. **SYNC_MATCHED**: conflict resolution for matched pairs
//! 4. **DEDUPLICATE_UNMATCHED**: candidate scoring, judgment, merge of confirmed duplicates
//! 5. **CREATE_AND_EXPORT**: create still-unpaired records on the side lacking them
//!
//! Phases are never retried. Item failures are counted and sampled without
//! stopping the phase. External mutations are queued per phase and flushed
//! one batch at a time. A dry run executes every computational step and
//! counts every would-be write, but performs none.

pub mod result;

pub use result::{SyncOptions, SyncResult};

use crate::error::{BridgeError, StoreError, SyncError};
use crate::matcher::Matcher;
use crate::oracle::DuplicationChecker;
use crate::ports::{AutomationBridge, ContactStore, FormatTranslator};
use crate::resolver::{resolution_label, ConflictResolver};
use crate::retry::RetryPolicy;
use crate::scorer::CandidateScorer;
use crate::translator::note_with_marker;
use crate::types::{ConflictResolution, ContactFields, ExternalContact, InternalContact};
use chrono::Utc;
use ctsync_common::events::{EventBus, SyncEvent, SyncPhase};
use result::PassStatistics;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Counter credited when a queued upsert lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Credit {
    /// Matched pair overwritten from the internal side
    MatchedSynced,
    /// Matched pair merged
    MatchedMerged,
    /// Confirmed duplicate reconciled
    DuplicateMerged,
    Exported,
    /// Identifier written back onto an imported record
    LinkBack,
}

#[derive(Debug)]
struct QueuedUpsert {
    contact: ExternalContact,
    credit: Credit,
}

/// Reconciliation engine for one owner
pub struct SyncOrchestrator {
    store: Arc<dyn ContactStore>,
    bridge: Arc<dyn AutomationBridge>,
    translator: Arc<dyn FormatTranslator>,
    checker: DuplicationChecker,
    matcher: Matcher,
    scorer: CandidateScorer,
    resolver: ConflictResolver,
    options: SyncOptions,
    bridge_retry: RetryPolicy,
    events: EventBus,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn ContactStore>,
        bridge: Arc<dyn AutomationBridge>,
        translator: Arc<dyn FormatTranslator>,
        checker: DuplicationChecker,
        options: SyncOptions,
    ) -> Self {
        let bridge_retry = RetryPolicy::new(
            options.bridge_handshake_attempts.saturating_sub(1),
            options.bridge_retry_delay,
        );
        Self {
            store,
            bridge,
            translator,
            checker,
            matcher: Matcher::new(),
            scorer: CandidateScorer::new(options.max_candidates),
            resolver: ConflictResolver::new(options.resolver),
            options,
            bridge_retry,
            events: EventBus::default(),
        }
    }

    /// Publish progress on an existing bus
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Replace the retry policy applied to bridge calls
    pub fn with_bridge_retry(mut self, retry: RetryPolicy) -> Self {
        self.bridge_retry = retry;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run one full pass
    ///
    /// Returns `Err` only when the pass cannot begin: unknown owner, or a
    /// store/bridge that cannot be read. Everything after LOAD is contained
    /// to item level and reported in the result.
    pub async fn run(&self) -> Result<SyncResult, SyncError> {
        let started = Instant::now();
        let owner_id = self.options.owner_id.as_str();
        let dry_run = self.options.dry_run;
        let mut stats = PassStatistics::new(self.options.max_errors);

        info!(owner_id, dry_run, "Starting sync pass");
        self.events.emit_lossy(SyncEvent::PassStarted {
            owner_id: owner_id.to_string(),
            dry_run,
            timestamp: Utc::now(),
        });

        // Phase 1: LOAD
        self.enter_phase(SyncPhase::Load);
        let (internal, external) = self.load(&mut stats).await?;

        // Phase 2: MATCH
        self.enter_phase(SyncPhase::Match);
        let outcome = self.matcher.match_contacts(internal, external);
        info!(
            matched = outcome.matched.len(),
            unmatched_internal = outcome.unmatched_internal.len(),
            unmatched_external = outcome.unmatched_external.len(),
            "Phase MATCH complete"
        );

        // Phase 3: SYNC_MATCHED
        self.enter_phase(SyncPhase::SyncMatched);
        let mut queue = Vec::new();
        for pair in &outcome.matched {
            self.sync_matched_pair(&pair.internal, &pair.external, &mut queue, &mut stats)
                .await;
        }
        self.flush(SyncPhase::SyncMatched, queue, &mut stats).await;

        // Phase 4: DEDUPLICATE_UNMATCHED
        self.enter_phase(SyncPhase::DeduplicateUnmatched);
        let (remaining_internal, remaining_external) = self
            .deduplicate(outcome.unmatched_internal, outcome.unmatched_external, &mut stats)
            .await;

        // Phase 5: CREATE_AND_EXPORT
        self.enter_phase(SyncPhase::CreateAndExport);
        self.create_and_export(remaining_internal, remaining_external, &mut stats)
            .await;

        self.enter_phase(SyncPhase::Done);
        let result = stats.into_result(dry_run, started.elapsed().as_millis() as u64);

        info!(
            success = result.success,
            dry_run,
            matched_synced = result.matched_synced,
            merged = result.merged,
            imported = result.imported,
            exported = result.exported,
            skipped = result.skipped,
            failed = result.failed,
            duration_ms = result.duration_ms,
            "Sync pass complete"
        );
        self.events.emit_lossy(SyncEvent::PassCompleted {
            success: result.success,
            matched_synced: result.matched_synced,
            merged: result.merged,
            imported: result.imported,
            exported: result.exported,
            skipped: result.skipped,
            failed: result.failed,
            duration_ms: result.duration_ms,
        });

        Ok(result)
    }

    fn enter_phase(&self, phase: SyncPhase) {
        debug!(phase = %phase, "Entering phase");
        self.events.emit_lossy(SyncEvent::PhaseStarted {
            phase,
            timestamp: Utc::now(),
        });
    }

    // ------------------------------------------------------------------------
    // LOAD
    // ------------------------------------------------------------------------

    async fn load(
        &self,
        stats: &mut PassStatistics,
    ) -> Result<(Vec<InternalContact>, Vec<ExternalContact>), SyncError> {
        let owner_id = self.options.owner_id.as_str();

        if !self.store.owner_exists(owner_id).await? {
            return Err(SyncError::Configuration(format!("Owner not found: {}", owner_id)));
        }
        let internal = self.store.list_internal_contacts(owner_id).await?;

        let count = self
            .bridge_retry
            .run("bridge handshake", || self.bridge.count())
            .await?;

        let batch = self.options.fetch_batch_size.max(1);
        let mut fetched = Vec::with_capacity(count);
        let mut start = 1;
        while start <= count {
            let end = (start + batch - 1).min(count);
            let page = self
                .bridge_retry
                .run("bridge fetch", || self.bridge.fetch_range(start, end))
                .await?;
            debug!(start, end, received = page.len(), "Fetched external range");
            fetched.extend(page);
            start = end + 1;
        }

        let mut external = Vec::with_capacity(fetched.len());
        for (idx, contact) in fetched.into_iter().enumerate() {
            let problems = self.translator.validate(&contact);
            if problems.is_empty() {
                external.push(contact);
            } else {
                let context = format!("External record {} ({})", idx + 1, contact.display_name.trim());
                warn!(record = idx + 1, problems = ?problems, "Excluding invalid external record");
                stats.skip_invalid(&context, &SyncError::Validation(problems.join("; ")));
            }
        }

        info!(
            internal = internal.len(),
            external = external.len(),
            reported = count,
            "Phase LOAD complete"
        );
        Ok((internal, external))
    }

    // ------------------------------------------------------------------------
    // SYNC_MATCHED
    // ------------------------------------------------------------------------

    async fn sync_matched_pair(
        &self,
        internal: &InternalContact,
        external: &ExternalContact,
        queue: &mut Vec<QueuedUpsert>,
        stats: &mut PassStatistics,
    ) {
        let Some(resolution) = self.resolver.resolve(internal, external) else {
            stats.matched_synced += 1;
            return;
        };

        match resolution {
            ConflictResolution::Skip => stats.skipped += 1,
            ConflictResolution::UseInternal => queue.push(QueuedUpsert {
                contact: self.external_from_internal(internal, external),
                credit: Credit::MatchedSynced,
            }),
            ConflictResolution::UseExternal => {
                let fields = self.translator.from_external(external);
                match self.update_store(&internal.id, fields).await {
                    Ok(_) => stats.matched_synced += 1,
                    Err(e) => stats.fail(&format!("Update {}", internal.id), &e.into()),
                }
            }
            ConflictResolution::Merge(merged) => {
                let fields = merged.fields.clone();
                match self.update_store(&internal.id, fields).await {
                    Ok(_) => queue.push(QueuedUpsert {
                        contact: self.external_from_internal(&merged.into_internal(), external),
                        credit: Credit::MatchedMerged,
                    }),
                    Err(e) => stats.fail(&format!("Merge {}", internal.id), &e.into()),
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // DEDUPLICATE_UNMATCHED
    // ------------------------------------------------------------------------

    /// Judge candidates and reconcile confirmed duplicates; returns what stays unpaired
    async fn deduplicate(
        &self,
        unmatched_internal: Vec<InternalContact>,
        unmatched_external: Vec<ExternalContact>,
        stats: &mut PassStatistics,
    ) -> (Vec<InternalContact>, Vec<ExternalContact>) {
        let candidates = self.scorer.generate(&unmatched_internal, &unmatched_external);
        if candidates.is_empty() {
            info!("Phase DEDUPLICATE_UNMATCHED: no candidates");
            return (unmatched_internal, unmatched_external);
        }

        let judged = self.checker.check_batch(candidates, Some(&self.events)).await;

        let mut confirmed: Vec<_> = judged.into_iter().filter(|j| j.judgement.is_duplicate).collect();
        confirmed.sort_by(|a, b| {
            b.judgement
                .verdict
                .confidence
                .cmp(&a.judgement.verdict.confidence)
                .then(b.pair.score.cmp(&a.pair.score))
                .then(a.pair.internal_index.cmp(&b.pair.internal_index))
                .then(a.pair.external_index.cmp(&b.pair.external_index))
        });

        let mut claimed_internal = HashSet::new();
        let mut claimed_external = HashSet::new();
        let mut queue = Vec::new();

        for judged in confirmed {
            let pair = judged.pair;
            if claimed_internal.contains(&pair.internal_index)
                || claimed_external.contains(&pair.external_index)
            {
                continue;
            }
            claimed_internal.insert(pair.internal_index);
            claimed_external.insert(pair.external_index);

            debug!(
                internal_id = %pair.internal.id,
                external = %pair.external.display_name,
                confidence = judged.judgement.verdict.confidence,
                reasoning = %judged.judgement.verdict.reasoning,
                "Duplicate confirmed"
            );
            self.reconcile_duplicate(&pair.internal, &pair.external, &mut queue, stats)
                .await;
        }

        self.flush(SyncPhase::DeduplicateUnmatched, queue, stats).await;

        let remaining_internal: Vec<InternalContact> = unmatched_internal
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !claimed_internal.contains(i))
            .map(|(_, c)| c)
            .collect();
        let remaining_external: Vec<ExternalContact> = unmatched_external
            .into_iter()
            .enumerate()
            .filter(|(e, _)| !claimed_external.contains(e))
            .map(|(_, c)| c)
            .collect();

        info!(
            confirmed = claimed_internal.len(),
            remaining_internal = remaining_internal.len(),
            remaining_external = remaining_external.len(),
            "Phase DEDUPLICATE_UNMATCHED complete"
        );
        (remaining_internal, remaining_external)
    }

    /// Every reconciled duplicate ends with the internal id embedded externally
    async fn reconcile_duplicate(
        &self,
        internal: &InternalContact,
        external: &ExternalContact,
        queue: &mut Vec<QueuedUpsert>,
        stats: &mut PassStatistics,
    ) {
        let resolution = self.resolver.resolve(internal, external);
        debug!(
            internal_id = %internal.id,
            resolution = resolution.as_ref().map(resolution_label).unwrap_or("none"),
            "Reconciling duplicate"
        );

        match resolution {
            Some(ConflictResolution::Skip) => stats.skipped += 1,
            None => queue.push(QueuedUpsert {
                contact: link_back(external, &internal.id),
                credit: Credit::DuplicateMerged,
            }),
            Some(ConflictResolution::UseInternal) => queue.push(QueuedUpsert {
                contact: self.external_from_internal(internal, external),
                credit: Credit::DuplicateMerged,
            }),
            Some(ConflictResolution::UseExternal) => {
                let fields = self.translator.from_external(external);
                match self.update_store(&internal.id, fields).await {
                    Ok(_) => queue.push(QueuedUpsert {
                        contact: link_back(external, &internal.id),
                        credit: Credit::DuplicateMerged,
                    }),
                    Err(e) => stats.fail(&format!("Update {}", internal.id), &e.into()),
                }
            }
            Some(ConflictResolution::Merge(merged)) => {
                let fields = merged.fields.clone();
                match self.update_store(&internal.id, fields).await {
                    Ok(_) => queue.push(QueuedUpsert {
                        contact: self.external_from_internal(&merged.into_internal(), external),
                        credit: Credit::DuplicateMerged,
                    }),
                    Err(e) => stats.fail(&format!("Merge {}", internal.id), &e.into()),
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // CREATE_AND_EXPORT
    // ------------------------------------------------------------------------

    async fn create_and_export(
        &self,
        internal: Vec<InternalContact>,
        external: Vec<ExternalContact>,
        stats: &mut PassStatistics,
    ) {
        let mut queue: Vec<QueuedUpsert> = internal
            .iter()
            .map(|c| QueuedUpsert {
                contact: self.translator.to_external(c),
                credit: Credit::Exported,
            })
            .collect();

        for contact in &external {
            if self.options.dry_run {
                stats.imported += 1;
                queue.push(QueuedUpsert {
                    contact: contact.clone(),
                    credit: Credit::LinkBack,
                });
                continue;
            }

            let fields = self.translator.from_external(contact);
            match self
                .store
                .create_internal_contact(&self.options.owner_id, fields)
                .await
            {
                Ok(created) => {
                    stats.imported += 1;
                    queue.push(QueuedUpsert {
                        contact: link_back(contact, &created.id),
                        credit: Credit::LinkBack,
                    });
                }
                Err(e) => stats.fail(
                    &format!("Import '{}'", contact.display_name.trim()),
                    &SyncError::Persistence(e),
                ),
            }
        }

        self.flush(SyncPhase::CreateAndExport, queue, stats).await;
        info!(
            exported = stats.exported,
            imported = stats.imported,
            "Phase CREATE_AND_EXPORT complete"
        );
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    async fn update_store(&self, id: &str, fields: ContactFields) -> Result<(), StoreError> {
        if self.options.dry_run {
            debug!(id, "Dry run: skipping store update");
            return Ok(());
        }
        self.store.update_internal_contact(id, fields).await.map(|_| ())
    }

    /// External rendering of an internal record that replaces `existing` in place
    fn external_from_internal(&self, internal: &InternalContact, existing: &ExternalContact) -> ExternalContact {
        let mut contact = self.translator.to_external(internal);
        contact.uid = existing.uid.clone();
        contact
    }

    /// Apply queued upserts in batches, one batch at a time
    async fn flush(&self, phase: SyncPhase, queue: Vec<QueuedUpsert>, stats: &mut PassStatistics) {
        if queue.is_empty() {
            return;
        }

        let batch_size = self.options.batch_size.max(1);
        let total_batches = queue.len().div_ceil(batch_size);

        for (idx, chunk) in queue.chunks(batch_size).enumerate() {
            let mut succeeded = 0;
            let mut failed = 0;

            for item in chunk {
                match self.upsert(&item.contact).await {
                    Ok(()) => {
                        succeeded += 1;
                        credit(stats, item.credit);
                    }
                    Err(e) => {
                        failed += 1;
                        let context = format!("Upsert '{}'", item.contact.display_name.trim());
                        warn!(phase = %phase, error = %e, "{}", context);
                        stats.fail(&context, &SyncError::Bridge(e));
                    }
                }
            }

            debug!(
                phase = %phase,
                batch = idx + 1,
                total_batches,
                succeeded,
                failed,
                "Batch flushed"
            );
            self.events.emit_lossy(SyncEvent::BatchProgress {
                phase,
                batch: idx + 1,
                total_batches,
                succeeded,
                failed,
            });
        }
    }

    async fn upsert(&self, contact: &ExternalContact) -> Result<(), BridgeError> {
        if self.options.dry_run {
            return Ok(());
        }
        self.bridge_retry
            .run("bridge upsert", || self.bridge.upsert(contact))
            .await
    }
}

fn credit(stats: &mut PassStatistics, credit: Credit) {
    match credit {
        Credit::MatchedSynced => stats.matched_synced += 1,
        Credit::MatchedMerged => {
            stats.matched_synced += 1;
            stats.merged += 1;
        }
        Credit::DuplicateMerged => stats.merged += 1,
        Credit::Exported => stats.exported += 1,
        Credit::LinkBack => {}
    }
}

/// External record unchanged except for the embedded internal identifier
fn link_back(external: &ExternalContact, internal_id: &str) -> ExternalContact {
    let mut contact = external.clone();
    contact.internal_id = Some(internal_id.to_string());
    contact.note = note_with_marker(&external.note, internal_id);
    contact
}
