//! Progress event system for ctsync
//!
//! Provides the reconciliation progress events and the `EventBus` that
//! distributes them. Emission is fire-and-forget: a pass never waits on,
//! or fails because of, a slow or absent subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Ordered phases of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPhase {
    Load,
    Match,
    SyncMatched,
    DeduplicateUnmatched,
    CreateAndExport,
    Done,
}

impl SyncPhase {
    /// Phase that follows this one (`Done` is terminal)
    pub fn next(self) -> SyncPhase {
        match self {
            Self::Load => Self::Match,
            Self::Match => Self::SyncMatched,
            Self::SyncMatched => Self::DeduplicateUnmatched,
            Self::DeduplicateUnmatched => Self::CreateAndExport,
            Self::CreateAndExport | Self::Done => Self::Done,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "LOAD",
            Self::Match => "MATCH",
            Self::SyncMatched => "SYNC_MATCHED",
            Self::DeduplicateUnmatched => "DEDUPLICATE_UNMATCHED",
            Self::CreateAndExport => "CREATE_AND_EXPORT",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A pass began
    PassStarted {
        owner_id: String,
        dry_run: bool,
        timestamp: DateTime<Utc>,
    },

    /// A phase began
    PhaseStarted {
        phase: SyncPhase,
        timestamp: DateTime<Utc>,
    },

    /// One batch of external mutations was processed
    BatchProgress {
        phase: SyncPhase,
        /// 1-based batch number
        batch: usize,
        total_batches: usize,
        succeeded: usize,
        failed: usize,
    },

    /// One candidate pair was judged
    OracleProgress {
        /// 1-based position in the batch
        current: usize,
        total: usize,
        is_duplicate: bool,
    },

    /// The pass finished
    PassCompleted {
        success: bool,
        matched_synced: usize,
        merged: usize,
        imported: usize,
        exported: usize,
        skipped: usize,
        failed: usize,
        duration_ms: u64,
    },
}

/// Central event distribution bus
///
/// Uses `tokio::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when no subscriber is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the absence of subscribers
    pub fn emit_lossy(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for sync event");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut phase = SyncPhase::Load;
        let mut seen = vec![phase];
        while phase != SyncPhase::Done {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                SyncPhase::Load,
                SyncPhase::Match,
                SyncPhase::SyncMatched,
                SyncPhase::DeduplicateUnmatched,
                SyncPhase::CreateAndExport,
                SyncPhase::Done,
            ]
        );
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(8);
        let result = bus.emit(SyncEvent::PhaseStarted {
            phase: SyncPhase::Load,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        // lossy variant must not panic
        bus.emit_lossy(SyncEvent::PhaseStarted {
            phase: SyncPhase::Match,
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(SyncEvent::OracleProgress {
            current: 1,
            total: 2,
            is_duplicate: true,
        });

        match rx.recv().await.unwrap() {
            SyncEvent::OracleProgress { current, total, is_duplicate } => {
                assert_eq!((current, total, is_duplicate), (1, 2, true));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_string(&SyncEvent::PhaseStarted {
            phase: SyncPhase::SyncMatched,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"PhaseStarted\""));
        assert!(json.contains("\"phase\":\"SYNC_MATCHED\""));
    }
}
