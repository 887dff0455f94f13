//! Pass options, running statistics and the aggregate result

use crate::error::SyncError;
use crate::resolver::ResolverConfig;
use ctsync_common::config::TomlConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-pass settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub owner_id: String,
    /// External mutations per batch
    pub batch_size: usize,
    /// Records requested per `fetch_range` call
    pub fetch_batch_size: usize,
    pub max_candidates: usize,
    pub resolver: ResolverConfig,
    pub dry_run: bool,
    /// Representative error messages kept in the result
    pub max_errors: usize,
    pub bridge_handshake_attempts: u32,
    pub bridge_retry_delay: Duration,
}

impl SyncOptions {
    /// Defaults for one owner
    pub fn new(owner_id: impl Into<String>) -> Self {
        let mut options = Self::from_sections(&TomlConfig::default());
        options.owner_id = owner_id.into();
        options
    }

    /// Build from configuration; `owner_override` wins over `sync.owner_id`
    pub fn from_config(config: &TomlConfig, owner_override: Option<&str>) -> Result<Self, SyncError> {
        config.validate()?;

        let owner_id = owner_override
            .or(config.sync.owner_id.as_deref())
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| SyncError::Configuration("No owner id configured".to_string()))?
            .to_string();

        let mut options = Self::from_sections(config);
        options.owner_id = owner_id;
        Ok(options)
    }

    fn from_sections(config: &TomlConfig) -> Self {
        let sync = &config.sync;
        Self {
            owner_id: String::new(),
            batch_size: sync.batch_size.max(1),
            fetch_batch_size: sync.fetch_batch_size.max(1),
            max_candidates: sync.max_candidates.max(1),
            resolver: ResolverConfig {
                strategy: sync.strategy,
                auto_merge: sync.auto_merge,
            },
            dry_run: sync.dry_run,
            max_errors: sync.max_errors,
            bridge_handshake_attempts: sync.bridge_handshake_attempts.max(1),
            bridge_retry_delay: Duration::from_millis(sync.bridge_retry_delay_ms),
        }
    }
}

/// Aggregate outcome of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// No item failed
    pub success: bool,
    pub dry_run: bool,
    /// Matched pairs reconciled (including no-op pairs)
    pub matched_synced: usize,
    /// Pairs merged field-by-field or confirmed as duplicates
    pub merged: usize,
    /// External records created in the store
    pub imported: usize,
    /// Internal records created in the address book
    pub exported: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Representative error messages, capped
    pub errors: Vec<String>,
    /// Errors recorded beyond the cap
    pub errors_truncated: usize,
    pub duration_ms: u64,
}

impl SyncResult {
    /// Counters only, for comparing passes
    pub fn counts(&self) -> (usize, usize, usize, usize, usize, usize) {
        (
            self.matched_synced,
            self.merged,
            self.imported,
            self.exported,
            self.skipped,
            self.failed,
        )
    }
}

/// Capped error sample with a remainder count
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorLog {
    cap: usize,
    messages: Vec<String>,
    dropped: usize,
}

impl ErrorLog {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            messages: Vec::new(),
            dropped: 0,
        }
    }

    pub(crate) fn record(&mut self, message: String) {
        if self.messages.len() < self.cap {
            self.messages.push(message);
        } else {
            self.dropped += 1;
        }
    }

    fn into_parts(mut self) -> (Vec<String>, usize) {
        if self.dropped > 0 {
            self.messages.push(format!("... and {} more errors", self.dropped));
        }
        (self.messages, self.dropped)
    }
}

/// Counters a pass accumulates while running
#[derive(Debug, Default)]
pub(crate) struct PassStatistics {
    pub(crate) matched_synced: usize,
    pub(crate) merged: usize,
    pub(crate) imported: usize,
    pub(crate) exported: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
    errors: ErrorLog,
}

impl PassStatistics {
    pub(crate) fn new(max_errors: usize) -> Self {
        Self {
            errors: ErrorLog::new(max_errors),
            ..Default::default()
        }
    }

    /// Item-level failure: counted and sampled
    pub(crate) fn fail(&mut self, context: &str, err: &SyncError) {
        self.failed += 1;
        self.errors.record(format!("{}: {}", context, err));
    }

    /// Record excluded from the pass: counted as skipped and sampled
    pub(crate) fn skip_invalid(&mut self, context: &str, err: &SyncError) {
        self.skipped += 1;
        self.errors.record(format!("{}: {}", context, err));
    }

    pub(crate) fn into_result(self, dry_run: bool, duration_ms: u64) -> SyncResult {
        let (errors, errors_truncated) = self.errors.into_parts();
        SyncResult {
            success: self.failed == 0,
            dry_run,
            matched_synced: self.matched_synced,
            merged: self.merged,
            imported: self.imported,
            exported: self.exported,
            skipped: self.skipped,
            failed: self.failed,
            errors,
            errors_truncated,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctsync_common::config::ConflictStrategy;

    #[test]
    fn test_error_log_caps_and_summarizes() {
        let mut stats = PassStatistics::new(2);
        for i in 0..5 {
            stats.fail(&format!("item {}", i), &SyncError::Validation("bad".into()));
        }
        let result = stats.into_result(false, 10);
        assert!(!result.success);
        assert_eq!(result.failed, 5);
        assert_eq!(result.errors.len(), 3);
        assert_eq!(result.errors[2], "... and 3 more errors");
        assert_eq!(result.errors_truncated, 3);
    }

    #[test]
    fn test_invalid_records_do_not_fail_pass() {
        let mut stats = PassStatistics::new(10);
        stats.skip_invalid("record 3", &SyncError::Validation("no name".into()));
        let result = stats.into_result(true, 0);
        assert!(result.success);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = TomlConfig::default();
        config.sync.owner_id = Some("from-file".into());
        config.sync.strategy = ConflictStrategy::Newest;
        config.sync.batch_size = 7;

        let options = SyncOptions::from_config(&config, None).unwrap();
        assert_eq!(options.owner_id, "from-file");
        assert_eq!(options.batch_size, 7);
        assert_eq!(options.resolver.strategy, ConflictStrategy::Newest);

        let options = SyncOptions::from_config(&config, Some("cli")).unwrap();
        assert_eq!(options.owner_id, "cli");
    }

    #[test]
    fn test_missing_owner_is_configuration_error() {
        let result = SyncOptions::from_config(&TomlConfig::default(), None);
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }
}
