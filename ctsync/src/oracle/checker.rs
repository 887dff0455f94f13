//! Duplication checker
//!
//! Judges candidate pairs. With the oracle disabled every pair goes to the
//! rule-based judge. With it enabled, transient failures are retried per the
//! retry policy and, once exhausted, silently downgraded to the rule-based
//! judge: a judgment failure never aborts the pass.
//!
//! A pair counts as a duplicate only when the verdict says so **and** its
//! confidence reaches the configured threshold.

use super::fallback::RuleBasedJudge;
use super::Oracle;
use crate::error::SyncError;
use crate::retry::RetryPolicy;
use crate::types::{CandidatePair, DuplicationVerdict};
use ctsync_common::config::OracleSection;
use ctsync_common::events::{EventBus, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Checker settings
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub enabled: bool,
    /// Minimum confidence (0-100) for a duplicate to count
    pub threshold: u8,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause between consecutive oracle calls in a batch
    pub inter_call_delay: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self::from(&OracleSection::default())
    }
}

impl From<&OracleSection> for CheckerConfig {
    fn from(section: &OracleSection) -> Self {
        Self {
            enabled: section.enabled,
            threshold: section.threshold.min(100),
            max_retries: section.max_retries,
            retry_delay: Duration::from_millis(section.retry_delay_ms),
            inter_call_delay: Duration::from_millis(section.inter_call_delay_ms),
        }
    }
}

/// Which judge produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    Oracle,
    Fallback,
}

/// Verdict plus the thresholded decision
#[derive(Debug, Clone)]
pub struct Judgement {
    /// Verdict as returned by the judge
    pub verdict: DuplicationVerdict,
    pub source: VerdictSource,
    /// `verdict.is_duplicate && verdict.confidence >= threshold`
    pub is_duplicate: bool,
}

/// Candidate pair with its judgement
#[derive(Debug, Clone)]
pub struct JudgedPair {
    pub pair: CandidatePair,
    pub judgement: Judgement,
}

pub struct DuplicationChecker {
    oracle: Option<Arc<dyn Oracle>>,
    fallback: RuleBasedJudge,
    config: CheckerConfig,
    retry: RetryPolicy,
}

impl DuplicationChecker {
    /// Build a checker; an enabled config without an oracle is a configuration error
    pub fn new(config: CheckerConfig, oracle: Option<Arc<dyn Oracle>>) -> Result<Self, SyncError> {
        if config.enabled && oracle.is_none() {
            return Err(SyncError::Configuration(
                "Oracle enabled but no oracle client configured (missing API key?)".to_string(),
            ));
        }
        if config.threshold > 100 {
            return Err(SyncError::Configuration(format!(
                "Oracle threshold must be within 0-100, got {}",
                config.threshold
            )));
        }

        let retry = RetryPolicy::new(config.max_retries, config.retry_delay);
        Ok(Self {
            oracle,
            fallback: RuleBasedJudge::new(),
            config,
            retry,
        })
    }

    /// Rule-based only
    pub fn disabled(threshold: u8) -> Self {
        Self {
            oracle: None,
            fallback: RuleBasedJudge::new(),
            config: CheckerConfig {
                enabled: false,
                threshold: threshold.min(100),
                ..CheckerConfig::default()
            },
            retry: RetryPolicy::none(),
        }
    }

    /// Replace the retry policy (tests use zero-delay policies)
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.oracle.is_some()
    }

    pub fn threshold(&self) -> u8 {
        self.config.threshold
    }

    /// Judge one pair
    pub async fn check_duplication(&self, pair: &CandidatePair) -> Judgement {
        let (verdict, source) = match (&self.oracle, self.config.enabled) {
            (Some(oracle), true) => {
                let result = self
                    .retry
                    .run("oracle judge", || oracle.judge(&pair.internal, &pair.external))
                    .await;
                match result {
                    Ok(verdict) => (verdict, VerdictSource::Oracle),
                    Err(e) => {
                        warn!(
                            internal_id = %pair.internal.id,
                            external = %pair.external.display_name,
                            error = %e,
                            "Oracle judgment failed, using rule-based fallback"
                        );
                        (
                            self.fallback.judge(&pair.internal, &pair.external),
                            VerdictSource::Fallback,
                        )
                    }
                }
            }
            _ => (
                self.fallback.judge(&pair.internal, &pair.external),
                VerdictSource::Fallback,
            ),
        };

        let is_duplicate = verdict.is_duplicate && verdict.confidence >= self.config.threshold;

        debug!(
            internal_id = %pair.internal.id,
            external = %pair.external.display_name,
            score = pair.score,
            confidence = verdict.confidence,
            verdict_duplicate = verdict.is_duplicate,
            is_duplicate,
            source = ?source,
            "Candidate judged"
        );

        Judgement {
            verdict,
            source,
            is_duplicate,
        }
    }

    /// Judge pairs sequentially, reporting progress per pair
    pub async fn check_batch(&self, pairs: Vec<CandidatePair>, events: Option<&EventBus>) -> Vec<JudgedPair> {
        let total = pairs.len();
        let mut judged = Vec::with_capacity(total);

        info!(
            candidates = total,
            oracle_enabled = self.is_enabled(),
            threshold = self.config.threshold,
            "Judging duplicate candidates"
        );

        for (idx, pair) in pairs.into_iter().enumerate() {
            if idx > 0 && self.is_enabled() && !self.config.inter_call_delay.is_zero() {
                tokio::time::sleep(self.config.inter_call_delay).await;
            }

            let judgement = self.check_duplication(&pair).await;

            if let Some(bus) = events {
                bus.emit_lossy(SyncEvent::OracleProgress {
                    current: idx + 1,
                    total,
                    is_duplicate: judgement.is_duplicate,
                });
            }

            judged.push(JudgedPair { pair, judgement });
        }

        judged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, OracleError};
    use crate::types::{ExternalContact, InternalContact};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn internal(name: &str) -> InternalContact {
        InternalContact {
            id: "i".into(),
            owner_id: "o".into(),
            entity_type: "person".into(),
            name: name.into(),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pair(internal: InternalContact, external: ExternalContact) -> CandidatePair {
        CandidatePair {
            internal_index: 0,
            external_index: 0,
            internal,
            external,
            score: 50,
        }
    }

    /// Replays scripted results, then repeats the last one
    struct ScriptedOracle {
        script: Mutex<Vec<Result<DuplicationVerdict, OracleError>>>,
        calls: AtomicU32,
    }

    impl ScriptedOracle {
        fn new(script: Vec<Result<DuplicationVerdict, OracleError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn judge(
            &self,
            _internal: &InternalContact,
            _external: &ExternalContact,
        ) -> Result<DuplicationVerdict, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match &script[0] {
                    Ok(v) => Ok(v.clone()),
                    Err(_) => Err(OracleError::Timeout),
                }
            }
        }
    }

    fn enabled_config(threshold: u8, retries: u32) -> CheckerConfig {
        CheckerConfig {
            enabled: true,
            threshold,
            max_retries: retries,
            retry_delay: Duration::from_millis(1),
            inter_call_delay: Duration::ZERO,
        }
    }

    fn verdict(confidence: u8, is_duplicate: bool) -> DuplicationVerdict {
        DuplicationVerdict {
            confidence,
            is_duplicate,
            reasoning: "scripted".into(),
        }
    }

    #[test]
    fn test_enabled_without_oracle_is_config_error() {
        let result = DuplicationChecker::new(enabled_config(80, 0), None);
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_disabled_exact_email_is_duplicate() {
        let mut int = internal("Alice");
        int.emails = vec!["a@x.com".into()];
        let ext = ExternalContact {
            display_name: "Zed Q".into(),
            emails: vec!["A@X.com".into()],
            ..Default::default()
        };

        let checker = DuplicationChecker::disabled(80);
        let judgement = checker.check_duplication(&pair(int, ext)).await;
        assert!(judgement.is_duplicate);
        assert_eq!(judgement.verdict.confidence, 100);
        assert_eq!(judgement.source, VerdictSource::Fallback);
    }

    #[tokio::test]
    async fn test_threshold_gates_duplicate_flag() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(verdict(75, true))]));
        let checker = DuplicationChecker::new(enabled_config(80, 0), Some(oracle)).unwrap();

        let judgement = checker
            .check_duplication(&pair(internal("A"), ExternalContact::default()))
            .await;
        assert!(judgement.verdict.is_duplicate);
        assert!(!judgement.is_duplicate);
        assert_eq!(judgement.source, VerdictSource::Oracle);
    }

    #[tokio::test]
    async fn test_high_confidence_non_duplicate_stays_non_duplicate() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(verdict(95, false))]));
        let checker = DuplicationChecker::new(enabled_config(80, 0), Some(oracle)).unwrap();

        let judgement = checker
            .check_duplication(&pair(internal("A"), ExternalContact::default()))
            .await;
        assert!(!judgement.is_duplicate);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Err(OracleError::RateLimited),
            Err(OracleError::Malformed(DecodeError::Empty)),
            Ok(verdict(90, true)),
        ]));
        let checker = DuplicationChecker::new(enabled_config(80, 3), Some(oracle.clone()))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)).without_jitter());

        let judgement = checker
            .check_duplication(&pair(internal("A"), ExternalContact::default()))
            .await;
        assert!(judgement.is_duplicate);
        assert_eq!(judgement.source, VerdictSource::Oracle);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fall_back() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(OracleError::Timeout)]));
        let checker = DuplicationChecker::new(enabled_config(80, 2), Some(oracle.clone()))
            .unwrap()
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)).without_jitter());

        let mut int = internal("A");
        int.phones = vec!["555 123 4567".into()];
        let ext = ExternalContact {
            display_name: "B".into(),
            phones: vec!["(555) 123-4567".into()],
            ..Default::default()
        };

        let judgement = checker.check_duplication(&pair(int, ext)).await;
        assert_eq!(judgement.source, VerdictSource::Fallback);
        assert!(judgement.is_duplicate);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_batch_reports_progress_per_pair() {
        let checker = DuplicationChecker::disabled(80);
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let pairs = vec![
            pair(internal("A"), ExternalContact::default()),
            pair(internal("B"), ExternalContact::default()),
        ];
        let judged = checker.check_batch(pairs, Some(&bus)).await;
        assert_eq!(judged.len(), 2);

        for expected in 1..=2 {
            match rx.recv().await.unwrap() {
                SyncEvent::OracleProgress { current, total, .. } => {
                    assert_eq!(current, expected);
                    assert_eq!(total, 2);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }
}
