//! Deduplication oracle
//!
//! - `Oracle`: the remote judgment seam (`HttpOracle` in production)
//! - `decoder`: strict response decoding
//! - `fallback`: deterministic rule-based judge
//! - `checker`: thresholding, retry, fallback and batch orchestration

pub mod checker;
pub mod decoder;
pub mod fallback;
pub mod http;

pub use checker::{CheckerConfig, DuplicationChecker, JudgedPair, Judgement, VerdictSource};
pub use decoder::decode_verdict;
pub use fallback::RuleBasedJudge;
pub use http::{HttpOracle, HttpOracleConfig};

use crate::error::{OracleError, SyncError};
use crate::types::{DuplicationVerdict, ExternalContact, InternalContact};
use async_trait::async_trait;
use ctsync_common::config::{resolve_oracle_api_key, TomlConfig, ORACLE_KEY_ENV_VAR};
use std::sync::Arc;
use std::time::Duration;

/// Remote judgment service: is this pair the same person?
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn judge(
        &self,
        internal: &InternalContact,
        external: &ExternalContact,
    ) -> Result<DuplicationVerdict, OracleError>;
}

/// Build the duplication checker a configuration asks for
///
/// An enabled oracle without a resolvable API key is a configuration error.
pub fn checker_from_config(config: &TomlConfig) -> Result<DuplicationChecker, SyncError> {
    let section = &config.oracle;
    let checker_config = CheckerConfig::from(section);

    if !section.enabled {
        return Ok(DuplicationChecker::disabled(checker_config.threshold));
    }

    let api_key = resolve_oracle_api_key(config).ok_or_else(|| {
        SyncError::Configuration(format!(
            "Oracle enabled but no API key configured (set {} or oracle.api_key)",
            ORACLE_KEY_ENV_VAR
        ))
    })?;

    let oracle = HttpOracle::new(HttpOracleConfig {
        api_key,
        base_url: section.base_url.clone(),
        model: section.model.clone(),
        timeout: Duration::from_secs(section.timeout_secs),
        requests_per_minute: section.requests_per_minute,
    })
    .map_err(|e| SyncError::Configuration(format!("Oracle client setup failed: {}", e)))?;

    DuplicationChecker::new(checker_config, Some(Arc::new(oracle)))
}
