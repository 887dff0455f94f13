//! HTTP oracle client
//!
//! Sends one comparison request per pair to a messages-style text completion
//! endpoint and hands the reply text to the strict decoder. Every request,
//! retries included, draws a slot from a per-minute request budget.

use super::decoder::decode_verdict;
use super::Oracle;
use crate::error::OracleError;
use crate::types::{DuplicationVerdict, ExternalContact, InternalContact};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

const USER_AGENT: &str = concat!("ctsync/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 300;

/// Fixed instruction sent with every comparison
pub const JUDGE_INSTRUCTION: &str = "You compare two contact records and decide whether they describe the same real person. \
Respond with strict JSON only, no prose and no code fences, in exactly this shape: \
{\"confidence\": <integer 0-100>, \"isDuplicate\": <true|false>, \"reasoning\": \"<one short sentence>\"}";

/// Connection settings for `HttpOracle`
#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Request budget; 0 means unlimited
    pub requests_per_minute: u32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Direct (unkeyed) limiter over the oracle endpoint
type RequestLimiter = governor::DefaultDirectRateLimiter;

/// Evenly spaced budget with no burst; `None` when unlimited
fn request_limiter(requests_per_minute: u32) -> Option<RequestLimiter> {
    NonZeroU32::new(requests_per_minute).map(|per_minute| {
        RateLimiter::direct(Quota::per_minute(per_minute).allow_burst(NonZeroU32::MIN))
    })
}

/// Remote language-model judge
pub struct HttpOracle {
    http_client: reqwest::Client,
    limiter: Option<RequestLimiter>,
    config: HttpOracleConfig,
}

impl HttpOracle {
    pub fn new(config: HttpOracleConfig) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            limiter: request_limiter(config.requests_per_minute),
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, prompt: String) -> Result<String, OracleError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: MAX_TOKENS,
            system: JUDGE_INSTRUCTION,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(model = %self.config.model, "Querying oracle");

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text)
                .expect("non-2xx status always maps to an OracleError"));
        }

        let parsed: MessagesResponse = response.json().await.map_err(map_transport_error)?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(text)
    }
}

/// Error for a non-success status; 429 and 529 (overloaded) are rate limits
fn status_error(status: u16, body: String) -> Option<OracleError> {
    match status {
        200..=299 => None,
        429 | 529 => Some(OracleError::RateLimited),
        401 | 403 => Some(OracleError::Unauthorized),
        _ => Some(OracleError::Api(status, body)),
    }
}

fn map_transport_error(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout
    } else if err.is_decode() {
        OracleError::Network(format!("undecodable response body: {}", err))
    } else {
        OracleError::Network(err.to_string())
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn judge(
        &self,
        internal: &InternalContact,
        external: &ExternalContact,
    ) -> Result<DuplicationVerdict, OracleError> {
        let text = self.complete(build_comparison_prompt(internal, external)).await?;
        Ok(decode_verdict(&text)?)
    }
}

/// Structured natural-language description of both records
pub fn build_comparison_prompt(internal: &InternalContact, external: &ExternalContact) -> String {
    let mut prompt = String::from("Are these two contacts the same person?\n\nContact A (memory store):\n");
    push_line(&mut prompt, "Name", Some(internal.name.as_str()));
    push_line(&mut prompt, "Emails", join(&internal.emails).as_deref());
    push_line(&mut prompt, "Phones", join(&internal.phones).as_deref());
    push_line(&mut prompt, "Organization", internal.company.as_deref());
    push_line(&mut prompt, "Title", internal.title.as_deref());
    push_line(&mut prompt, "Address", internal.address.as_deref());

    prompt.push_str("\nContact B (address book):\n");
    push_line(&mut prompt, "Name", Some(external.display_name.as_str()));
    push_line(&mut prompt, "Emails", join(&external.emails).as_deref());
    push_line(&mut prompt, "Phones", join(&external.phones).as_deref());
    push_line(&mut prompt, "Organization", external.organization.as_deref());
    push_line(&mut prompt, "Title", external.title.as_deref());
    let address = external.address.as_ref().and_then(|a| a.to_line());
    push_line(&mut prompt, "Address", address.as_deref());

    prompt.push_str("\nReturn only the JSON object.");
    prompt
}

fn push_line(prompt: &mut String, label: &str, value: Option<&str>) {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or("(none)");
    prompt.push_str(&format!("- {}: {}\n", label, value));
}

fn join(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}
