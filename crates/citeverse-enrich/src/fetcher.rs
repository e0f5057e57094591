//! Rate-limited HTTP fetcher.
//!
//! One retry/backoff wrapper for every outbound call the pipeline makes.
//! Policy:
//! - 429: honor a numeric `Retry-After` header when present, otherwise
//!   exponential backoff `base * 2^attempt + uniform jitter`, capped
//! - 5xx and transport errors (including timeouts): same backoff, no
//!   `Retry-After`
//! - any other non-2xx: fail immediately with status and body
//!
//! A per-source consecutive-429 counter acts as a circuit-breaker-lite:
//! five 429s in a row against the same source (across calls, not one
//! request) suspend that source for a long cooldown, after which pacing
//! resumes deliberately slowed. The counter resets on any 2xx.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::SourceTag;

const USER_AGENT: &str = "citeverse/0.1 (mailto:citeverse@example.com)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const COOLDOWN_AFTER_429S: u32 = 5;
const COOLDOWN: Duration = Duration::from_secs(180);
const SLOWED_PACE: Duration = Duration::from_secs(6);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} on {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("attempt budget exhausted after {attempts} attempts (last status {last_status:?})")]
    Exhausted { attempts: u32, last_status: Option<u16> },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request not cloneable for retry")]
    NotRetryable,
}

/// Backoff parameters, shared by all call sites so constants cannot drift.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(12),
            jitter: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the backoff: `base * 2^attempt`, capped.
    /// Non-decreasing in `attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn sleep_for(&self, attempt: u32) -> Duration {
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.backoff_delay(attempt) + Duration::from_millis(jitter_ms)
    }
}

/// What one non-2xx response means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryStep {
    /// 429; wait the given `Retry-After` duration, or the backoff when the
    /// server sent none.
    RateLimited(Option<Duration>),
    /// 5xx; wait the backoff.
    Backoff,
    /// Anything else; surface status and body immediately.
    GiveUp,
}

fn classify_status(status: u16, retry_after: Option<f64>) -> RetryStep {
    match status {
        429 => RetryStep::RateLimited(retry_after.map(Duration::from_secs_f64)),
        500..=599 => RetryStep::Backoff,
        _ => RetryStep::GiveUp,
    }
}

/// Consecutive-429 bookkeeping per source. `record_429` reports whether the
/// streak just hit the cooldown threshold; the streak resets both then and
/// on any success.
#[derive(Debug, Default)]
struct RateLimitLedger {
    consecutive_429: HashMap<SourceTag, u32>,
}

impl RateLimitLedger {
    fn record_success(&mut self, tag: SourceTag) {
        self.consecutive_429.insert(tag, 0);
    }

    fn record_429(&mut self, tag: SourceTag) -> bool {
        let count = self.consecutive_429.entry(tag).or_insert(0);
        *count += 1;
        if *count >= COOLDOWN_AFTER_429S {
            *count = 0;
            true
        } else {
            false
        }
    }
}

/// The single outbound HTTP wrapper. Knows nothing about paper records or
/// the database.
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
    pace: Duration,
    ledger: RateLimitLedger,
}

impl Fetcher {
    pub fn new(policy: RetryPolicy, pace: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            policy,
            pace,
            ledger: RateLimitLedger::default(),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET with query parameters, parsed as JSON.
    pub async fn get_json(
        &mut self,
        tag: SourceTag,
        url: &str,
        query: &[(&str, String)],
        headers: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let mut builder = self.client.get(url).query(query);
        for (k, v) in headers {
            builder = builder.header(*k, v);
        }
        let resp = self.send_with_retry(tag, builder, self.policy.max_attempts).await?;
        Ok(resp.json().await?)
    }

    /// GET returning the raw body (the arXiv Atom feed is XML).
    pub async fn get_text(
        &mut self,
        tag: SourceTag,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<String, FetchError> {
        let builder = self.client.get(url).query(query);
        let resp = self.send_with_retry(tag, builder, self.policy.max_attempts).await?;
        Ok(resp.text().await?)
    }

    /// POST a JSON payload, parsed as JSON. Batch endpoints get a slightly
    /// larger attempt budget than single lookups.
    pub async fn post_json(
        &mut self,
        tag: SourceTag,
        url: &str,
        payload: &serde_json::Value,
        headers: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let mut builder = self.client.post(url).json(payload);
        for (k, v) in headers {
            builder = builder.header(*k, v);
        }
        let resp = self
            .send_with_retry(tag, builder, self.policy.max_attempts + 2)
            .await?;
        Ok(resp.json().await?)
    }

    async fn send_with_retry(
        &mut self,
        tag: SourceTag,
        builder: reqwest::RequestBuilder,
        max_attempts: u32,
    ) -> Result<reqwest::Response, FetchError> {
        let mut last_status: Option<u16> = None;

        for attempt in 0..max_attempts {
            let request = builder.try_clone().ok_or(FetchError::NotRetryable)?;
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    self.ledger.record_success(tag);
                    tokio::time::sleep(self.pace).await;
                    return Ok(resp);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    last_status = Some(status);
                    match classify_status(status, retry_after_secs(&resp)) {
                        RetryStep::RateLimited(after) => {
                            let wait = after.unwrap_or_else(|| self.policy.sleep_for(attempt));
                            warn!(
                                source = tag.as_str(),
                                attempt,
                                wait_secs = wait.as_secs_f64(),
                                "HTTP 429, backing off"
                            );
                            self.note_429(tag).await;
                            tokio::time::sleep(wait).await;
                        }
                        RetryStep::Backoff => {
                            let wait = self.policy.sleep_for(attempt);
                            warn!(
                                source = tag.as_str(),
                                status,
                                attempt,
                                wait_secs = wait.as_secs_f64(),
                                "Server error, backing off"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        RetryStep::GiveUp => {
                            let url = resp.url().to_string();
                            let body = resp.text().await.unwrap_or_default();
                            return Err(FetchError::Status { status, url, body });
                        }
                    }
                }
                Err(e) => {
                    // connect errors and timeouts are retryable like a 5xx
                    let wait = self.policy.sleep_for(attempt);
                    warn!(
                        source = tag.as_str(),
                        error = %e,
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        "Transport error, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last_status,
        })
    }

    /// Count a 429 against `tag`; at the threshold, suspend the source for
    /// the long cooldown and slow the pace for the rest of the run.
    async fn note_429(&mut self, tag: SourceTag) {
        if self.ledger.record_429(tag) {
            warn!(
                source = tag.as_str(),
                cooldown_secs = COOLDOWN.as_secs(),
                "Source rate limiting persistently, entering cooldown"
            );
            tokio::time::sleep(COOLDOWN).await;
            self.pace = self.pace.max(SLOWED_PACE);
            debug!(pace_secs = self.pace.as_secs_f64(), "Cooldown over, resuming slowed");
        }
    }
}

/// `Retry-After` is honored only when numeric; HTTP-date values fall back
/// to the computed backoff.
fn retry_after_secs(resp: &reqwest::Response) -> Option<f64> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()
        .and_then(parse_retry_after)
}

fn parse_retry_after(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|s| *s >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let policy = RetryPolicy::default();
        let mut prev = Duration::ZERO;
        for attempt in 0..10 {
            let d = policy.backoff_delay(attempt);
            assert!(d >= prev, "backoff decreased at attempt {attempt}");
            assert!(d <= policy.max_delay);
            prev = d;
        }
        // large attempt counts must not overflow
        assert_eq!(policy.backoff_delay(64), policy.max_delay);
    }

    #[test]
    fn test_backoff_starts_at_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), policy.base_delay);
        assert_eq!(policy.backoff_delay(1), policy.base_delay * 2);
    }

    #[test]
    fn test_sleep_for_adds_bounded_jitter() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let total = policy.sleep_for(2);
            let floor = policy.backoff_delay(2);
            assert!(total >= floor);
            assert!(total <= floor + policy.jitter);
        }
    }

    #[test]
    fn test_classify_status_honors_numeric_retry_after_on_429_only() {
        assert_eq!(
            classify_status(429, Some(3.0)),
            RetryStep::RateLimited(Some(Duration::from_secs(3)))
        );
        assert_eq!(classify_status(429, None), RetryStep::RateLimited(None));
        // Retry-After on a 5xx does not shortcut the backoff
        assert_eq!(classify_status(503, Some(3.0)), RetryStep::Backoff);
    }

    #[test]
    fn test_classify_status_retries_server_errors_only() {
        assert_eq!(classify_status(500, None), RetryStep::Backoff);
        assert_eq!(classify_status(599, None), RetryStep::Backoff);
        for status in [400, 403, 404, 410] {
            assert_eq!(classify_status(status, None), RetryStep::GiveUp, "status {status}");
        }
    }

    #[test]
    fn test_parse_retry_after_numeric_only() {
        assert_eq!(parse_retry_after("3"), Some(3.0));
        assert_eq!(parse_retry_after(" 2.5 "), Some(2.5));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("Wed, 21 Oct 2026 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
    }

    #[test]
    fn test_ledger_trips_at_threshold_and_resets() {
        let mut ledger = RateLimitLedger::default();
        for i in 1..COOLDOWN_AFTER_429S {
            assert!(!ledger.record_429(SourceTag::OpenAlex), "tripped early at {i}");
        }
        assert!(ledger.record_429(SourceTag::OpenAlex));
        // the streak starts over after a cooldown
        assert!(!ledger.record_429(SourceTag::OpenAlex));
    }

    #[test]
    fn test_ledger_success_resets_streak_per_source() {
        let mut ledger = RateLimitLedger::default();
        for _ in 0..COOLDOWN_AFTER_429S - 1 {
            ledger.record_429(SourceTag::OpenAlex);
            ledger.record_429(SourceTag::SemanticScholar);
        }
        ledger.record_success(SourceTag::OpenAlex);
        assert!(!ledger.record_429(SourceTag::OpenAlex));
        // the other source's streak is untouched
        assert!(ledger.record_429(SourceTag::SemanticScholar));
    }
}
