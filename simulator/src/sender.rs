use std::time::Duration;

use tic_core::chat::ChatContext;
use tic_core::config::SimulatorConfig;
use tic_core::errors::{GeminiError, GeminiResult};
use tracing::{debug, error, warn};

/// Lower-cased fragments that mark an upstream failure as throttling.
///
/// Matching on message text is brittle against provider wording changes;
/// `classify_failure` is the only place that knows about it.
pub const RATE_LIMIT_SIGNATURES: &[&str] = &["429", "quota", "resource_exhausted", "rate limit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Upstream,
}

pub fn classify_failure(err: &GeminiError) -> FailureKind {
    if err.status_code() == Some(429) {
        return FailureKind::RateLimited;
    }
    let message = err.to_string().to_lowercase();
    if RATE_LIMIT_SIGNATURES.iter().any(|sig| message.contains(sig)) {
        FailureKind::RateLimited
    } else {
        FailureKind::Upstream
    }
}

/// Result of a paced send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Reply(String),
    /// The provider is throttling; nothing was added to the context
    Deferred,
}

#[derive(Debug, Clone)]
pub struct SendPolicy {
    /// Fixed wait before every call
    pub pacing: Duration,
    /// Automatic retries after a rate-limit failure before deferring
    pub rate_limit_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(2),
            rate_limit_retries: 0,
            retry_base_delay: Duration::from_secs(10),
            retry_max_delay: Duration::from_secs(60),
        }
    }
}

impl SendPolicy {
    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self {
            pacing: Duration::from_millis(config.pacing_ms),
            rate_limit_retries: config.rate_limit_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            ..Default::default()
        }
    }

    /// No pacing, no retries
    pub fn immediate() -> Self {
        Self {
            pacing: Duration::ZERO,
            rate_limit_retries: 0,
            retry_base_delay: Duration::ZERO,
            retry_max_delay: Duration::ZERO,
        }
    }

    /// Exponential backoff, doubling from the base delay
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

/// Paces calls to a shared, quota-limited model and turns throttling into
/// a deferral instead of an error.
#[derive(Debug, Clone, Default)]
pub struct RateLimitedSender {
    policy: SendPolicy,
}

impl RateLimitedSender {
    pub fn new(policy: SendPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SendPolicy {
        &self.policy
    }

    pub async fn send(&self, context: &mut ChatContext, text: &str) -> GeminiResult<SendOutcome> {
        self.send_batch(context, &[text]).await
    }

    /// Sends several teacher messages as a single turn
    pub async fn send_batch(
        &self,
        context: &mut ChatContext,
        texts: &[&str],
    ) -> GeminiResult<SendOutcome> {
        let mut attempt = 0;
        loop {
            if !self.policy.pacing.is_zero() {
                tokio::time::sleep(self.policy.pacing).await;
            }

            let err = match context.send_batch(texts).await {
                Ok(reply) => {
                    debug!(attempt, reply_len = reply.len(), "Model replied");
                    return Ok(SendOutcome::Reply(reply));
                }
                Err(e) => e,
            };

            match classify_failure(&err) {
                FailureKind::RateLimited if attempt < self.policy.rate_limit_retries => {
                    attempt += 1;
                    let delay = self.policy.retry_delay(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Rate limited, backing off");
                    tokio::time::sleep(delay).await;
                }
                FailureKind::RateLimited => {
                    warn!(error = %err, "Rate limited, deferring turn");
                    return Ok(SendOutcome::Deferred);
                }
                FailureKind::Upstream => {
                    error!(error = %err, "Model call failed");
                    return Err(err);
                }
            }
        }
    }
}
