/*!
 * Retry decisions for failed translation calls.
 *
 * The policy is a pure function of the failure kind, what already happened to
 * the batch and a snapshot of the credential pool. Sleeping is left to the
 * caller.
 */

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;

use crate::app_config::RetryConfig;
use crate::credentials::{CredentialId, PoolStatus, ReleaseOutcome};
use crate::errors::{FailureKind, ProviderError};

/// Which credential the next attempt should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialChoice {
    /// Next credential in rotation
    Rotate,
    /// Stay on this credential
    Same(CredentialId),
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry { delay: Duration, credential: CredentialChoice },
    /// Stop retrying the batch; `fatal` means no credential can be used any more
    GiveUp { fatal: bool },
}

/// Failures seen so far by one batch
#[derive(Debug, Clone, Default)]
pub struct AttemptHistory {
    transient_failures: u32,
    rate_limits: HashMap<CredentialId, u32>,
    total_attempts: u32,
}

impl AttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failed attempt
    pub fn record(&mut self, kind: FailureKind, credential: CredentialId) {
        self.total_attempts += 1;
        match kind {
            FailureKind::Transient => self.transient_failures += 1,
            FailureKind::RateLimited => *self.rate_limits.entry(credential).or_insert(0) += 1,
            FailureKind::Auth | FailureKind::Permanent => {}
        }
    }

    pub fn transient_failures(&self) -> u32 {
        self.transient_failures
    }

    pub fn total_rate_limits(&self) -> u32 {
        self.rate_limits.values().sum()
    }

    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }
}

/// Retry and backoff policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// `base * 2^n`, capped
    pub fn rate_limit_backoff(&self, n: u32) -> Duration {
        let factor = 2u64.saturating_pow(n.min(32));
        let ms = self.config.rate_limit_base_ms.saturating_mul(factor).min(self.config.rate_limit_max_ms);
        Duration::from_millis(ms)
    }

    /// `base * n`
    pub fn transient_backoff(&self, n: u32) -> Duration {
        Duration::from_millis(self.config.transient_backoff_ms.saturating_mul(n as u64))
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        let ratio = self.config.jitter_ratio;
        if ratio <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra: f64 = rand::rng().random_range(0.0..=ratio);
        delay + delay.mul_f64(extra)
    }

    /// How the credential goes back to the pool after `error`.
    ///
    /// `streak` is the number of rate limits the credential hit in a row
    /// before this one.
    pub fn release_outcome(&self, error: &ProviderError, streak: u32) -> ReleaseOutcome {
        match error {
            ProviderError::RateLimited { retry_after, .. } => {
                let limit = self.config.quota_exhaustion_after;
                if limit > 0 && streak + 1 >= limit {
                    return ReleaseOutcome::QuotaExhausted;
                }
                let suspend_for = match retry_after {
                    Some(hint) => *hint,
                    None => self.with_jitter(self.rate_limit_backoff(streak)),
                };
                ReleaseOutcome::RateLimited { suspend_for }
            }
            ProviderError::Authentication(_) => ReleaseOutcome::AuthFailed,
            ProviderError::Transient(_) => ReleaseOutcome::Transient,
            ProviderError::Permanent(_) | ProviderError::ResponseShapeMismatch { .. } => ReleaseOutcome::Permanent,
        }
    }

    /// Decide the next step for a batch.
    ///
    /// `history` must already include the failure being decided on and `pool`
    /// must be taken after the credential was released.
    pub fn next_action(
        &self,
        kind: FailureKind,
        credential: CredentialId,
        history: &AttemptHistory,
        pool: &PoolStatus,
    ) -> RetryAction {
        match kind {
            FailureKind::RateLimited => {
                if pool.usable() == 0 {
                    return RetryAction::GiveUp { fatal: true };
                }
                if pool.available > 0 {
                    return RetryAction::Retry { delay: Duration::ZERO, credential: CredentialChoice::Rotate };
                }
                let n = history.total_rate_limits().saturating_sub(1);
                let backoff = self.with_jitter(self.rate_limit_backoff(n));
                let delay = backoff.max(pool.next_unsuspend_in.unwrap_or(Duration::ZERO));
                RetryAction::Retry { delay, credential: CredentialChoice::Same(credential) }
            }
            FailureKind::Auth => {
                if pool.usable() > 0 {
                    RetryAction::Retry { delay: Duration::ZERO, credential: CredentialChoice::Rotate }
                } else {
                    RetryAction::GiveUp { fatal: true }
                }
            }
            FailureKind::Transient => {
                let n = history.transient_failures();
                if n <= self.config.transient_retry_ceiling {
                    RetryAction::Retry {
                        delay: self.with_jitter(self.transient_backoff(n)),
                        credential: CredentialChoice::Same(credential),
                    }
                } else {
                    RetryAction::GiveUp { fatal: false }
                }
            }
            FailureKind::Permanent => RetryAction::GiveUp { fatal: false },
        }
    }
}
