/*!
 * Batch translation with retries.
 *
 * The engine bundles the pieces shared by every file of a run: the credential
 * pool, the client, the retry policy and the chunker. `translate_batch` drives
 * one batch until it is translated, degraded to its source text, halted for
 * lack of credentials or cancelled.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::app_config::{Config, ContextConfig, OutputConfig};
use crate::credentials::{CredentialId, CredentialPool, ReleaseOutcome};
use crate::errors::PoolError;
use crate::providers::CompletionProvider;
use crate::subtitle_codec::Cue;

use super::chunker::{Chunker, CueBatch};
use super::client::{AttemptOutcome, TranslationAttempt, TranslationClient};
use super::retry::{AttemptHistory, CredentialChoice, RetryAction, RetryPolicy};

/// How a batch was resolved
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResolution {
    /// One line group per cue
    Translated { groups: Vec<Vec<String>>, attempts: Vec<TranslationAttempt> },
    /// Retries gave up; the source text stands in for the translation
    Fallback { reason: String, attempts: Vec<TranslationAttempt> },
    /// No credential can be used any more
    Halted { reason: String, attempts: Vec<TranslationAttempt> },
    Cancelled { attempts: Vec<TranslationAttempt> },
}

/// Shared translation machinery for a queue run
pub struct TranslationEngine {
    pool: Arc<CredentialPool>,
    client: TranslationClient,
    policy: RetryPolicy,
    chunker: Chunker,
    context: ContextConfig,
    output: OutputConfig,
    fallback_marker: Option<String>,
}

impl TranslationEngine {
    pub fn new(pool: Arc<CredentialPool>, client: TranslationClient, policy: RetryPolicy, chunker: Chunker) -> Self {
        Self {
            pool,
            client,
            policy,
            chunker,
            context: ContextConfig::default(),
            output: OutputConfig::default(),
            fallback_marker: None,
        }
    }

    /// Build the engine described by `config` on top of `provider`
    pub fn from_config(config: &Config, provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        let pool = CredentialPool::new(config.credentials.iter().cloned());
        if pool.is_empty() {
            return Err(anyhow!("At least one API key must be provided"));
        }
        let client = TranslationClient::from_config(config, provider);
        info!("Provider {} with credential pool: {}", client.provider_name(), pool.describe().join(", "));

        Ok(Self {
            pool: Arc::new(pool),
            client,
            policy: RetryPolicy::new(config.retry.clone()),
            chunker: Chunker::from_config(&config.chunking),
            context: config.context.clone(),
            output: config.output.clone(),
            fallback_marker: config.prompt.fallback_marker.clone().filter(|m| !m.is_empty()),
        })
    }

    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn with_fallback_marker(mut self, marker: Option<String>) -> Self {
        self.fallback_marker = marker;
        self
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn context_config(&self) -> &ContextConfig {
        &self.context
    }

    pub fn output_config(&self) -> &OutputConfig {
        &self.output
    }

    /// Whether every credential of the pool is gone
    pub fn credentials_exhausted(&self) -> bool {
        self.pool.status().usable() == 0
    }

    /// Lines written for a cue whose batch could not be translated
    pub fn fallback_lines(&self, cue: &Cue) -> Vec<String> {
        let mut lines = cue.lines.clone();
        if let (Some(marker), Some(first)) = (&self.fallback_marker, lines.first_mut()) {
            *first = format!("{}{}", marker, first);
        }
        lines
    }

    /// Translate one batch, retrying according to the policy
    pub async fn translate_batch(&self, batch: &CueBatch, context_hint: &str, cancel: &CancellationToken) -> BatchResolution {
        let mut history = AttemptHistory::new();
        let mut attempts: Vec<TranslationAttempt> = Vec::new();
        let mut preferred: Option<CredentialId> = None;

        loop {
            if cancel.is_cancelled() {
                return BatchResolution::Cancelled { attempts };
            }

            let lease = match self.pool.acquire_wait(preferred, cancel).await {
                Ok(lease) => lease,
                Err(PoolError::Cancelled) => return BatchResolution::Cancelled { attempts },
                Err(e) => {
                    error!("Batch {}: {}", batch.ordinal + 1, e);
                    return BatchResolution::Halted { reason: e.to_string(), attempts };
                }
            };

            let attempt = self.client.translate(batch, context_hint, &lease).await;
            let credential = lease.id();

            let error = match &attempt.outcome {
                AttemptOutcome::Success(groups) => {
                    let groups = groups.clone();
                    self.pool.release(lease, ReleaseOutcome::Success);
                    attempts.push(attempt);
                    return BatchResolution::Translated { groups, attempts };
                }
                AttemptOutcome::Failed(e) => e.clone(),
            };
            attempts.push(attempt);

            let kind = error.kind();
            let release = self.policy.release_outcome(&error, self.pool.rate_limit_streak(credential));
            self.pool.release(lease, release);
            history.record(kind, credential);

            match self.policy.next_action(kind, credential, &history, &self.pool.status()) {
                RetryAction::Retry { delay, credential: choice } => {
                    preferred = match choice {
                        CredentialChoice::Same(id) => Some(id),
                        CredentialChoice::Rotate => None,
                    };
                    if delay.is_zero() {
                        debug!("Batch {}: retrying with another credential", batch.ordinal + 1);
                        continue;
                    }
                    warn!(
                        "Batch {}: {:?} failure, retrying in {:.1}s (attempt {})",
                        batch.ordinal + 1,
                        kind,
                        delay.as_secs_f64(),
                        history.total_attempts() + 1
                    );
                    if !sleep_unless_cancelled(delay, cancel).await {
                        return BatchResolution::Cancelled { attempts };
                    }
                }
                RetryAction::GiveUp { fatal: true } => {
                    error!("Batch {}: no usable API credentials remain ({})", batch.ordinal + 1, error);
                    return BatchResolution::Halted {
                        reason: format!("no usable API credentials remain: {}", error),
                        attempts,
                    };
                }
                RetryAction::GiveUp { fatal: false } => {
                    warn!("Batch {}: giving up after {} attempts: {}", batch.ordinal + 1, attempts.len(), error);
                    return BatchResolution::Fallback { reason: error.to_string(), attempts };
                }
            }
        }
    }
}

/// Sleep for `delay`; returns false when cancellation interrupts the wait
async fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}
