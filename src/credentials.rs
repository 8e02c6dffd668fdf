/*!
 * API credential pool.
 *
 * Credentials are handed out round-robin, one holder at a time. A rate
 * limited credential is suspended for a while, a rejected one is exhausted
 * for the rest of the run. All state transitions happen under one lock.
 */

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::errors::PoolError;

/// Position of a credential in its pool
pub type CredentialId = usize;

/// Lifecycle state of a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Available,
    InUse,
    Suspended { until: Instant },
    Exhausted,
}

impl CredentialState {
    fn is_usable_at(&self, now: Instant) -> bool {
        match self {
            Self::Available => true,
            Self::Suspended { until } => *until <= now,
            Self::InUse | Self::Exhausted => false,
        }
    }
}

/// How an attempt ended, from the credential's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Success,
    Transient,
    /// Content-level failure; the credential is fine
    Permanent,
    RateLimited { suspend_for: Duration },
    AuthFailed,
    /// Too many rate limits in a row; treated like a rejected key
    QuotaExhausted,
}

struct Credential {
    label: String,
    secret: String,
    state: CredentialState,
    // Rate limits in a row since the last success
    rate_limit_streak: u32,
}

/// Exclusive hold on one credential, returned to the pool with `release`
pub struct CredentialLease {
    id: CredentialId,
    label: String,
    secret: String,
}

impl CredentialLease {
    pub fn id(&self) -> CredentialId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("secret", &mask_secret(&self.secret))
            .finish()
    }
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub available: usize,
    pub in_use: usize,
    pub suspended: usize,
    pub exhausted: usize,
    /// Time until the earliest suspension lapses
    pub next_unsuspend_in: Option<Duration>,
}

impl PoolStatus {
    /// Credentials that are not exhausted
    pub fn usable(&self) -> usize {
        self.available + self.in_use + self.suspended
    }
}

struct PoolState {
    credentials: Vec<Credential>,
    cursor: usize,
}

/// Shared pool of API credentials
pub struct CredentialPool {
    state: Mutex<PoolState>,
    released: Notify,
}

impl CredentialPool {
    /// Build a pool from raw secrets; blank entries are skipped
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials = secrets
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.trim().is_empty())
            .enumerate()
            .map(|(i, secret)| Credential {
                label: format!("key-{}", i + 1),
                secret: secret.trim().to_string(),
                state: CredentialState::Available,
                rate_limit_streak: 0,
            })
            .collect();

        Self {
            state: Mutex::new(PoolState { credentials, cursor: 0 }),
            released: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state of one credential
    pub fn state_of(&self, id: CredentialId) -> Option<CredentialState> {
        self.state.lock().credentials.get(id).map(|c| c.state)
    }

    /// Rate limits `id` hit in a row since its last successful call
    pub fn rate_limit_streak(&self, id: CredentialId) -> u32 {
        self.state.lock().credentials.get(id).map_or(0, |c| c.rate_limit_streak)
    }

    /// Take the next usable credential in round-robin order
    pub fn acquire(&self) -> Result<CredentialLease, PoolError> {
        self.acquire_at(None, Instant::now())
    }

    /// Take `preferred` if it is usable, otherwise behave like `acquire`
    pub fn acquire_preferring(&self, preferred: Option<CredentialId>) -> Result<CredentialLease, PoolError> {
        self.acquire_at(preferred, Instant::now())
    }

    /// Acquire against an explicit clock reading
    pub fn acquire_at(&self, preferred: Option<CredentialId>, now: Instant) -> Result<CredentialLease, PoolError> {
        let mut state = self.state.lock();
        let count = state.credentials.len();

        let preferred = preferred.filter(|&id| {
            state.credentials.get(id).is_some_and(|c| c.state.is_usable_at(now))
        });
        let chosen = preferred.or_else(|| {
            (0..count)
                .map(|offset| (state.cursor + offset) % count)
                .find(|&idx| state.credentials[idx].state.is_usable_at(now))
        });

        if let Some(idx) = chosen {
            let credential = &mut state.credentials[idx];
            credential.state = CredentialState::InUse;
            let lease = CredentialLease {
                id: idx,
                label: credential.label.clone(),
                secret: credential.secret.clone(),
            };
            state.cursor = (idx + 1) % count;
            debug!("Acquired credential {}", lease.label);
            return Ok(lease);
        }

        if state.credentials.iter().all(|c| c.state == CredentialState::Exhausted) {
            return Err(PoolError::Exhausted);
        }

        let retry_in = state
            .credentials
            .iter()
            .filter_map(|c| match c.state {
                CredentialState::Suspended { until } => Some(until.saturating_duration_since(now)),
                _ => None,
            })
            .min();

        Err(PoolError::NoCredentialAvailable { retry_in })
    }

    /// Wait until a credential can be acquired.
    ///
    /// Returns `Exhausted` as soon as no credential can ever be used again and
    /// `Cancelled` when `cancel` fires first.
    pub async fn acquire_wait(&self, preferred: Option<CredentialId>, cancel: &CancellationToken) -> Result<CredentialLease, PoolError> {
        loop {
            let released = self.released.notified();
            let retry_in = match self.acquire_preferring(preferred) {
                Ok(lease) => return Ok(lease),
                Err(PoolError::NoCredentialAvailable { retry_in }) => retry_in,
                Err(e) => return Err(e),
            };
            if cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }

            // Woken by a release, by the earliest suspension lapsing, or by cancellation
            let wait = retry_in.unwrap_or(Duration::from_secs(3600));
            tokio::select! {
                _ = released => {}
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            }
        }
    }

    /// Return a credential to the pool
    pub fn release(&self, lease: CredentialLease, outcome: ReleaseOutcome) {
        self.release_at(lease, outcome, Instant::now());
    }

    /// Release against an explicit clock reading
    pub fn release_at(&self, lease: CredentialLease, outcome: ReleaseOutcome, now: Instant) {
        {
            let mut state = self.state.lock();
            let Some(credential) = state.credentials.get_mut(lease.id) else {
                return;
            };
            match outcome {
                ReleaseOutcome::Success => credential.rate_limit_streak = 0,
                ReleaseOutcome::RateLimited { .. } => credential.rate_limit_streak += 1,
                _ => {}
            }
            credential.state = match outcome {
                ReleaseOutcome::Success | ReleaseOutcome::Transient | ReleaseOutcome::Permanent => {
                    CredentialState::Available
                }
                ReleaseOutcome::RateLimited { suspend_for } => {
                    info!("Credential {} rate limited, suspended for {:.1}s", lease.label, suspend_for.as_secs_f64());
                    CredentialState::Suspended { until: now + suspend_for }
                }
                ReleaseOutcome::AuthFailed => {
                    warn!("Credential {} ({}) rejected, removing it for this run", lease.label, mask_secret(&lease.secret));
                    CredentialState::Exhausted
                }
                ReleaseOutcome::QuotaExhausted => {
                    warn!("Credential {} ({}) out of quota, removing it for this run", lease.label, mask_secret(&lease.secret));
                    CredentialState::Exhausted
                }
            };
        }
        self.released.notify_waiters();
    }

    /// Snapshot of the pool
    pub fn status(&self) -> PoolStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> PoolStatus {
        let state = self.state.lock();
        let mut status = PoolStatus::default();
        for credential in &state.credentials {
            match credential.state {
                CredentialState::Available => status.available += 1,
                CredentialState::InUse => status.in_use += 1,
                CredentialState::Exhausted => status.exhausted += 1,
                CredentialState::Suspended { until } if until <= now => status.available += 1,
                CredentialState::Suspended { until } => {
                    status.suspended += 1;
                    let remaining = until - now;
                    status.next_unsuspend_in = Some(match status.next_unsuspend_in {
                        Some(current) => current.min(remaining),
                        None => remaining,
                    });
                }
            }
        }
        status
    }

    /// Masked labels for display, in pool order
    pub fn describe(&self) -> Vec<String> {
        self.state
            .lock()
            .credentials
            .iter()
            .map(|c| format!("{} {}", c.label, mask_secret(&c.secret)))
            .collect()
    }
}

/// Mask an API key for display, keeping the first and last four characters
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 8), tail)
}
