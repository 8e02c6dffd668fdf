/*!
 * Error types for the translatity application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a failed translation attempt.
///
/// The retry policy and the credential pool both route on this value rather
/// than on the concrete provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Provider quota or request rate exceeded
    RateLimited,
    /// Credential rejected by the provider
    Auth,
    /// Network failure, timeout or server-side hiccup
    Transient,
    /// Content-level failure that will not go away on retry
    Permanent,
}

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error related to rate limiting or quota
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// Message from the provider
        message: String,
        /// Server supplied hint, if any
        retry_after: Option<Duration>,
    },

    /// Error with authentication
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error, timeout or 5xx response
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Error the provider will keep returning for this content (e.g. a safety block)
    #[error("Permanent provider error: {0}")]
    Permanent(String),

    /// The response could not be split back into one entry per cue
    #[error("Response shape mismatch: expected {expected} entries, got {actual}")]
    ResponseShapeMismatch {
        /// Number of cues sent
        expected: usize,
        /// Number of entries recovered from the response
        actual: usize,
    },
}

impl ProviderError {
    /// Classify the error for retry routing
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Authentication(_) => FailureKind::Auth,
            Self::Transient(_) => FailureKind::Transient,
            Self::Permanent(_) | Self::ResponseShapeMismatch { .. } => FailureKind::Permanent,
        }
    }

    /// Map an HTTP status code and body to a provider error
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            429 => Self::RateLimited { message, retry_after: None },
            401 | 403 => Self::Authentication(message),
            408 | 500..=599 => Self::Transient(format!("HTTP {}: {}", status_code, message)),
            _ => Self::Permanent(format!("HTTP {}: {}", status_code, message)),
        }
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// The SRT text violates block numbering, timestamp or separation rules
    #[error("Malformed subtitle at line {line}: {reason}")]
    Malformed {
        /// 1-based line number in the source text
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// Reading or writing the subtitle file failed
    #[error("Subtitle file error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubtitleError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed { line, reason: reason.into() }
    }
}

/// Errors returned by the credential pool
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoolError {
    /// Every credential is suspended or in use right now
    #[error("No credential available (next one free in {retry_in:?})")]
    NoCredentialAvailable {
        /// Time until the earliest suspension lapses; `None` when only in-use credentials remain
        retry_in: Option<Duration>,
    },

    /// Every credential was rejected or ran out of quota
    #[error("All API credentials have been exhausted")]
    Exhausted,

    /// The wait for a credential was cancelled
    #[error("Credential wait cancelled")]
    Cancelled,
}

/// Errors surfaced at queue level
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    /// No credential can be used any more; the run was halted
    #[error("No usable API credentials remain; queue halted")]
    NoUsableCredentials,

    /// `start` was called while a run is in progress
    #[error("Queue is already running")]
    AlreadyRunning,

    /// The operation targets a job that does not exist or is not in a suitable state
    #[error("Job {0} cannot be modified in its current state")]
    InvalidJob(usize),
}
