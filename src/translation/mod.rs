/*!
 * Chunked contextual translation.
 *
 * This module turns parsed cues into translated line groups. It is split into
 * several submodules:
 *
 * - `chunker`: Packing cues into model-sized batches
 * - `context`: Rolling digest of recently translated text
 * - `client`: Prompt building, the provider call and response splitting
 * - `retry`: Retry and backoff decisions
 * - `engine`: The retry loop tying the pieces above to the credential pool
 */

// Re-export main types for easier usage
pub use self::chunker::{ApproxTokens, CharCount, Chunker, CostEstimator, CueBatch};
pub use self::client::{AttemptOutcome, TranslationAttempt, TranslationClient};
pub use self::context::ContextDigest;
pub use self::engine::{BatchResolution, TranslationEngine};
pub use self::retry::{AttemptHistory, CredentialChoice, RetryAction, RetryPolicy};

// Submodules
pub mod chunker;
pub mod client;
pub mod context;
pub mod engine;
pub mod retry;
