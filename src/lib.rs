/*!
 * # Translatity - subtitle translation queue
 *
 * A Rust library for translating SRT subtitle files with a large-context
 * language model while keeping cue numbering and timing untouched.
 *
 * ## Features
 *
 * - Strict SRT parsing and serialization (BOM, CRLF and trailing whitespace tolerant)
 * - Greedy batching of cues under a cue count and a character or token budget
 * - Rolling context digest so later batches see what was translated before
 * - Round-robin rotation over several API keys with suspension on rate limits
 * - Retry policy with exponential and linear backoff, and per-batch fallback
 * - FIFO file queue with bounded concurrency, progress observers and cancellation
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `subtitle_codec`: SRT parsing, serialization and atomic file writes
 * - `credentials`: API key pool
 * - `translation`: Batching, prompting, retries:
 *   - `translation::chunker`: Batch packing
 *   - `translation::context`: Rolling context digest
 *   - `translation::client`: Prompt building and response splitting
 *   - `translation::retry`: Retry decisions
 *   - `translation::engine`: Per-batch retry loop
 * - `job`: Per-file state machine
 * - `queue`: Queue scheduler
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `providers`: Completion provider implementations:
 *   - `providers::gemini`: Gemini API client
 *   - `providers::mock`: Scripted provider for tests
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod credentials;
pub mod errors;
pub mod file_utils;
pub mod job;
pub mod language_utils;
pub mod providers;
pub mod queue;
pub mod subtitle_codec;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use credentials::{CredentialPool, mask_secret};
pub use errors::{FailureKind, PoolError, ProviderError, QueueError, SubtitleError};
pub use job::{FileReport, JobId, JobStatus};
pub use language_utils::prompt_language_name;
pub use queue::{QueueProgress, QueueReport, QueueScheduler};
pub use subtitle_codec::{Cue, LineEnding, SubtitleCodec};
