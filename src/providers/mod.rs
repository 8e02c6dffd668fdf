/*!
 * Provider implementations for completion services.
 *
 * This module contains client implementations for the model providers:
 * - Gemini: Google Generative Language API (`generateContent`)
 * - Mock: scripted provider used by tests
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::credentials::CredentialLease;
use crate::errors::ProviderError;

/// Common trait for all completion providers
///
/// The translation engine only ever sends one prompt and reads back one text,
/// so any provider that can do that with a leased credential can be plugged in.
#[async_trait]
pub trait CompletionProvider: Send + Sync + Debug {
    /// Complete a prompt using the given credential
    ///
    /// # Arguments
    /// * `credential` - The credential to authenticate with
    /// * `prompt` - The full prompt text
    ///
    /// # Returns
    /// * `Result<String, ProviderError>` - The generated text or a classified error
    async fn complete(&self, credential: &CredentialLease, prompt: &str) -> Result<String, ProviderError>;

    /// Short provider name for logs
    fn name(&self) -> &str;
}

pub mod gemini;
pub mod mock;
