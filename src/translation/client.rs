/*!
 * Single batch translation call.
 *
 * Builds the prompt for a batch, sends it through the provider with a per-call
 * timeout and splits the response back into one line group per cue. Entries
 * are tagged `<<ENTRY_i>>` by their position in the batch and the list is
 * closed by `<<END>>`.
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::app_config::Config;
use crate::credentials::{CredentialId, CredentialLease};
use crate::errors::ProviderError;
use crate::language_utils::prompt_language_name;
use crate::providers::CompletionProvider;
use crate::subtitle_codec::split_text_lines;

use super::chunker::CueBatch;

/// Regex for matching entry markers
static ENTRY_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<<ENTRY_(\d+)>>").expect("Invalid entry marker regex")
});

/// End marker constant
pub const END_MARKER: &str = "<<END>>";

/// Marker placed before entry `ordinal`
pub fn entry_marker(ordinal: usize) -> String {
    format!("<<ENTRY_{}>>", ordinal)
}

/// Result of one call for one batch
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// One line group per cue, in batch order
    Success(Vec<Vec<String>>),
    Failed(ProviderError),
}

// @struct: Record of a single translation call
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationAttempt {
    pub batch_ordinal: usize,
    pub credential_id: CredentialId,
    pub outcome: AttemptOutcome,
}

/// Sends batches to the provider and decodes the replies
#[derive(Debug, Clone)]
pub struct TranslationClient {
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    request_timeout: Duration,
}

impl TranslationClient {
    pub fn new(provider: Arc<dyn CompletionProvider>, system_prompt: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            request_timeout,
        }
    }

    pub fn from_config(config: &Config, provider: Arc<dyn CompletionProvider>) -> Self {
        Self::new(provider, config.prompt.system_prompt.clone(), config.provider.request_timeout())
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build the full prompt for a batch
    pub fn build_prompt(&self, batch: &CueBatch, context_hint: &str) -> String {
        let source = language_label(&batch.source_language);
        let target = language_label(&batch.target_language);

        let mut prompt = self
            .system_prompt
            .replace("{source_language}", &source)
            .replace("{target_language}", &target);
        prompt.push_str("\n\n");

        if !context_hint.trim().is_empty() {
            prompt.push_str("Additional context about this content:\n");
            prompt.push_str(context_hint.trim());
            prompt.push_str("\n\n");
        }

        if !batch.context_digest.is_empty() {
            prompt.push_str("Previously translated subtitles, for continuity only (do not translate or repeat them):\n");
            prompt.push_str(&batch.context_digest);
            prompt.push_str("\n\n");
        }

        prompt.push_str(
            "Translate each entry below. Keep every entry marker exactly as written, \
             put the translation of an entry on the lines right after its marker, \
             keep the number of entries unchanged and finish with the end marker.\n\n",
        );

        for (ordinal, cue) in batch.cues.iter().enumerate() {
            prompt.push_str(&entry_marker(ordinal));
            prompt.push('\n');
            prompt.push_str(&cue.text());
            prompt.push('\n');
        }
        prompt.push_str(END_MARKER);

        prompt
    }

    /// Translate one batch with the leased credential.
    ///
    /// A call that does not finish within the request timeout is reported as
    /// a transient failure.
    pub async fn translate(&self, batch: &CueBatch, context_hint: &str, lease: &CredentialLease) -> TranslationAttempt {
        let prompt = self.build_prompt(batch, context_hint);
        debug!(
            "Sending batch {} ({} cues) to {} with credential {}",
            batch.ordinal + 1,
            batch.len(),
            self.provider_name(),
            lease.label()
        );

        let result = match tokio::time::timeout(self.request_timeout, self.provider.complete(lease, &prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient(format!(
                "request timed out after {}s",
                self.request_timeout.as_secs_f64()
            ))),
        };

        let outcome = match result.and_then(|text| parse_response(&text, batch)) {
            Ok(groups) => AttemptOutcome::Success(groups),
            Err(e) => {
                warn!("Batch {} failed with credential {}: {}", batch.ordinal + 1, lease.label(), e);
                AttemptOutcome::Failed(e)
            }
        };

        TranslationAttempt {
            batch_ordinal: batch.ordinal,
            credential_id: lease.id(),
            outcome,
        }
    }
}

fn language_label(language: &str) -> String {
    prompt_language_name(language).unwrap_or_else(|_| language.trim().to_string())
}

/// Split a marked-up text into `(ordinal, body)` pairs, in order of appearance.
///
/// Text after the end marker is ignored; the end marker itself is optional here.
pub fn extract_entries(text: &str) -> Vec<(usize, String)> {
    let body = match text.find(END_MARKER) {
        Some(pos) => &text[..pos],
        None => text,
    };

    let markers: Vec<(usize, usize, usize)> = ENTRY_MARKER_REGEX
        .captures_iter(body)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let ordinal = cap.get(1)?.as_str().parse().ok()?;
            Some((ordinal, whole.start(), whole.end()))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, &(ordinal, _, end))| {
            let stop = markers.get(i + 1).map(|&(_, start, _)| start).unwrap_or(body.len());
            (ordinal, body[end..stop].trim().to_string())
        })
        .collect()
}

/// Decode a provider reply into exactly one line group per cue of `batch`
pub fn parse_response(response: &str, batch: &CueBatch) -> Result<Vec<Vec<String>>, ProviderError> {
    let expected = batch.len();
    let entries = extract_entries(response);
    let mismatch = |actual: usize| ProviderError::ResponseShapeMismatch { expected, actual };

    if !response.contains(END_MARKER) {
        debug!("Response for batch {} has no end marker", batch.ordinal + 1);
        return Err(mismatch(entries.len()));
    }
    if entries.len() != expected || entries.iter().enumerate().any(|(i, (ordinal, _))| *ordinal != i) {
        return Err(mismatch(entries.len()));
    }

    let mut groups = Vec::with_capacity(expected);
    for ((_, body), cue) in entries.into_iter().zip(&batch.cues) {
        let lines = split_text_lines(&body);
        if lines.is_empty() && !cue.lines.is_empty() {
            let present = groups.len();
            return Err(mismatch(present));
        }
        groups.push(lines);
    }

    Ok(groups)
}
