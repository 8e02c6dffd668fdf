/*!
 * Tests for prompt building and the translation call
 */

use std::sync::Arc;
use std::time::Duration;
use translatity::credentials::CredentialPool;
use translatity::errors::ProviderError;
use translatity::providers::mock::{MockProvider, MockReply};
use translatity::subtitle_codec::Cue;
use translatity::translation::chunker::CueBatch;
use translatity::translation::client::{AttemptOutcome, TranslationClient};

const SYSTEM_PROMPT: &str = "Translate from {source_language} to {target_language}.";

fn batch() -> CueBatch {
    CueBatch {
        ordinal: 2,
        cues: vec![
            Cue::from_text(7, 0, 1000, "Where is he?"),
            Cue::from_text(8, 1000, 2000, "Upstairs.\nHurry!"),
        ],
        source_language: "en".to_string(),
        target_language: "pt".to_string(),
        context_digest: "Previously said line".to_string(),
    }
}

fn client(provider: &MockProvider, timeout: Duration) -> TranslationClient {
    TranslationClient::new(Arc::new(provider.clone()), SYSTEM_PROMPT, timeout)
}

/// Test that the prompt names languages and carries the hint, digest and entries
#[test]
fn test_build_prompt_withContext_shouldIncludeAllParts() {
    let prompt = client(&MockProvider::working(), Duration::from_secs(5)).build_prompt(&batch(), "A crime drama");

    assert!(prompt.starts_with("Translate from English to Portuguese."));
    assert!(prompt.contains("A crime drama"));
    assert!(prompt.contains("Previously said line"));
    assert!(prompt.contains("<<ENTRY_0>>\nWhere is he?\n<<ENTRY_1>>\nUpstairs.\nHurry!\n<<END>>"));
}

/// Test that a free-form language name is used as is
#[test]
fn test_build_prompt_withLanguageName_shouldPassThrough() {
    let mut batch = batch();
    batch.target_language = "Brazilian Portuguese".to_string();
    batch.context_digest.clear();
    let prompt = client(&MockProvider::working(), Duration::from_secs(5)).build_prompt(&batch, "");

    assert!(prompt.contains("to Brazilian Portuguese."));
    assert!(!prompt.contains("continuity"));
}

/// Test a successful call
#[tokio::test]
async fn test_translate_withWorkingProvider_shouldReturnLineGroups() {
    let pool = CredentialPool::new(["key-a"]);
    let lease = pool.acquire().unwrap();
    let provider = MockProvider::working();

    let attempt = client(&provider, Duration::from_secs(5)).translate(&batch(), "", &lease).await;

    assert_eq!(attempt.batch_ordinal, 2);
    assert_eq!(attempt.credential_id, 0);
    assert_eq!(
        attempt.outcome,
        AttemptOutcome::Success(vec![
            vec!["[TRANSLATED] Where is he?".to_string()],
            vec!["[TRANSLATED] Upstairs.".to_string(), "[TRANSLATED] Hurry!".to_string()],
        ])
    );
}

/// Test that a reply with a missing entry is a shape mismatch
#[tokio::test]
async fn test_translate_withMissingEntry_shouldReportShapeMismatch() {
    let pool = CredentialPool::new(["key-a"]);
    let lease = pool.acquire().unwrap();
    let provider = MockProvider::working().with_script([MockReply::Text("<<ENTRY_0>>\nOnde ele está?\n<<END>>".into())]);

    let attempt = client(&provider, Duration::from_secs(5)).translate(&batch(), "", &lease).await;

    assert_eq!(
        attempt.outcome,
        AttemptOutcome::Failed(ProviderError::ResponseShapeMismatch { expected: 2, actual: 1 })
    );
}

/// Test that a slow call times out as a transient failure
#[tokio::test]
async fn test_translate_withSlowProvider_shouldTimeOut() {
    let pool = CredentialPool::new(["key-a"]);
    let lease = pool.acquire().unwrap();
    let provider = MockProvider::working().with_delay(Duration::from_millis(200));

    let attempt = client(&provider, Duration::from_millis(20)).translate(&batch(), "", &lease).await;

    assert!(matches!(attempt.outcome, AttemptOutcome::Failed(ProviderError::Transient(_))));
}
