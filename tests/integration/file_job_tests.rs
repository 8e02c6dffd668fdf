/*!
 * Integration tests for single file jobs
 */

use std::path::Path;
use std::sync::Arc;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use translatity::app_config::Config;
use translatity::errors::{ProviderError, QueueError};
use translatity::job::{FileJob, JobProgress, JobRequest, JobStatus};
use translatity::providers::mock::{MockProvider, MockReply};
use translatity::subtitle_codec::SubtitleCodec;
use translatity::translation::TranslationEngine;
use crate::common;

fn engine(config: &Config, provider: &MockProvider) -> TranslationEngine {
    common::init_test_logging();
    TranslationEngine::from_config(config, Arc::new(provider.clone())).unwrap()
}

fn job(path: &Path, cancel: CancellationToken) -> FileJob {
    FileJob::new(
        1,
        JobRequest {
            source_path: path.to_path_buf(),
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            context_hint: "A documentary".to_string(),
        },
        cancel,
    )
}

fn ignore(_: &JobProgress) {}

/// Test a full translation of a file split into several batches
#[tokio::test]
async fn test_run_withWorkingProvider_shouldWriteTranslatedFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 10)?;
    let mut config = common::test_config(&["key-1"]);
    config.chunking.max_units_per_batch = 4;
    let provider = MockProvider::working();
    let engine = engine(&config, &provider);

    let mut job = job(&source, CancellationToken::new());
    assert!(job.prepare(&engine));
    assert_eq!(job.batches().len(), 3);

    job.run(&engine, &ignore).await.unwrap();

    let report = job.report();
    assert_eq!(report.status, JobStatus::Succeeded);
    assert_eq!(report.completed_cues, 10);
    assert_eq!(report.completed_batches, 3);
    assert_eq!(report.attempts, 3);
    assert!(!report.is_degraded());
    assert_eq!(report.output_path.as_deref(), Some(common::output_path(&source).as_path()));

    let (cues, _) = SubtitleCodec::read_file(common::output_path(&source))?;
    assert_eq!(cues.len(), 10);
    assert_eq!(cues[9].index, 10);
    assert_eq!(cues[9].start_ms, 18_000);
    assert_eq!(cues[9].end_ms, 19_500);
    assert_eq!(cues[9].lines, vec!["[TRANSLATED] Line number 10".to_string()]);
    Ok(())
}

/// Test that every batch after the first carries the previous translations
#[tokio::test]
async fn test_run_withSeveralBatches_shouldSendContextDigest() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 4)?;
    let mut config = common::test_config(&["key-1"]);
    config.chunking.max_units_per_batch = 2;
    let provider = MockProvider::working();
    let engine = engine(&config, &provider);

    let mut job = job(&source, CancellationToken::new());
    job.run(&engine, &ignore).await.unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[0].prompt.contains("Previously translated"));
    assert!(calls[0].prompt.contains("A documentary"));
    assert!(calls[1].prompt.contains("Previously translated"));
    assert!(calls[1].prompt.contains("[TRANSLATED] Line number 2"));
    assert_eq!(calls[1].entries(), vec!["Line number 3".to_string(), "Line number 4".to_string()]);
    Ok(())
}

/// Test that a batch keeps its source text once transient retries run out
#[tokio::test]
async fn test_run_withPersistentTransientFailure_shouldFallBackAfterCeiling() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 3)?;
    let config = common::test_config(&["key-1"]);
    let provider = MockProvider::failing(ProviderError::Transient("connection reset".into()));
    let engine = engine(&config, &provider);

    let mut job = job(&source, CancellationToken::new());
    job.run(&engine, &ignore).await.unwrap();

    // One call plus three retries
    assert_eq!(provider.call_count(), 4);
    let report = job.report();
    assert_eq!(report.status, JobStatus::Succeeded);
    assert!(report.is_degraded());
    assert_eq!(report.fallbacks.len(), 1);
    assert_eq!(report.fallbacks[0].first_cue, 1);
    assert_eq!(report.fallbacks[0].cue_count, 3);

    let (cues, _) = SubtitleCodec::read_file(common::output_path(&source))?;
    assert_eq!(cues[0].lines, vec!["Line number 1".to_string()]);
    Ok(())
}

/// Test that a malformed reply degrades only its own batch
#[tokio::test]
async fn test_run_withShapeMismatch_shouldMarkFallbackCues() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 4)?;
    let mut config = common::test_config(&["key-1"]);
    config.chunking.max_units_per_batch = 2;
    config.prompt.fallback_marker = Some("[UNTRANSLATED] ".to_string());
    let provider = MockProvider::working().with_script([MockReply::Text("<<ENTRY_0>>\nseul\n<<END>>".into())]);
    let engine = engine(&config, &provider);

    let mut job = job(&source, CancellationToken::new());
    job.run(&engine, &ignore).await.unwrap();

    assert_eq!(provider.call_count(), 2);
    let report = job.report();
    assert_eq!(report.status, JobStatus::Succeeded);
    assert_eq!(report.fallbacks.len(), 1);
    assert!(report.fallbacks[0].reason.contains("expected 2 entries, got 1"));

    let (cues, _) = SubtitleCodec::read_file(common::output_path(&source))?;
    assert_eq!(cues[0].lines, vec!["[UNTRANSLATED] Line number 1".to_string()]);
    assert_eq!(cues[2].lines, vec!["[TRANSLATED] Line number 3".to_string()]);
    Ok(())
}

/// Test that unusable input fails the job before any call
#[tokio::test]
async fn test_run_withBadInput_shouldFailWithoutOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let malformed = common::create_test_file(temp_dir.path(), "broken.srt", "1\nnot a timing line\nHello\n")?;
    let empty = common::create_test_file(temp_dir.path(), "empty.srt", "\n\n")?;
    let missing = temp_dir.path().join("missing.srt");
    let config = common::test_config(&["key-1"]);
    let provider = MockProvider::working();
    let engine = engine(&config, &provider);

    for path in [&malformed, &empty, &missing] {
        let mut job = job(path, CancellationToken::new());
        job.run(&engine, &ignore).await.unwrap();
        assert!(matches!(job.status(), JobStatus::Failed(_)), "{} should fail", path.display());
        assert!(!common::output_path(path).exists());
    }

    let mut empty_job = job(&empty, CancellationToken::new());
    assert!(!empty_job.prepare(&engine));
    assert_eq!(empty_job.status().reason(), Some("no subtitle cues found"));
    assert_eq!(provider.call_count(), 0);
    Ok(())
}

/// Test that a cancelled job never calls the provider
#[tokio::test]
async fn test_run_withCancelledFlag_shouldStopBeforeFirstBatch() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 3)?;
    let config = common::test_config(&["key-1"]);
    let provider = MockProvider::working();
    let engine = engine(&config, &provider);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut job = job(&source, cancel);
    job.run(&engine, &ignore).await.unwrap();

    assert_eq!(*job.status(), JobStatus::Cancelled("cancelled by user".to_string()));
    assert_eq!(provider.call_count(), 0);
    assert!(!common::output_path(&source).exists());
    Ok(())
}

/// Test that rejected credentials halt the job
#[tokio::test]
async fn test_run_withRejectedCredentials_shouldHalt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 3)?;
    let config = common::test_config(&["key-1", "key-2"]);
    let provider = MockProvider::failing(ProviderError::Authentication("API_KEY_INVALID".into()));
    let engine = engine(&config, &provider);

    let mut job = job(&source, CancellationToken::new());
    let result = job.run(&engine, &ignore).await;

    assert_eq!(result, Err(QueueError::NoUsableCredentials));
    assert_eq!(provider.call_count(), 2);
    assert!(job.status().reason().is_some_and(|r| r.starts_with("halted")));
    assert!(engine.credentials_exhausted());
    assert!(!common::output_path(&source).exists());
    Ok(())
}

/// Test that progress callbacks follow the batches
#[tokio::test]
async fn test_run_withNotify_shouldReportEveryBatch() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 6)?;
    let mut config = common::test_config(&["key-1"]);
    config.chunking.max_units_per_batch = 2;
    let engine = engine(&config, &MockProvider::working());

    let seen = parking_lot::Mutex::new(Vec::new());
    let notify = |progress: &JobProgress| seen.lock().push((progress.status.clone(), progress.completed_cues));
    let mut job = job(&source, CancellationToken::new());
    job.run(&engine, &notify).await.unwrap();

    let seen = seen.into_inner();
    assert_eq!(seen.first(), Some(&(JobStatus::Running, 0)));
    let cues: Vec<usize> = seen.iter().map(|(_, c)| *c).collect();
    assert_eq!(cues, vec![0, 2, 4, 6, 6]);
    assert_eq!(seen.last().map(|(s, _)| s.clone()), Some(JobStatus::Succeeded));
    Ok(())
}

/// Test that cancelling the run token stops a job holding a child token
#[tokio::test]
async fn test_run_withCancelledParentToken_shouldStopChildJob() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 3)?;
    let config = common::test_config(&["key-1"]);
    let provider = MockProvider::working();
    let engine = engine(&config, &provider);

    let run_token = CancellationToken::new();
    let mut job = job(&source, run_token.child_token());
    run_token.cancel();
    job.run(&engine, &ignore).await.unwrap();

    assert_eq!(*job.status(), JobStatus::Cancelled("cancelled by user".to_string()));
    assert_eq!(provider.call_count(), 0);
    assert!(!common::output_path(&source).exists());
    Ok(())
}

/// Test that cancelling one child token leaves its siblings running
#[tokio::test]
async fn test_run_withCancelledSiblingToken_shouldStillTranslate() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = common::create_test_subtitle(temp_dir.path(), "episode.srt", 3)?;
    let config = common::test_config(&["key-1"]);
    let provider = MockProvider::working();
    let engine = engine(&config, &provider);

    let run_token = CancellationToken::new();
    let sibling = run_token.child_token();
    let mut job = job(&source, run_token.child_token());
    sibling.cancel();
    job.run(&engine, &ignore).await.unwrap();

    assert!(!run_token.is_cancelled());
    assert_eq!(*job.status(), JobStatus::Succeeded);
    assert!(common::output_path(&source).exists());
    Ok(())
}
