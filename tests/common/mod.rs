/*!
 * Common test utilities for the translatity test suite
 */

use std::path::{Path, PathBuf};
use std::fs;
use std::sync::Arc;
use anyhow::Result;
use tempfile::TempDir;

use translatity::app_config::{Config, RetryConfig};
use translatity::providers::mock::MockProvider;
use translatity::queue::QueueScheduler;

/// Route library logs to the test output; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// SRT text with `count` one-line cues, two seconds apart
pub fn sample_srt(count: usize) -> String {
    let mut content = String::new();
    for i in 1..=count {
        let start = (i as u64 - 1) * 2000;
        content.push_str(&format!(
            "{}\n{} --> {}\nLine number {}\n\n",
            i,
            format_ms(start),
            format_ms(start + 1500),
            i
        ));
    }
    content
}

fn format_ms(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms % 3_600_000) / 60_000,
        (ms % 60_000) / 1000,
        ms % 1000
    )
}

/// Creates a subtitle file with `count` cues
pub fn create_test_subtitle(dir: &Path, filename: &str, count: usize) -> Result<PathBuf> {
    create_test_file(dir, filename, &sample_srt(count))
}

/// Config suited to tests: fast retries, no jitter, given keys
pub fn test_config(keys: &[&str]) -> Config {
    Config {
        source_language: "en".to_string(),
        target_language: "fr".to_string(),
        credentials: keys.iter().map(|k| k.to_string()).collect(),
        retry: RetryConfig {
            transient_retry_ceiling: 3,
            transient_backoff_ms: 1,
            rate_limit_base_ms: 5,
            rate_limit_max_ms: 20,
            jitter_ratio: 0.0,
            quota_exhaustion_after: 3,
        },
        ..Config::default()
    }
}

/// Scheduler over a mock provider
pub fn scheduler(config: &Config, provider: &MockProvider) -> QueueScheduler {
    init_test_logging();
    QueueScheduler::new(config, Arc::new(provider.clone())).expect("test config should build a scheduler")
}

/// Output path the default config produces for `source`
pub fn output_path(source: &Path) -> PathBuf {
    let name = source.file_name().unwrap().to_string_lossy();
    source.with_file_name(format!("output_{}", name))
}
