/*!
 * Tests for application configuration
 */

use anyhow::Result;
use translatity::app_config::{BudgetUnit, Config, LogLevel};
use crate::common;

/// Test that a missing config file is created with defaults
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let (config, created) = Config::load_or_create(&path)?;
    assert!(created);
    assert!(path.exists());
    assert_eq!(config.queue.concurrency_limit, 2);
    assert_eq!(config.retry.transient_retry_ceiling, 3);
    assert_eq!(config.output.prefix, "output_");

    let (reloaded, created) = Config::load_or_create(&path)?;
    assert!(!created);
    assert_eq!(reloaded.provider.model, config.provider.model);
    Ok(())
}

/// Test that a partial file is completed with defaults
#[test]
fn test_load_or_create_withPartialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{
            "source_language": "ja",
            "target_language": "Brazilian Portuguese",
            "credentials": ["key-1", "key-2"],
            "chunking": { "budget_unit": "tokens" },
            "log_level": "debug"
        }"#,
    )?;

    let (config, created) = Config::load_or_create(&path)?;
    assert!(!created);
    assert_eq!(config.credentials.len(), 2);
    assert_eq!(config.chunking.budget_unit, BudgetUnit::Tokens);
    assert_eq!(config.chunking.max_units_per_batch, 40);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate().is_ok());
    Ok(())
}

/// Test validation failures
#[test]
fn test_validate_withBadValues_shouldFail() {
    let valid = common::test_config(&["key"]);
    assert!(valid.validate().is_ok());

    let no_keys = Config { credentials: vec!["  ".into()], ..valid.clone() };
    assert!(no_keys.validate().is_err());

    let mut zero_concurrency = valid.clone();
    zero_concurrency.queue.concurrency_limit = 0;
    assert!(zero_concurrency.validate().is_err());

    let bad_language = Config { target_language: "xx".into(), ..valid.clone() };
    assert!(bad_language.validate().is_err());

    let mut bad_jitter = valid;
    bad_jitter.retry.jitter_ratio = 1.5;
    assert!(bad_jitter.validate().is_err());
}

/// Test that an unparsable file is reported
#[test]
fn test_load_or_create_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "conf.json", "{ not json")?;
    assert!(Config::load_or_create(&path).is_err());
    Ok(())
}
