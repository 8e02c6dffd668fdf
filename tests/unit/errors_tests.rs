/*!
 * Tests for error types
 */

use std::time::Duration;
use translatity::errors::{FailureKind, ProviderError, QueueError, SubtitleError};

/// Test HTTP status classification
#[test]
fn test_from_status_withKnownCodes_shouldClassify() {
    assert_eq!(ProviderError::from_status(429, "slow").kind(), FailureKind::RateLimited);
    assert_eq!(ProviderError::from_status(401, "who").kind(), FailureKind::Auth);
    assert_eq!(ProviderError::from_status(403, "no").kind(), FailureKind::Auth);
    assert_eq!(ProviderError::from_status(500, "oops").kind(), FailureKind::Transient);
    assert_eq!(ProviderError::from_status(408, "late").kind(), FailureKind::Transient);
    assert_eq!(ProviderError::from_status(400, "bad").kind(), FailureKind::Permanent);
}

/// Test error messages
#[test]
fn test_display_withVariants_shouldDescribeError() {
    let mismatch = ProviderError::ResponseShapeMismatch { expected: 3, actual: 2 };
    assert_eq!(mismatch.to_string(), "Response shape mismatch: expected 3 entries, got 2");

    let limited = ProviderError::RateLimited { message: "quota".into(), retry_after: Some(Duration::from_secs(1)) };
    assert_eq!(limited.to_string(), "Rate limit exceeded: quota");

    let malformed = SubtitleError::Malformed { line: 12, reason: "bad".into() };
    assert_eq!(malformed.to_string(), "Malformed subtitle at line 12: bad");
}

/// Test queue error messages
#[test]
fn test_queue_error_withVariants_shouldDescribeError() {
    assert!(QueueError::NoUsableCredentials.to_string().contains("No usable API credentials"));
    assert_eq!(QueueError::InvalidJob(7).to_string(), "Job 7 cannot be modified in its current state");
}
