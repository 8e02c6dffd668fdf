/*!
 * Tests for the credential pool
 */

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use translatity::credentials::{CredentialPool, CredentialState, ReleaseOutcome, mask_secret};
use translatity::errors::PoolError;

/// Test that successive acquisitions rotate over every credential
#[test]
fn test_acquire_withSeveralCredentials_shouldCycle() {
    let pool = CredentialPool::new(["key-one-1111", "key-two-2222"]);
    let mut seen = Vec::new();
    for _ in 0..4 {
        let lease = pool.acquire().unwrap();
        seen.push(lease.id());
        pool.release(lease, ReleaseOutcome::Success);
    }
    assert_eq!(seen, vec![0, 1, 0, 1]);
}

/// Test that a rate limited credential is skipped until its suspension lapses
#[test]
fn test_release_withRateLimit_shouldSuspendUntilDeadline() {
    let pool = CredentialPool::new(["aaaa", "bbbb"]);
    let now = Instant::now();

    let a = pool.acquire_at(None, now).unwrap();
    pool.release_at(a, ReleaseOutcome::RateLimited { suspend_for: Duration::from_secs(30) }, now);
    assert!(matches!(pool.state_of(0), Some(CredentialState::Suspended { .. })));

    let status = pool.status_at(now);
    assert_eq!(status.available, 1);
    assert_eq!(status.suspended, 1);
    assert_eq!(status.next_unsuspend_in, Some(Duration::from_secs(30)));

    // Preferring the suspended credential falls back to the other one
    let b = pool.acquire_at(Some(0), now + Duration::from_secs(10)).unwrap();
    assert_eq!(b.id(), 1);
    pool.release_at(b, ReleaseOutcome::Success, now);

    let later = pool.acquire_at(Some(0), now + Duration::from_secs(30)).unwrap();
    assert_eq!(later.id(), 0);
}

/// Test that the pool reports exhaustion once every key was rejected
#[test]
fn test_release_withAuthFailures_shouldExhaustPool() {
    let pool = CredentialPool::new(["aaaa", "bbbb"]);
    for _ in 0..2 {
        let lease = pool.acquire().unwrap();
        pool.release(lease, ReleaseOutcome::AuthFailed);
    }
    assert_eq!(pool.acquire().unwrap_err(), PoolError::Exhausted);
    assert_eq!(pool.status().exhausted, 2);
}

/// Test that waiting on a free pool returns at once
#[test]
fn test_acquire_wait_withFreeCredential_shouldNotBlock() {
    let pool = CredentialPool::new(["aaaa", "bbbb"]);
    let result = tokio_test::block_on(async { pool.acquire_wait(Some(1), &CancellationToken::new()).await });
    assert_eq!(result.map(|lease| lease.id()), Ok(1));
}

/// Test that a waiter gets the credential freed by another task
#[tokio::test]
async fn test_acquire_wait_withBusyPool_shouldWakeOnRelease() {
    let pool = Arc::new(CredentialPool::new(["aaaa"]));
    let held = pool.acquire().unwrap();
    let cancel = CancellationToken::new();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_wait(None, &cancel).await.map(|lease| lease.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    pool.release(held, ReleaseOutcome::Transient);
    let id = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
    assert_eq!(id, Ok(0));
}

/// Test that a waiter wakes when the only credential's suspension ends
#[tokio::test]
async fn test_acquire_wait_withSuspendedPool_shouldWakeAfterSuspension() {
    let pool = CredentialPool::new(["aaaa"]);
    let lease = pool.acquire().unwrap();
    pool.release(lease, ReleaseOutcome::RateLimited { suspend_for: Duration::from_millis(30) });

    let started = Instant::now();
    let lease = tokio::time::timeout(Duration::from_secs(2), pool.acquire_wait(None, &CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lease.id(), 0);
    assert!(started.elapsed() >= Duration::from_millis(25));
}

/// Test that a waiter gives up when the last credential is exhausted
#[tokio::test]
async fn test_acquire_wait_withExhaustion_shouldReturnExhausted() {
    let pool = Arc::new(CredentialPool::new(["aaaa"]));
    let held = pool.acquire().unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_wait(None, &CancellationToken::new()).await.map(|lease| lease.id()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.release(held, ReleaseOutcome::QuotaExhausted);

    let result = tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
    assert_eq!(result, Err(PoolError::Exhausted));
}

/// Test secret masking
#[test]
fn test_mask_secret_withLongKey_shouldKeepEnds() {
    assert_eq!(mask_secret("abcd1234efgh"), "abcd****efgh");
    assert_eq!(mask_secret("12345678"), "********");
    let lease = CredentialPool::new(["abcd1234efgh"]).acquire().unwrap();
    assert!(!format!("{:?}", lease).contains("1234"));
}
