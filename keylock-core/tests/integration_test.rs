//! Integration tests for keylock-core

use async_trait::async_trait;
use keylock_core::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn student_lock() -> LockIdentity {
    LockIdentity::new("STUDENT_LOCK", "123").unwrap()
}

fn memory_manager() -> LockManager {
    LockManager::new(Arc::new(MemoryLockStore::new()))
}

#[derive(Debug, PartialEq)]
enum EnrollError {
    Lock(String),
    CourseFull,
}

impl From<LockError> for EnrollError {
    fn from(err: LockError) -> Self {
        Self::Lock(err.to_string())
    }
}

// =============================================================================
// Acquire / release scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_caller_sees_unavailable_until_release() {
    let manager = memory_manager();
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(5));

    let guard_a = manager.lock(&request).await.unwrap();
    assert!(guard_a.is_held());

    let err = manager.lock(&request).await.unwrap_err();
    assert!(err.is_unavailable());

    guard_a.release().await.unwrap();

    let guard_b = manager.lock(&request).await.unwrap();
    assert!(guard_b.is_held());
    guard_b.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_waiter_succeeds_after_holder_lease_expires() {
    let manager = memory_manager();
    let holder = AcquisitionRequest::new(student_lock(), Duration::from_secs(1));
    let token_a = manager.acquire(&holder).await.unwrap().unwrap();

    let waiter = AcquisitionRequest::builder(student_lock())
        .wait_time(Duration::from_secs(2))
        .lease_time(Duration::from_secs(1))
        .poll_interval(Duration::from_millis(50))
        .build()
        .unwrap();

    let start = tokio::time::Instant::now();
    let token_b = manager.acquire(&waiter).await.unwrap().unwrap();
    let waited = start.elapsed();

    assert_ne!(token_a, token_b);
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_unreleased_lock_expires_for_other_callers() {
    let manager = memory_manager();
    manager
        .try_acquire(&student_lock(), Duration::from_millis(750))
        .await
        .unwrap()
        .unwrap();

    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(manager.is_locked(&student_lock()).await.unwrap());

    tokio::time::advance(Duration::from_millis(250)).await;
    assert!(!manager.is_locked(&student_lock()).await.unwrap());
    assert!(
        manager
            .try_acquire(&student_lock(), Duration::from_secs(1))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_separate_managers_share_the_store() {
    let store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
    let node_a = LockManager::with_config(store.clone(), LockConfig::builder().owner("a").build());
    let node_b = LockManager::with_config(store, LockConfig::builder().owner("b").build());

    let token = node_a
        .try_acquire(&student_lock(), Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();

    assert!(
        node_b
            .try_acquire(&student_lock(), Duration::from_secs(5))
            .await
            .unwrap()
            .is_none()
    );
    // b's own token for another identity cannot release a's lock
    let other = LockIdentity::new("STUDENT_LOCK", "456").unwrap();
    let b_token = node_b
        .try_acquire(&other, Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    assert!(!node_b.release(&student_lock(), &b_token).await.unwrap());
    assert_eq!(
        node_b.holder(&student_lock()).await.unwrap().as_deref(),
        Some("a")
    );

    assert!(node_a.release(&student_lock(), &token).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_observer_cannot_release_from_holder_value() {
    let store: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
    let owner = LockManager::with_config(store.clone(), LockConfig::builder().owner("a").build());
    let observer = LockManager::with_config(store, LockConfig::builder().owner("b").build());
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(5));

    let guard = owner.lock(&request).await.unwrap();

    // What an observer can read identifies the owner, not the token
    let seen = observer.holder(&student_lock()).await.unwrap().unwrap();
    assert_eq!(seen, "a");
    assert!(!guard.token().is_some_and(|t| t.as_str() == seen));

    // Its own minted tokens do not match either
    for _ in 0..3 {
        assert!(observer.try_acquire(&student_lock(), Duration::from_secs(5)).await.unwrap().is_none());
    }
    assert!(observer.is_locked(&student_lock()).await.unwrap());

    // The real holder still releases normally
    guard.release().await.unwrap();
    assert!(!observer.is_locked(&student_lock()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_release_after_expiry_reports_mismatch() {
    let manager = memory_manager();
    let request = AcquisitionRequest::new(student_lock(), Duration::from_millis(100));
    let guard = manager.lock(&request).await.unwrap();

    tokio::time::advance(Duration::from_millis(200)).await;
    manager
        .try_acquire(&student_lock(), Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();

    let err = guard.release().await.unwrap_err();
    assert!(matches!(err, LockError::ReleaseMismatch { .. }));
    assert!(manager.is_locked(&student_lock()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_guard_extend() {
    let manager = memory_manager();
    let request = AcquisitionRequest::new(student_lock(), Duration::from_millis(500));
    let mut guard = manager.lock(&request).await.unwrap();

    tokio::time::advance(Duration::from_millis(400)).await;
    assert!(guard.extend(Duration::from_secs(2)).await.unwrap());
    assert_eq!(guard.lease_time(), Duration::from_secs(2));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(manager.is_locked(&student_lock()).await.unwrap());
    guard.release().await.unwrap();
}

// =============================================================================
// Guard exit paths
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_section_error_passes_through_and_lock_is_released() {
    let manager = memory_manager();
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(5));

    let result: Result<(), EnrollError> = manager
        .with_lock(&request, || async { Err(EnrollError::CourseFull) })
        .await;

    assert_eq!(result, Err(EnrollError::CourseFull));
    assert!(!manager.is_locked(&student_lock()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_converts_into_caller_error() {
    let manager = memory_manager();
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(5));
    let _token = manager.acquire(&request).await.unwrap().unwrap();

    let result: Result<(), EnrollError> = manager.with_lock(&request, || async { Ok(()) }).await;
    assert!(matches!(result, Err(EnrollError::Lock(msg)) if msg.contains("STUDENT_LOCK:123")));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_guard_releases_in_background() {
    let manager = memory_manager();
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(60));

    let guard = manager.lock(&request).await.unwrap();
    drop(guard);
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(!manager.is_locked(&student_lock()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_section_still_releases() {
    let manager = memory_manager();
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(60));

    let task_manager = manager.clone();
    let task_request = request.clone();
    let handle = tokio::spawn(async move {
        task_manager
            .with_lock(&task_request, || async {
                if task_request.lease_time > Duration::ZERO {
                    panic!("section blew up");
                }
                Ok::<(), LockError>(())
            })
            .await
    });

    assert!(handle.await.unwrap_err().is_panic());
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(!manager.is_locked(&student_lock()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_leaves_no_residue() {
    let manager = memory_manager();
    let holder = manager
        .try_acquire(&student_lock(), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let waiter = manager
        .request(student_lock())
        .with_wait_time(Duration::from_secs(30));
    let abandoned = tokio::time::timeout(Duration::from_millis(100), manager.acquire(&waiter)).await;
    assert!(abandoned.is_err());

    assert!(manager.release(&student_lock(), &holder).await.unwrap());
    assert!(!manager.is_locked(&student_lock()).await.unwrap());
}

// =============================================================================
// Store failures
// =============================================================================

/// Store whose writes or deletes can be made to fail.
struct FlakyStore {
    inner: MemoryLockStore,
    fail_set: bool,
    fail_delete: bool,
}

#[async_trait]
impl LockStore for FlakyStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        if self.fail_set {
            return Err(LockError::store("connection reset"));
        }
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> LockResult<bool> {
        if self.fail_delete {
            return Err(LockError::store("connection reset"));
        }
        self.inner.delete_if_equals(key, expected).await
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        self.inner.get(key).await
    }

    fn store_type(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test]
async fn test_store_error_during_acquire_propagates() {
    let manager = LockManager::new(Arc::new(FlakyStore {
        inner: MemoryLockStore::new(),
        fail_set: true,
        fail_delete: false,
    }));
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(5));

    let ran = AtomicUsize::new(0);
    let result = manager
        .with_lock(&request, || async {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok::<_, LockError>(())
        })
        .await;

    assert!(matches!(result, Err(LockError::Store(_))));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_error_during_release_is_swallowed() {
    let manager = LockManager::new(Arc::new(FlakyStore {
        inner: MemoryLockStore::new(),
        fail_set: false,
        fail_delete: true,
    }));
    let request = AcquisitionRequest::new(student_lock(), Duration::from_secs(5));

    let value = manager
        .with_lock(&request, || async { Ok::<_, LockError>("enrolled") })
        .await
        .unwrap();
    assert_eq!(value, "enrolled");
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_only_one_concurrent_attempt_wins() {
    let manager = memory_manager();
    let mut handles = Vec::new();

    for _ in 0..32 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .try_acquire(&student_lock(), Duration::from_secs(30))
                .await
                .unwrap()
                .is_some()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_critical_sections_never_overlap() {
    let manager = memory_manager();
    let inside = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let request = AcquisitionRequest::builder(student_lock())
        .wait_time(Duration::from_secs(10))
        .lease_time(Duration::from_secs(10))
        .poll_interval(Duration::from_millis(1))
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let manager = manager.clone();
        let request = request.clone();
        let inside = inside.clone();
        let completed = completed.clone();
        handles.push(tokio::spawn(async move {
            manager
                .with_lock(&request, || async {
                    let concurrent = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    assert_eq!(concurrent, 1, "critical sections overlapped");
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, LockError>(())
                })
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), 16);
}

// =============================================================================
// Declarative policies
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_interceptor_locks_per_field() {
    let policies = LockPolicies::new().with(
        "enroll",
        LockPolicy::new("STUDENT_LOCK", "placeholder").lease_time(5),
    );
    let interceptor = LockInterceptor::new(memory_manager(), policies);
    let manager = interceptor.manager().clone();

    let outcome = interceptor
        .run_for("enroll", "42", || async {
            let held = manager
                .is_locked(&LockIdentity::new("STUDENT_LOCK", "42").unwrap())
                .await?;
            Ok::<_, LockError>(held)
        })
        .await
        .unwrap();

    assert!(outcome);
    assert!(
        !manager
            .is_locked(&LockIdentity::new("STUDENT_LOCK", "42").unwrap())
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_interceptor_rejects_unknown_operation() {
    let interceptor = LockInterceptor::new(memory_manager(), LockPolicies::new());
    let err = interceptor
        .run("missing", || async { Ok::<_, LockError>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, LockError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_interceptor_rejects_invalid_policy_before_store_io() {
    let manager = LockManager::new(Arc::new(FlakyStore {
        inner: MemoryLockStore::new(),
        fail_set: true,
        fail_delete: true,
    }));
    let interceptor = LockInterceptor::new(manager, LockPolicies::new());

    let err = interceptor
        .run_policy(&LockPolicy::new("STUDENT_LOCK", "123").lease_time(0), || async {
            Ok::<_, LockError>(())
        })
        .await
        .unwrap_err();
    // A store call would have produced a Store error instead
    assert!(matches!(err, LockError::InvalidArgument(_)));
}
