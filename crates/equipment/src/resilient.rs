//! Repository decorator applying a circuit breaker and retry policy.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use common::EquipmentId;
use resilience::{CircuitBreaker, RetryPolicy};

use crate::error::{RepositoryError, Result};
use crate::record::{Equipment, NewEquipment};
use crate::repository::EquipmentRepository;

/// Wraps a repository so every call goes through a breaker and is retried on
/// transient failure.
///
/// Each attempt is a separate breaker call, so a run of retries can itself
/// trip the breaker. Once open, the rejection is returned without further
/// retries. Only transient failures count against the breaker; a missing
/// record or a conflict is an answer from a healthy store.
///
/// Reads and overwrites are retried on any transient failure. Inserts are
/// retried only when the store was unreachable, since a timed-out insert may
/// already be stored.
#[derive(Debug, Clone)]
pub struct ResilientRepository<R> {
    inner: R,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl<R: EquipmentRepository> ResilientRepository<R> {
    pub fn new(inner: R, breaker: CircuitBreaker, retry: RetryPolicy) -> Self {
        Self {
            inner,
            breaker,
            retry,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `call` through the breaker, retrying failures `retry_on` accepts.
    async fn guarded<T, F, Fut>(
        &self,
        operation: &'static str,
        retry_on: fn(&RepositoryError) -> bool,
        call: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let breaker = &self.breaker;
        let call = &call;
        let result = self
            .retry
            .run(
                move || async move {
                    breaker
                        .call(|| async move {
                            match call().await {
                                Ok(value) => Ok(Ok(value)),
                                Err(error) if error.is_transient() => Err(error),
                                Err(error) => Ok(Err(error)),
                            }
                        })
                        .await
                        .map_err(RepositoryError::from)
                        .and_then(|outcome| outcome)
                },
                retry_on,
            )
            .await;

        if let Err(error) = &result {
            tracing::debug!(operation, error = %error, "repository call failed");
        }
        result
    }
}

#[async_trait]
impl<R: EquipmentRepository> EquipmentRepository for ResilientRepository<R> {
    /// Retried only when the store was never reached. A timed-out insert may
    /// have been stored, and repeating it would store the record twice.
    async fn insert(&self, record: NewEquipment) -> Result<EquipmentId> {
        let inner = &self.inner;
        let record = &record;
        self.guarded("insert", RepositoryError::is_unavailable, move || {
            inner.insert(record.clone())
        })
        .await
    }

    /// A retry that finds the record gone means an earlier attempt deleted it.
    async fn delete(&self, id: EquipmentId) -> Result<()> {
        let inner = &self.inner;
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        self.guarded("delete", RepositoryError::is_transient, move || {
            let retried = attempts.fetch_add(1, Ordering::SeqCst) > 0;
            async move {
                match inner.delete(id).await {
                    Err(RepositoryError::NotFound(_)) if retried => {
                        tracing::debug!(equipment_id = %id, "delete already applied");
                        Ok(())
                    }
                    outcome => outcome,
                }
            }
        })
        .await
    }

    async fn get_by_id(&self, id: EquipmentId) -> Result<Option<Equipment>> {
        let inner = &self.inner;
        self.guarded("get_by_id", RepositoryError::is_transient, move || {
            inner.get_by_id(id)
        })
        .await
    }

    async fn update(&self, record: Equipment) -> Result<()> {
        let inner = &self.inner;
        let record = &record;
        self.guarded("update", RepositoryError::is_transient, move || {
            inner.update(record.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEquipmentRepository;
    use resilience::{BreakerState, CircuitBreakerConfig};
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Applies each write, then stalls once for longer than the call timeout.
    #[derive(Clone)]
    struct StallOnceRepository {
        inner: InMemoryEquipmentRepository,
        stall: Duration,
        stalled: Arc<AtomicBool>,
    }

    impl StallOnceRepository {
        fn new(inner: InMemoryEquipmentRepository) -> Self {
            Self {
                inner,
                stall: Duration::from_millis(100),
                stalled: Arc::new(AtomicBool::new(false)),
            }
        }

        async fn stall_once(&self) {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(self.stall).await;
            }
        }
    }

    #[async_trait]
    impl EquipmentRepository for StallOnceRepository {
        async fn insert(&self, record: NewEquipment) -> Result<EquipmentId> {
            let id = self.inner.insert(record).await?;
            self.stall_once().await;
            Ok(id)
        }

        async fn delete(&self, id: EquipmentId) -> Result<()> {
            self.inner.delete(id).await?;
            self.stall_once().await;
            Ok(())
        }

        async fn get_by_id(&self, id: EquipmentId) -> Result<Option<Equipment>> {
            self.inner.get_by_id(id).await
        }

        async fn update(&self, record: Equipment) -> Result<()> {
            self.inner.update(record).await
        }
    }

    fn resilient(
        inner: InMemoryEquipmentRepository,
        failure_threshold: u32,
        max_retries: u32,
    ) -> ResilientRepository<InMemoryEquipmentRepository> {
        resilient_with_timeout(inner, failure_threshold, max_retries, Duration::from_secs(1))
    }

    fn resilient_with_timeout<R: EquipmentRepository>(
        inner: R,
        failure_threshold: u32,
        max_retries: u32,
        call_timeout: Duration,
    ) -> ResilientRepository<R> {
        let breaker = CircuitBreaker::new(
            "equipment_repository",
            CircuitBreakerConfig {
                failure_threshold,
                call_timeout,
                recovery_window: Duration::from_secs(5),
                half_open_successes: 1,
            },
        );
        let retry = RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        };
        ResilientRepository::new(inner, breaker, retry)
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = InMemoryEquipmentRepository::new();
        inner.fail_next_calls(2);
        let repo = resilient(inner.clone(), 5, 3);

        let id = repo.insert(NewEquipment::new("Pump", "P-1")).await.unwrap();

        assert_eq!(inner.record(id).unwrap().name, "Pump");
        assert_eq!(repo.breaker().state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let inner = InMemoryEquipmentRepository::new();
        let repo = resilient(inner, 5, 3);

        let result = repo.delete(EquipmentId::new(42)).await;

        assert_eq!(result, Err(RepositoryError::NotFound(EquipmentId::new(42))));
        assert_eq!(repo.breaker().stats().calls, 1);
        assert_eq!(repo.breaker().stats().failures, 0);
        assert_eq!(repo.breaker().state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_retries() {
        let inner = InMemoryEquipmentRepository::new();
        inner.fail_next_calls(10);
        let repo = resilient(inner, 2, 5);

        let result = repo.get_by_id(EquipmentId::new(1)).await;

        assert_eq!(
            result,
            Err(RepositoryError::CircuitOpen("equipment_repository".into()))
        );
        assert_eq!(repo.breaker().state(), BreakerState::Open);
        assert_eq!(repo.breaker().stats().failures, 2);
    }

    #[tokio::test]
    async fn test_timed_out_insert_is_not_repeated() {
        let inner = InMemoryEquipmentRepository::new();
        let repo = resilient_with_timeout(
            StallOnceRepository::new(inner.clone()),
            5,
            3,
            Duration::from_millis(20),
        );

        let result = repo.insert(NewEquipment::new("Pump", "P-1")).await;

        assert!(matches!(result, Err(RepositoryError::Timeout(_))));
        assert_eq!(inner.record_count(), 1);
        assert_eq!(repo.breaker().stats().calls, 1);
    }

    #[tokio::test]
    async fn test_timed_out_delete_that_landed_reports_success() {
        let inner = InMemoryEquipmentRepository::new();
        let id = inner.insert(NewEquipment::new("Pump", "P-1")).await.unwrap();
        let repo = resilient_with_timeout(
            StallOnceRepository::new(inner.clone()),
            5,
            3,
            Duration::from_millis(20),
        );

        let result = repo.delete(id).await;

        assert_eq!(result, Ok(()));
        assert_eq!(inner.record_count(), 0);
        assert_eq!(repo.breaker().stats().calls, 2);
    }

    #[tokio::test]
    async fn test_unavailable_insert_is_retried_once_per_failure() {
        let inner = InMemoryEquipmentRepository::new();
        inner.fail_next_calls(1);
        let repo = resilient(inner.clone(), 5, 3);

        repo.insert(NewEquipment::new("Pump", "P-1")).await.unwrap();

        assert_eq!(inner.record_count(), 1);
        assert_eq!(repo.breaker().stats().calls, 2);
    }
}
