//! Per-namespace concurrency limit for outbound engine queries

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::domain::binding::Namespace;
use crate::domain::DomainError;
use crate::infrastructure::observability::record_backpressure;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 2_000;

/// Bounds in-flight queries per namespace
///
/// A caller that cannot get a slot within the acquire timeout is shed with
/// `Overloaded`. One saturated namespace never blocks another.
#[derive(Debug)]
pub struct NamespaceLimiter {
    max_in_flight: usize,
    acquire_timeout: Duration,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for NamespaceLimiter {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_IN_FLIGHT,
            Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
        )
    }
}

impl NamespaceLimiter {
    pub fn new(max_in_flight: usize, acquire_timeout: Duration) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            acquire_timeout,
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    fn semaphore_for(&self, namespace: &Namespace) -> Arc<Semaphore> {
        let mut semaphores = self
            .semaphores
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Outstanding permits keep their semaphore referenced
        semaphores.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);

        semaphores
            .entry(namespace.as_str().to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_in_flight)))
            .clone()
    }

    /// Wait for a query slot in `namespace`; the slot is released on drop
    pub async fn acquire(&self, namespace: &Namespace) -> Result<OwnedSemaphorePermit, DomainError> {
        let semaphore = self.semaphore_for(namespace);

        match tokio::time::timeout(self.acquire_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(DomainError::internal("Namespace limiter closed")),
            Err(_) => {
                record_backpressure(namespace.as_str());
                warn!(namespace = %namespace, max_in_flight = self.max_in_flight, "Namespace saturated; shedding query");
                Err(DomainError::overloaded(format!(
                    "Too many concurrent queries for namespace '{}'",
                    namespace
                )))
            }
        }
    }

    /// Namespaces with a live semaphore
    pub fn tracked(&self) -> usize {
        self.semaphores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
