//! Caps the number of requests in flight.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-backed admission control shared by every connection.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    max_concurrency: NonZeroUsize,
}

impl ConcurrencyLimit {
    /// Creates a limit admitting `max_concurrency` requests at once.
    #[must_use]
    pub fn new(max_concurrency: NonZeroUsize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.get())),
            closed: Arc::new(AtomicBool::new(false)),
            max_concurrency,
        }
    }

    /// Returns the configured limit.
    #[must_use]
    pub const fn max_concurrency(&self) -> NonZeroUsize {
        self.max_concurrency
    }

    /// Returns the number of free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns `true` once [`ConcurrencyLimit::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops admitting requests. Waiters are released with an error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
    }

    /// Waits for a free slot. The slot is released when the permit drops.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Closed`] when the limit has been closed.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, LimiterError> {
        if self.is_closed() {
            return Err(LimiterError::Closed);
        }
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterError::Closed)
    }
}

/// Errors produced by the limiter.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimiterError {
    /// The limiter no longer admits requests.
    #[error("concurrency limit closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn respects_max_concurrency() {
        let limit = ConcurrencyLimit::new(NonZeroUsize::new(2).unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limit = limit.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _permit = limit.acquire().await.unwrap();
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 2);
        assert_eq!(limit.available(), 2);
    }

    #[tokio::test]
    async fn close_rejects_new_requests() {
        let limit = ConcurrencyLimit::new(NonZeroUsize::new(1).unwrap());
        limit.close();
        assert_eq!(limit.acquire().await.unwrap_err(), LimiterError::Closed);
    }
}
