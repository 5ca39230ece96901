//! Bounded admission for concurrent write operations.
//!
//! A [`Gate`] limits how many protected sections (for example, open
//! temporary files) may run at once. Permits are RAII guards, so every
//! acquisition is released on every exit path: early returns, `?`
//! propagation, panics, and futures dropped on cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::error::{StoreError, StoreResult};

/// Counting gate shared by clones.
///
/// Construct one per process (or per resource being protected) and hand
/// clones to every component that needs it.
#[derive(Clone, Debug)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
    max: usize,
}

/// Proof of admission through a [`Gate`]; dropping it releases the slot.
#[derive(Debug)]
#[must_use = "dropping the permit immediately releases the gate"]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl GatePermit {
    /// A permit that holds nothing, handed out when no gate is configured.
    pub fn unlimited() -> Self {
        Self { _permit: None }
    }

    /// Release the slot explicitly.
    pub fn done(self) {}
}

impl Gate {
    /// Create a gate admitting at most `max` holders at a time.
    ///
    /// `max` is clamped to at least 1; use [`Gate::from_limit`] to express
    /// "no limit".
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// `None` for a limit of 0 (unlimited), otherwise a gate of that size.
    pub fn from_limit(limit: usize) -> Option<Self> {
        (limit > 0).then(|| Self::new(limit))
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot.
    pub async fn start(&self) -> StoreResult<GatePermit> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::ResourceExhausted("gate closed".into()))?;
        Ok(GatePermit {
            _permit: Some(permit),
        })
    }

    /// Take a slot only if one is free right now.
    pub fn try_start(&self) -> StoreResult<GatePermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(GatePermit {
                _permit: Some(permit),
            }),
            Err(TryAcquireError::NoPermits) => Err(StoreError::ResourceExhausted(format!(
                "all {} gate slots in use",
                self.max
            ))),
            Err(TryAcquireError::Closed) => {
                Err(StoreError::ResourceExhausted("gate closed".into()))
            }
        }
    }

    /// Wait at most `timeout` for a free slot.
    pub async fn start_timeout(&self, timeout: Duration) -> StoreResult<GatePermit> {
        match tokio::time::timeout(timeout, self.start()).await {
            Ok(permit) => permit,
            Err(_) => Err(StoreError::ResourceExhausted(format!(
                "no gate slot free after {timeout:?}"
            ))),
        }
    }

    /// Start on an optional gate; an absent gate admits everyone.
    pub async fn start_optional(gate: Option<&Gate>) -> StoreResult<GatePermit> {
        match gate {
            Some(gate) => gate.start().await,
            None => Ok(GatePermit::unlimited()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn permits_are_released_on_drop() {
        let gate = Gate::new(2);
        let a = gate.start().await.unwrap();
        let b = gate.start().await.unwrap();
        assert_eq!(gate.available(), 0);
        assert!(matches!(
            gate.try_start(),
            Err(StoreError::ResourceExhausted(_))
        ));
        drop(a);
        assert_eq!(gate.available(), 1);
        b.done();
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn start_timeout_reports_exhaustion() {
        let gate = Gate::new(1);
        let _held = gate.start().await.unwrap();
        let err = gate
            .start_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ResourceExhausted(_)));
    }

    #[tokio::test]
    async fn absent_gate_is_unlimited() {
        assert!(Gate::from_limit(0).is_none());
        let permits: Vec<_> = start_many_unlimited(1000).await;
        assert_eq!(permits.len(), 1000);
    }

    async fn start_many_unlimited(n: usize) -> Vec<GatePermit> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(Gate::start_optional(None).await.unwrap());
        }
        out
    }

    #[test]
    fn zero_is_clamped() {
        assert_eq!(Gate::new(0).max(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bounds_concurrent_sections() {
        const K: usize = 3;
        let gate = Gate::new(K);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..24)
            .map(|i| {
                let gate = gate.clone();
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _permit = gate.start().await?;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    // Every third section fails after acquiring.
                    if i % 3 == 0 {
                        return Err(StoreError::NotImplemented("section"));
                    }
                    Ok(())
                })
            })
            .collect();

        let mut failures = 0;
        for task in tasks {
            if task.await.unwrap().is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 8);
        assert!(peak.load(Ordering::SeqCst) <= K);
        assert_eq!(gate.available(), K);
    }

    #[tokio::test]
    async fn cancelled_waiter_and_holder_release() {
        let gate = Gate::new(1);
        let holder = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.start().await.unwrap();
                std::future::pending::<()>().await;
            })
        };
        tokio::task::yield_now().await;
        while gate.available() != 0 {
            tokio::task::yield_now().await;
        }
        holder.abort();
        let _ = holder.await;
        assert_eq!(gate.available(), 1);
    }
}
