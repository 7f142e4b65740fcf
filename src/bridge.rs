//! One-shot settlement gates.
//!
//! A [`Gate`] turns a "this will happen at most once" lifecycle event
//! (output fully terminated, input fully flushed) into a future any
//! number of tasks can await. Settlement is at-most-once by construction:
//! the first `open` or `fail` wins and later settlements are ignored, so
//! callers never have to reason about duplicate completion signals.
//! Waiting after settlement short-circuits immediately, and a dropped
//! wait future detaches its waiter automatically.

use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

use crate::error::{GjollError, Result};

#[derive(Debug, Clone)]
enum Settlement {
    Pending,
    Open,
    Failed(GjollError),
}

/// A one-shot, multi-waiter completion cell.
#[derive(Debug)]
pub struct Gate {
    settlement: Mutex<Settlement>,
    notify: Notify,
}

impl Gate {
    /// Create an unsettled gate.
    pub fn new() -> Self {
        Self {
            settlement: Mutex::new(Settlement::Pending),
            notify: Notify::new(),
        }
    }

    /// Settle the gate successfully. No-op if already settled.
    pub fn open(&self) {
        self.settle(Settlement::Open);
    }

    /// Settle the gate with an error. No-op if already settled.
    pub fn fail(&self, error: GjollError) {
        self.settle(Settlement::Failed(error));
    }

    /// Whether the gate has settled (either way).
    pub fn is_settled(&self) -> bool {
        !matches!(*self.lock(), Settlement::Pending)
    }

    /// Wait for settlement. Resolves immediately if already settled.
    pub async fn wait(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            match &*self.lock() {
                Settlement::Open => return Ok(()),
                Settlement::Failed(error) => return Err(error.clone()),
                Settlement::Pending => {}
            }
            notified.await;
        }
    }

    fn settle(&self, settlement: Settlement) {
        {
            let mut current = self.lock();
            if !matches!(*current, Settlement::Pending) {
                return;
            }
            *current = settlement;
        }
        self.notify.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settlement> {
        self.settlement.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_after_open_short_circuits() {
        let gate = Gate::new();
        gate.open();
        assert!(gate.is_settled());
        gate.wait().await.unwrap();
    }

    #[tokio::test]
    async fn first_settlement_wins() {
        let gate = Gate::new();
        gate.fail(GjollError::upstream("boom"));
        gate.open();
        assert_eq!(gate.wait().await, Err(GjollError::upstream("boom")));
    }

    #[tokio::test]
    async fn wakes_every_waiter() {
        let gate = std::sync::Arc::new(Gate::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();
        gate.open();
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }
    }
}
