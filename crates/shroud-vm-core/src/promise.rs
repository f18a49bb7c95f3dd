//! Promises for the asynchronous interpreter
//!
//! Settlement is observed through a [`tokio::sync::Notify`], so an awaiting
//! task parks until the promise settles instead of polling.

use std::pin::pin;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::value::Value;

/// Promise state
#[derive(Debug, Clone)]
pub enum PromiseState {
    /// Not yet settled
    Pending,
    /// Resolved with value
    Fulfilled(Value),
    /// Rejected with reason
    Rejected(Value),
}

impl PromiseState {
    /// Check if settled (fulfilled or rejected)
    pub fn is_settled(&self) -> bool {
        !matches!(self, PromiseState::Pending)
    }
}

/// A JavaScript Promise
#[derive(Debug)]
pub struct JsPromise {
    state: Mutex<PromiseState>,
    settled: Notify,
}

impl Default for JsPromise {
    fn default() -> Self {
        Self::new()
    }
}

impl JsPromise {
    /// Create a pending promise
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PromiseState::Pending),
            settled: Notify::new(),
        }
    }

    /// Create a promise already fulfilled with `value`
    pub fn fulfilled(value: Value) -> Self {
        Self {
            state: Mutex::new(PromiseState::Fulfilled(value)),
            settled: Notify::new(),
        }
    }

    /// Create a promise already rejected with `reason`
    pub fn rejected(reason: Value) -> Self {
        Self {
            state: Mutex::new(PromiseState::Rejected(reason)),
            settled: Notify::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> PromiseState {
        self.state.lock().clone()
    }

    /// Fulfill; ignored once settled
    pub fn resolve(&self, value: Value) {
        self.settle(PromiseState::Fulfilled(value));
    }

    /// Reject; ignored once settled
    pub fn reject(&self, reason: Value) {
        self.settle(PromiseState::Rejected(reason));
    }

    fn settle(&self, outcome: PromiseState) {
        {
            let mut state = self.state.lock();
            if state.is_settled() {
                return;
            }
            *state = outcome;
        }
        self.settled.notify_waiters();
    }

    fn outcome(&self) -> Option<Result<Value, Value>> {
        match &*self.state.lock() {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(v) => Some(Ok(v.clone())),
            PromiseState::Rejected(r) => Some(Err(r.clone())),
        }
    }

    /// Wait for settlement: `Ok(value)` or `Err(reason)`
    pub async fn settled(&self) -> Result<Value, Value> {
        loop {
            let mut notified = pin!(self.settled.notified());
            notified.as_mut().enable();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_settlement_wins() {
        let p = JsPromise::new();
        p.resolve(Value::Number(1.0));
        p.reject(Value::Number(2.0));
        assert!(matches!(p.state(), PromiseState::Fulfilled(Value::Number(n)) if n == 1.0));
    }

    #[tokio::test]
    async fn test_settled_wakes_waiter() {
        let p = Arc::new(JsPromise::new());
        let waiter = {
            let p = Arc::clone(&p);
            tokio::spawn(async move { p.settled().await })
        };
        tokio::task::yield_now().await;
        p.reject(Value::string("no"));
        let outcome = waiter.await.unwrap();
        assert_eq!(outcome.unwrap_err().as_str(), Some("no"));
    }
}
