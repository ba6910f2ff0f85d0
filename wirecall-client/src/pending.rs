//! Pending request table
//!
//! Maps the normalized id of every request that has been issued but not yet
//! answered to the sender half of its oneshot channel. An entry is removed
//! from the table before it is settled, so each request settles once.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use wirecall_core::{Error, Id, Result};

/// Receiving half handed to the caller
pub type Settlement = oneshot::Receiver<Result<Value>>;

/// A request awaiting its response
#[derive(Debug)]
pub struct PendingRequest {
    pub id: String,
    pub method: String,
    pub started: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

impl PendingRequest {
    /// Deliver the outcome; false if the caller dropped its future
    pub fn settle(self, outcome: Result<Value>) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &Id, method: &str) -> Settlement {
        let (tx, rx) = oneshot::channel();
        let key = id.to_key();
        let entry = PendingRequest {
            id: key.clone(),
            method: method.to_string(),
            started: Instant::now(),
            tx,
        };
        self.lock().insert(key, entry);
        rx
    }

    /// Remove and return the entry for a normalized id
    pub fn take(&self, key: &str) -> Option<PendingRequest> {
        self.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Outstanding ids, numeric ids in numeric order first
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        });
        ids
    }

    /// Reject every outstanding request with `error`; returns how many
    pub fn fail_all(&self, error: Error) -> usize {
        let drained: Vec<PendingRequest> = self.lock().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            entry.settle(Err(error.clone()));
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
