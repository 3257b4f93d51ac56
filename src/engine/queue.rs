//! Evaluation queue
//!
//! FIFO of assets awaiting a decision. An asset already waiting is not
//! queued twice, and only one drain runs at a time.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Pending {
    order: VecDeque<String>,
    members: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct EvaluationQueue {
    pending: Mutex<Pending>,
    draining: AtomicBool,
}

/// Held while draining; releases the drain flag on drop
pub struct DrainGuard<'a> {
    queue: &'a EvaluationQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.queue.draining.store(false, Ordering::Release);
    }
}

impl EvaluationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an asset. Returns false if it is already waiting.
    pub fn push(&self, asset_id: &str) -> bool {
        let mut pending = self.lock();
        if !pending.members.insert(asset_id.to_string()) {
            return false;
        }
        pending.order.push_back(asset_id.to_string());
        true
    }

    pub fn pop(&self) -> Option<String> {
        let mut pending = self.lock();
        let asset_id = pending.order.pop_front()?;
        pending.members.remove(&asset_id);
        Some(asset_id)
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    /// Claim the drain. None while another drain is in progress.
    pub fn try_begin_drain(&self) -> Option<DrainGuard<'_>> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard { queue: self })
    }
}
