//! Capability over local block production.
//!
//! The engine never produces blocks. It only needs to know whether this node
//! is a producer, and to cancel production scheduled on a head that a reorg
//! is about to replace.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the engine may do to local block production.
pub trait BlockProduction: Send {
    /// True if this node is currently producing blocks.
    fn is_producing(&self) -> bool;

    /// Cancel production scheduled against the current head. Synchronous.
    fn cancel_scheduled(&self);
}

/// Shared production state: the "producing" flag and the token of the
/// production run scheduled on the current head.
///
/// Clones share state; the producer keeps one, the engine another.
#[derive(Clone, Default)]
pub struct ProductionSchedule {
    producing: Arc<AtomicBool>,
    scheduled: Arc<Mutex<Option<CancellationToken>>>,
}

impl ProductionSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_producing(&self, producing: bool) {
        self.producing.store(producing, Ordering::SeqCst);
    }

    /// Schedule a production run on the current head, cancelling any earlier one.
    ///
    /// The producer awaits `cancelled()` on the returned token alongside its timer.
    pub fn schedule(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.lock_scheduled().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    fn lock_scheduled(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        // Poisoning leaves the Option intact
        self.scheduled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BlockProduction for ProductionSchedule {
    fn is_producing(&self) -> bool {
        self.producing.load(Ordering::SeqCst)
    }

    fn cancel_scheduled(&self) {
        if let Some(token) = self.lock_scheduled().take() {
            token.cancel();
            debug!("Cancelled scheduled block production");
        }
    }
}

/// Production capability of a node that never produces blocks.
pub struct NoProduction;

impl BlockProduction for NoProduction {
    fn is_producing(&self) -> bool {
        false
    }

    fn cancel_scheduled(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_shared_between_clones() {
        let schedule = ProductionSchedule::new();
        let engine_side = schedule.clone();
        assert!(!engine_side.is_producing());

        schedule.set_producing(true);
        assert!(engine_side.is_producing());
    }

    #[test]
    fn cancel_reaches_scheduled_token() {
        let schedule = ProductionSchedule::new();
        let token = schedule.schedule();
        assert!(!token.is_cancelled());

        schedule.clone().cancel_scheduled();
        assert!(token.is_cancelled());
    }

    #[test]
    fn rescheduling_cancels_previous_run() {
        let schedule = ProductionSchedule::new();
        let first = schedule.schedule();
        let second = schedule.schedule();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn cancel_without_schedule_is_harmless() {
        ProductionSchedule::new().cancel_scheduled();
        NoProduction.cancel_scheduled();
    }
}
