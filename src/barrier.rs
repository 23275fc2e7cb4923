//! Completion barrier for a fetch cycle
//!
//! A counter of outstanding asynchronous units with a single completion action.
//! The action runs exactly once, when the cumulative count returns to zero.
//! Counting below zero is an invariant violation and panics.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type CompletionHandler = Box<dyn FnOnce() + Send + 'static>;

struct BarrierState {
    outstanding: usize,
    handler: Option<CompletionHandler>,
    resolved: bool,
}

/// Counting barrier that fires its handler once all armed units complete
pub struct FetchBarrier {
    state: Mutex<BarrierState>,
}

impl FetchBarrier {
    /// Create an unarmed barrier with the action to run at zero
    pub fn new(on_zero: impl FnOnce() + Send + 'static) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                outstanding: 0,
                handler: Some(Box::new(on_zero)),
                resolved: false,
            }),
        }
    }

    /// Add `units` outstanding operations.
    ///
    /// Must be called before any of those operations can complete. Arming a fresh
    /// barrier with zero units resolves it immediately.
    pub fn arm(&self, units: usize) {
        let handler = {
            let mut state = self.lock();
            if state.resolved {
                panic!("BarrierUnderflow: arm({units}) on a resolved fetch barrier");
            }
            state.outstanding += units;
            Self::take_if_drained(&mut state)
        };

        if let Some(handler) = handler {
            handler();
        }
    }

    /// Mark one unit finished, firing the handler if it was the last
    pub fn complete(&self) {
        let handler = {
            let mut state = self.lock();
            if state.resolved || state.outstanding == 0 {
                panic!("BarrierUnderflow: complete() with no outstanding units");
            }
            state.outstanding -= 1;
            Self::take_if_drained(&mut state)
        };

        // The handler was taken under the lock, so only this caller can run it.
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Units still outstanding
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Whether the handler has fired
    pub fn is_resolved(&self) -> bool {
        self.lock().resolved
    }

    fn take_if_drained(state: &mut BarrierState) -> Option<CompletionHandler> {
        if state.outstanding == 0 {
            state.resolved = true;
            state.handler.take()
        } else {
            None
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FetchBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FetchBarrier")
            .field("outstanding", &state.outstanding)
            .field("resolved", &state.resolved)
            .finish()
    }
}

/// One armed unit of a barrier, completed when dropped.
///
/// Query tasks hold one of these for their whole lifetime, so a unit is released
/// whether the task finishes, fails, panics, or is cancelled.
pub struct BarrierUnit {
    barrier: Arc<FetchBarrier>,
}

impl BarrierUnit {
    /// Wrap a unit that has already been counted by [`FetchBarrier::arm`]
    pub fn new(barrier: Arc<FetchBarrier>) -> Self {
        Self { barrier }
    }
}

impl Drop for BarrierUnit {
    fn drop(&mut self) {
        self.barrier.complete();
    }
}
