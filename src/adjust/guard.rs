//! Re-entrancy guard shared by recursive pull providers.
//!
//! Providers in a hierarchy can end up asking each other for their boundary
//! through a chain of sources. A recursive provider only descends into its
//! source while it holds the guard; a nested attempt on the same thread, by
//! the same or by a different provider, is refused and answered from local
//! state instead.
//!
//! Holding is tracked per thread. Another thread computing a boundary at the
//! same time is not nested inside this call and always gets its own entry.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

static GLOBAL_GUARD: RecursionGuard = RecursionGuard::new();

thread_local! {
    // Addresses of the guards held by the current thread.
    static HELD: RefCell<SmallVec<[usize; 4]>> = RefCell::new(SmallVec::new());
}

/// How a pull provider protects its upstream query against re-entrance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    /// Query the source directly. Only safe for hierarchies that are acyclic
    /// by construction.
    NonRecursive,
    /// Query the source while holding the recursion guard; nested calls
    /// short-circuit to the last known boundary.
    #[default]
    Recursive,
}

#[derive(Debug)]
pub struct RecursionGuard {
    holders: AtomicUsize,
}

impl RecursionGuard {
    pub const fn new() -> Self {
        Self {
            holders: AtomicUsize::new(0),
        }
    }

    /// The process-wide guard used by providers that are not given their own.
    pub fn global() -> &'static RecursionGuard {
        &GLOBAL_GUARD
    }

    /// Try to take the guard on the current thread. Returns `None` when this
    /// thread already holds it.
    ///
    /// The guard is released when the returned ticket is dropped.
    pub fn try_enter(&self) -> Option<GuardTicket<'_>> {
        let addr = self.addr();
        let granted = HELD.with(|held| {
            let mut held = held.borrow_mut();
            if held.contains(&addr) {
                false
            } else {
                held.push(addr);
                true
            }
        });
        if !granted {
            return None;
        }
        self.holders.fetch_add(1, Ordering::AcqRel);
        Some(GuardTicket {
            guard: self,
            _thread_bound: PhantomData,
        })
    }

    /// Whether the current thread holds the guard.
    pub fn is_active(&self) -> bool {
        let addr = self.addr();
        HELD.with(|held| held.borrow().contains(&addr))
    }

    /// Number of threads holding the guard right now.
    pub fn active_threads(&self) -> usize {
        self.holders.load(Ordering::Acquire)
    }

    fn addr(&self) -> usize {
        self as *const Self as usize
    }

    fn release(&self) {
        let addr = self.addr();
        // The slot is gone only while the thread itself is being torn down.
        let _ = HELD.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|a| *a == addr) {
                held.swap_remove(pos);
            }
        });
        self.holders.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for RecursionGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding a [`RecursionGuard`] on the current thread.
///
/// Tickets cannot leave the thread that took them.
#[must_use = "the guard is released as soon as the ticket is dropped"]
#[derive(Debug)]
pub struct GuardTicket<'a> {
    guard: &'a RecursionGuard,
    _thread_bound: PhantomData<*const ()>,
}

impl GuardTicket<'_> {
    /// Release the guard explicitly.
    pub fn exit(self) {}
}

impl Drop for GuardTicket<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

/// Whether the current thread is inside a provider computation that uses the
/// process-wide guard.
pub fn is_global_already_adjusting_key() -> bool {
    GLOBAL_GUARD.is_active()
}
