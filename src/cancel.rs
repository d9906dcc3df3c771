//! Cooperative cancellation.
//!
//! A [`CancelHandle`] is a one-way flag. Blocking components subscribe to it
//! so that cancelling wakes every thread parked on their condition variables
//! instead of leaving them to notice the flag on their next wake-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Something that parks threads and can wake them all.
///
/// Implementations must take the same lock their waiters hold before
/// notifying, so a waiter that checked the flag just before cancellation
/// cannot miss the wake-up.
pub(crate) trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

/// Lock a mutex, recovering the guard if another thread panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct CancelState {
    canceled: AtomicBool,
    listeners: Mutex<Vec<Weak<dyn Interrupt>>>,
}

impl CancelState {
    fn cancel(&self) {
        if self.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners = std::mem::take(&mut *lock(&self.listeners));
        for listener in listeners.iter().filter_map(Weak::upgrade) {
            listener.interrupt();
        }
    }
}

impl Interrupt for CancelState {
    fn interrupt(&self) {
        self.cancel();
    }
}

/// Handle used to cancel an export from any thread.
///
/// Clones share the same flag. Once cancelled, a handle stays cancelled.
///
/// # Example
///
/// ```
/// use pyramid_export::CancelHandle;
///
/// let handle = CancelHandle::new();
/// let remote = handle.clone();
/// std::thread::spawn(move || remote.cancel()).join().unwrap();
/// assert!(handle.is_canceled());
/// ```
#[derive(Clone, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every subscribed waiter.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    /// Wake `listener` when this handle is cancelled.
    ///
    /// If the handle is already cancelled the listener is interrupted
    /// immediately.
    pub(crate) fn subscribe(&self, listener: Weak<dyn Interrupt>) {
        let mut listeners = lock(&self.state.listeners);
        if self.is_canceled() {
            drop(listeners);
            if let Some(listener) = listener.upgrade() {
                listener.interrupt();
            }
            return;
        }
        listeners.retain(|l| l.strong_count() > 0);
        listeners.push(listener);
    }

    /// Cancel `child` whenever this handle is cancelled.
    pub(crate) fn forward_to(&self, child: &CancelHandle) {
        let state: Arc<dyn Interrupt> = child.state.clone();
        self.subscribe(Arc::downgrade(&state));
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
