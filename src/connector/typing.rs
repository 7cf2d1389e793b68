use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Single re-armable timer backing the typing debounce.
///
/// Arming runs its leading action, cancels the pending callback and schedules
/// a new one under one lock. A timer fires under that same lock, and only if
/// its sequence number is still the latest, so a stale callback can never
/// interleave with a newer leading action.
pub(crate) struct TypingTimer {
    pending: Arc<Mutex<Pending>>,
}

#[derive(Default)]
struct Pending {
    seq: u64,
    task: Option<JoinHandle<()>>,
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TypingTimer {
    pub(crate) fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Run `lead` now and schedule `on_fire` after `window`, replacing any
    /// pending callback.
    ///
    /// The timer holds `target` weakly; once it is gone the callback is
    /// skipped. Neither action may re-enter the timer.
    pub(crate) fn arm<T, L>(&self, window: Duration, target: &Arc<T>, lead: L, on_fire: fn(&T))
    where
        T: Send + Sync + 'static,
        L: FnOnce(&T),
    {
        let mut pending = lock(&self.pending);
        if let Some(task) = pending.task.take() {
            task.abort();
        }
        pending.seq += 1;
        let seq = pending.seq;

        lead(target);

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot arm typing timer outside a tokio runtime");
                return;
            }
        };

        let slot = Arc::clone(&self.pending);
        let target: Weak<T> = Arc::downgrade(target);
        pending.task = Some(runtime.spawn(async move {
            tokio::time::sleep(window).await;

            let Some(target) = target.upgrade() else {
                return;
            };
            let mut pending = lock(&slot);
            if pending.seq == seq {
                pending.task = None;
                on_fire(&target);
            }
            // Release before `target`, which may be the last strong reference
            drop(pending);
        }));
    }

    /// Drop the pending callback, if any
    pub(crate) fn cancel(&self) -> bool {
        let mut pending = lock(&self.pending);
        pending.seq += 1;
        match pending.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        lock(&self.pending).task.is_some()
    }
}

impl Drop for TypingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
