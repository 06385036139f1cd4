//! Wait handles for deferred completions.
//!
//! A [`WaitHandle`] resolves exactly once with one of the
//! [`WaitOutcome`] values. The waiting side may block, poll, or cancel;
//! the notifying side resolves it on the event or abandons it when the
//! stream closes. All races (cancel vs. notify vs. close) collapse to
//! whichever transition lands first; later transitions are no-ops.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Terminal outcome of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The awaited event occurred.
    Notified,
    /// The waiter cancelled before the event occurred.
    Cancelled,
    /// The stream closed before the event occurred.
    NoLongerExists,
}

#[derive(Debug)]
enum WaitState {
    Pending,
    Resolved(WaitOutcome),
}

#[derive(Debug)]
struct Shared {
    state: Mutex<WaitState>,
    cond: Condvar,
}

impl Shared {
    /// First resolution wins; returns whether this call resolved it.
    fn resolve(&self, outcome: WaitOutcome) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, WaitState::Resolved(_)) {
            return false;
        }
        *state = WaitState::Resolved(outcome);
        self.cond.notify_all();
        true
    }
}

/// Caller-side handle for one pending wait.
#[derive(Debug, Clone)]
pub struct WaitHandle {
    shared: Arc<Shared>,
}

/// Producer-side handle that resolves the paired [`WaitHandle`].
#[derive(Debug)]
pub struct Notifier {
    shared: Arc<Shared>,
}

/// Creates a connected wait/notify pair.
#[must_use]
pub fn wait_pair() -> (WaitHandle, Notifier) {
    let shared = Arc::new(Shared {
        state: Mutex::new(WaitState::Pending),
        cond: Condvar::new(),
    });
    (
        WaitHandle {
            shared: Arc::clone(&shared),
        },
        Notifier { shared },
    )
}

impl WaitHandle {
    /// Blocks until the handle resolves.
    #[must_use]
    pub fn wait(&self) -> WaitOutcome {
        let mut state = self.shared.state.lock();
        loop {
            if let WaitState::Resolved(outcome) = *state {
                return outcome;
            }
            self.shared.cond.wait(&mut state);
        }
    }

    /// Returns the outcome if the handle has already resolved.
    #[must_use]
    pub fn try_wait(&self) -> Option<WaitOutcome> {
        match *self.shared.state.lock() {
            WaitState::Resolved(outcome) => Some(outcome),
            WaitState::Pending => None,
        }
    }

    /// Cancels the wait. Loses the race against a natural completion that
    /// already resolved the handle; the established outcome stands.
    pub fn cancel(&self) {
        self.shared.resolve(WaitOutcome::Cancelled);
    }
}

impl Notifier {
    /// Resolves the wait with [`WaitOutcome::Notified`].
    pub fn notify(self) {
        self.shared.resolve(WaitOutcome::Notified);
    }

    /// Resolves the wait with [`WaitOutcome::NoLongerExists`].
    pub fn abandon(self) {
        self.shared.resolve(WaitOutcome::NoLongerExists);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn notify_resolves_waiter() {
        let (handle, notifier) = wait_pair();
        assert_eq!(handle.try_wait(), None);

        notifier.notify();
        assert_eq!(handle.wait(), WaitOutcome::Notified);
        assert_eq!(handle.try_wait(), Some(WaitOutcome::Notified));
    }

    #[test]
    fn cancel_before_notify_wins() {
        let (handle, notifier) = wait_pair();
        handle.cancel();
        notifier.notify();
        assert_eq!(handle.wait(), WaitOutcome::Cancelled);
    }

    #[test]
    fn notify_before_cancel_wins() {
        let (handle, notifier) = wait_pair();
        notifier.notify();
        handle.cancel();
        assert_eq!(handle.wait(), WaitOutcome::Notified);
    }

    #[test]
    fn abandon_reports_no_longer_exists() {
        let (handle, notifier) = wait_pair();
        notifier.abandon();
        assert_eq!(handle.wait(), WaitOutcome::NoLongerExists);
    }

    #[test]
    fn blocked_waiter_wakes_on_notify() {
        let (handle, notifier) = wait_pair();
        let waiter = {
            let handle = handle.clone();
            thread::spawn(move || handle.wait())
        };

        thread::sleep(Duration::from_millis(10));
        notifier.notify();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Notified);
    }

    #[test]
    fn concurrent_cancel_and_notify_resolve_exactly_once() {
        for _ in 0..100 {
            let (handle, notifier) = wait_pair();
            let canceller = {
                let handle = handle.clone();
                thread::spawn(move || handle.cancel())
            };
            let notify = thread::spawn(move || notifier.notify());

            canceller.join().unwrap();
            notify.join().unwrap();
            let outcome = handle.wait();
            assert!(matches!(
                outcome,
                WaitOutcome::Cancelled | WaitOutcome::Notified
            ));
            // Once resolved, the outcome never changes.
            assert_eq!(handle.try_wait(), Some(outcome));
        }
    }
}
