//! Manual-reset event: stays signaled until explicitly reset.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A manual-reset event built on a mutex-protected flag and a condition variable.
///
/// `set` wakes every waiter and keeps the event signaled, so late waiters pass
/// straight through until someone calls `reset`. Every `set` also advances a
/// generation counter, which lets a waiter block until the event is raised
/// again rather than return on a signal it has already consumed.
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    state: Mutex<EventState>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct EventState {
    signaled: bool,
    generation: u64,
}

impl ManualResetEvent {
    /// Create an event in the given initial state.
    #[must_use]
    pub const fn new(signaled: bool) -> Self {
        Self {
            state: Mutex::new(EventState {
                signaled,
                generation: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Signal the event, advance its generation and wake all waiters.
    pub fn set(&self) {
        let mut state = self.state.lock();
        state.signaled = true;
        state.generation += 1;
        self.cond.notify_all();
    }

    /// Return the event to the non-signaled state.
    pub fn reset(&self) {
        self.state.lock().signaled = false;
    }

    /// Check the current state without blocking.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.lock().signaled
    }

    /// Number of times the event has been set.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Block until the event is signaled.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.signaled {
            self.cond.wait(&mut state);
        }
    }

    /// Block until the event has been set after generation `seen`.
    ///
    /// Returns the generation observed on wake-up. The current signaled
    /// state is ignored.
    pub fn wait_newer(&self, seen: u64) -> u64 {
        let mut state = self.state.lock();
        while state.generation <= seen {
            self.cond.wait(&mut state);
        }
        state.generation
    }

    /// Block until the event is signaled or `timeout` elapses.
    ///
    /// Returns `true` if the event was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.signaled {
            return true;
        }
        let _ = self
            .cond
            .wait_while_for(&mut state, |state| !state.signaled, timeout);
        state.signaled
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_event_starts_in_requested_state() {
        assert!(ManualResetEvent::new(true).is_set());
        assert!(!ManualResetEvent::new(false).is_set());
    }

    #[test]
    fn test_event_stays_set_until_reset() {
        let event = ManualResetEvent::new(false);
        event.set();
        event.wait();
        event.wait();
        assert!(event.is_set());

        event.reset();
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_event_wakes_other_thread() {
        let event = Arc::new(ManualResetEvent::new(false));
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait())
        };

        event.set();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_newer_ignores_stale_signal() {
        let event = Arc::new(ManualResetEvent::new(false));
        event.set();
        let seen = event.generation();
        assert_eq!(seen, 1);
        assert!(event.is_set());

        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait_newer(seen))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        event.set();
        assert_eq!(waiter.join().unwrap(), 2);
    }
}
