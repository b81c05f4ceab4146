// One binary event flag per subsystem. A producer thread calls `set()`,
// the owning worker blocks in `wait()`. Racing `set()` calls coalesce:
// only the "at least one signal arrived" bit survives, the event payload
// lives separately in SharedState and is latest-wins by design.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the flag and wake every waiter.
    pub fn set(&self) {
        let mut flag = self.lock();
        *flag = true;
        self.cond.notify_all();
    }

    /// Lower the flag. Does not wake anyone.
    pub fn clear(&self) {
        *self.lock() = false;
    }

    /// Non-blocking probe.
    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Block until the flag is set. Spurious condvar wakes are absorbed here;
    /// callers still re-check `is_set()` before consuming, since another
    /// waiter may have cleared the flag in between.
    pub fn wait(&self) {
        let mut flag = self.lock();
        while !*flag {
            flag = self
                .cond
                .wait(flag)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait`, but gives up after `timeout`. Returns whether the flag
    /// was set before the deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.lock();
        while !*flag {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(flag, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            flag = guard;
        }
        true
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_clear_probe() {
        let s = Signal::new();
        assert!(!s.is_set());
        s.set();
        assert!(s.is_set());
        s.clear();
        assert!(!s.is_set());
    }

    #[test]
    fn wait_timeout_expires_when_unset() {
        let s = Signal::new();
        assert!(!s.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_timeout_returns_immediately_when_already_set() {
        let s = Signal::new();
        s.set();
        assert!(s.wait_timeout(Duration::from_millis(0)));
    }

    #[test]
    fn cross_thread_wake() {
        let s = Arc::new(Signal::new());
        let waiter = {
            let s = s.clone();
            thread::spawn(move || {
                s.wait();
                s.is_set()
            })
        };
        thread::sleep(Duration::from_millis(20));
        s.set();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn racing_sets_coalesce() {
        let s = Signal::new();
        s.set();
        s.set();
        assert!(s.wait_timeout(Duration::from_millis(0)));
        s.clear();
        // the second set did not queue up a second wake
        assert!(!s.wait_timeout(Duration::from_millis(5)));
    }
}
