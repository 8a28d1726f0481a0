//! Counting completion barrier.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct Inner {
    count: Mutex<usize>,
    cvar: Condvar,
}

/// Barrier that releases once every clone has been dropped.
///
/// Clone one token per unit of work and move it into the work; dropping the
/// token marks that unit done. A token dropped without running (for example
/// when the pool discards a queued job) still counts, so [`WaitGroup::wait`]
/// cannot hang on lost work.
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    /// New group holding a single token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                count: Mutex::new(1),
                cvar: Condvar::new(),
            }),
        }
    }

    /// Drop this token and block until every other token is dropped.
    pub fn wait(self) {
        let inner = Arc::clone(&self.inner);
        drop(self);

        let mut count = inner.count.lock();
        while *count > 0 {
            inner.cvar.wait(&mut count);
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for WaitGroup {
    fn clone(&self) -> Self {
        *self.inner.count.lock() += 1;
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for WaitGroup {
    fn drop(&mut self) {
        let mut count = self.inner.count.lock();
        *count -= 1;
        if *count == 0 {
            self.inner.cvar.notify_all();
        }
    }
}

impl std::fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitGroup")
            .field("count", &*self.inner.count.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn waits_for_all_tokens() {
        let wg = WaitGroup::new();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let token = wg.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                done.fetch_add(1, Ordering::SeqCst);
                drop(token);
            });
        }
        wg.wait();

        assert_eq!(done.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn wait_without_clones_returns_immediately() {
        WaitGroup::new().wait();
    }
}
