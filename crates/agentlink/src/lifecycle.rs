//! Scoped release of agent processes
//!
//! Sessions and query streams hold a [`ShutdownGuard`] whose cleanup starts a
//! graceful termination of the child. Dropping the owner early, or letting a
//! panic unwind through it, still stops the process.

/// RAII guard running a cleanup closure on drop
pub struct ShutdownGuard {
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl ShutdownGuard {
    /// Create a new guard with a cleanup function
    pub fn new<F>(on_drop: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Consume the guard without running cleanup
    ///
    /// Used once the owner has shut the child down itself.
    pub fn disarm(mut self) {
        self.on_drop.take();
    }

    /// Run cleanup now and consume the guard
    pub fn cleanup(mut self) {
        if let Some(cleanup) = self.on_drop.take() {
            cleanup();
        }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.on_drop.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for ShutdownGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownGuard")
            .field("armed", &self.on_drop.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_guard() -> (ShutdownGuard, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let guard = ShutdownGuard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (guard, runs)
    }

    #[test]
    fn test_guard_runs_on_drop() {
        let (guard, runs) = counting_guard();
        drop(guard);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_cleanup_runs_once() {
        let (guard, runs) = counting_guard();
        guard.cleanup();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disarmed_guard_does_nothing() {
        let (guard, runs) = counting_guard();
        guard.disarm();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_guard_runs_during_unwind() {
        let (guard, runs) = counting_guard();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("consumer blew up");
        }));
        assert!(result.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
