//! Cooperative cancellation shared by every part of one run

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cancellation token for a run
///
/// Cloning shares the token. Cancellation is cooperative: nothing is
/// interrupted, long-running code is expected to poll [`is_cancelled`]
/// or sleep through [`wait`] so it wakes up when the token fires.
///
/// A token with a deadline reports itself cancelled once the deadline passes.
///
/// [`is_cancelled`]: CancelToken::is_cancelled
/// [`wait`]: CancelToken::wait
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// Deadline `timeout` from now; a timeout too large to represent never fires
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            log::debug!("Cancellation requested");
        }
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Sleep for `duration`, waking early if the token fires
    ///
    /// Returns `true` when the full duration elapsed, `false` when the sleep
    /// was cut short by cancellation (or the deadline).
    pub fn wait(&self, duration: Duration) -> bool {
        let until = match (Instant::now().checked_add(duration), self.inner.deadline) {
            (Some(end), Some(deadline)) => Some(end.min(deadline)),
            (Some(end), None) => Some(end),
            (None, deadline) => deadline,
        };

        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if self.inner.cancelled.load(Ordering::SeqCst) {
                return false;
            }
            guard = match until {
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        return !self.is_cancelled();
                    }
                    match self.inner.wake.wait_timeout(guard, until - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                // Unbounded sleep: only cancellation ends it
                None => match self.inner.wake.wait(guard) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_wait_runs_to_completion() {
        let token = CancelToken::new();
        assert!(token.wait(Duration::from_millis(5)));
    }

    #[test]
    fn test_wait_wakes_on_cancel() {
        let token = CancelToken::new();
        let clone = token.clone();
        let start = Instant::now();

        let handle = thread::spawn(move || clone.wait(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert!(!handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_huge_wait_is_cut_by_cancel() {
        let token = CancelToken::new();
        let clone = token.clone();
        let handle = thread::spawn(move || clone.wait(Duration::MAX));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn test_huge_wait_ends_at_deadline() {
        let token = CancelToken::with_deadline(Instant::now() + Duration::from_millis(50));
        assert!(!token.wait(Duration::MAX));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_huge_timeout_never_fires() {
        let token = CancelToken::with_timeout(Duration::MAX);
        assert!(!token.is_cancelled());
        assert_eq!(token.remaining(), None);
    }

    #[test]
    fn test_deadline_cancels() {
        let token = CancelToken::with_timeout(Duration::from_millis(200));
        assert!(!token.is_cancelled());
        assert!(!token.wait(Duration::from_secs(10)));
        assert!(token.is_cancelled());
        assert_eq!(token.remaining(), Some(Duration::ZERO));
    }
}
