//! Guard against unbounded re-entrant mutation.
//!
//! Each model and collection counts the emissions it has in flight. A change
//! handler that mutates its own source opens a nested emission; once the
//! nesting reaches [`MAX_REENTRANT_DEPTH`] further transactions are refused.

use std::sync::atomic::{AtomicUsize, Ordering};

use horizon_data_core::{Error, Result};

/// Maximum number of nested emissions a single model or collection allows.
pub const MAX_REENTRANT_DEPTH: usize = 16;

/// Marks one emission in flight for as long as it lives.
pub(crate) struct DepthGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> DepthGuard<'a> {
    pub(crate) fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fail with [`Error::Reentrancy`] once `counter` has reached the limit.
///
/// Callers log the refusal under their own tracing target.
pub(crate) fn check(counter: &AtomicUsize) -> Result<()> {
    let depth = counter.load(Ordering::SeqCst);
    if depth >= MAX_REENTRANT_DEPTH {
        return Err(Error::Reentrancy { depth });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts_nesting() {
        let counter = AtomicUsize::new(0);
        {
            let _outer = DepthGuard::enter(&counter);
            let _inner = DepthGuard::enter(&counter);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_check_refuses_at_limit() {
        let counter = AtomicUsize::new(MAX_REENTRANT_DEPTH - 1);
        assert!(check(&counter).is_ok());
        let _guard = DepthGuard::enter(&counter);
        assert_eq!(
            check(&counter),
            Err(Error::Reentrancy { depth: MAX_REENTRANT_DEPTH })
        );
    }
}
