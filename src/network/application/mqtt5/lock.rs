//! Locking for state shared between the receive path and sender threads.
//!
//! With the `std` feature every [`Shared`] owns a `std::sync::Mutex`, so
//! two connections never contend with each other. Without it each lock is a
//! `critical_section` section, which the target implements system wide.

#[cfg(not(feature = "std"))]
use core::cell::RefCell;

/// A value that may be touched from several execution contexts.
pub(crate) struct Shared<T> {
    #[cfg(feature = "std")]
    inner: std::sync::Mutex<T>,
    #[cfg(not(feature = "std"))]
    inner: critical_section::Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            #[cfg(feature = "std")]
            inner: std::sync::Mutex::new(value),
            #[cfg(not(feature = "std"))]
            inner: critical_section::Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// Not reentrant with the `std` feature: `f` must not lock the same
    /// value again.
    #[cfg(feature = "std")]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Run `f` with exclusive access to the value.
    #[cfg(not(feature = "std"))]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn updates_from_many_threads_are_not_lost() {
        let shared = Arc::new(Shared::new(0u32));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        shared.with(|v| *v += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.with(|v| *v), 4_000);
    }

    #[test]
    fn separate_values_can_be_locked_together() {
        let outer = Shared::new(1u8);
        let inner = Shared::new(2u8);
        let sum = outer.with(|a| inner.with(|b| *a + *b));
        assert_eq!(sum, 3);
    }
}
