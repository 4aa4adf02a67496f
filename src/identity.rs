//! Lock holder identities.
//!
//! An [`RwLock`] does not track its holders through guards. Instead, every
//! acquire and release names *who* is acting, as an [`Identity`]. Usually that
//! is the current thread, but anything comparable works: a transaction ID
//! lets a single logical owner hold a lock across several threads.
//!
//! [`RwLock`]: crate::RwLock
use crate::loom::thread;
use core::{fmt, hash::Hash};

/// A value naming a lock holder.
///
/// Two identities that compare equal are the same holder. The lock registry
/// is keyed by the identity value, so implementations of [`Hash`] and [`Eq`]
/// must agree, and identities that represent the same holder must normalize
/// to equal values.
///
/// This trait is implemented for every type meeting its bounds.
pub trait Identity: Eq + Hash + Clone + fmt::Debug {}

impl<T> Identity for T where T: Eq + Hash + Clone + fmt::Debug {}

/// Produces the identity of the current execution context.
///
/// This is used by [`ThreadRwLock`] to name the caller without making it
/// pass its identity explicitly. Whether two calls come from the same holder
/// is decided by the [`Eq`] implementation of [`Id`](Self::Id), so a provider
/// that needs to normalize identities must do so in [`current`].
///
/// [`current`]: CurrentIdentity::current
/// [`ThreadRwLock`]: crate::ThreadRwLock
pub trait CurrentIdentity {
    /// The identity type produced by this provider.
    type Id: Identity;

    /// Returns the identity of the caller.
    fn current() -> Self::Id;
}

/// Identifies callers by their thread.
#[derive(Copy, Clone, Debug, Default)]
pub struct CurrentThread;

impl CurrentIdentity for CurrentThread {
    type Id = thread::ThreadId;

    #[inline]
    fn current() -> Self::Id {
        thread::current().id()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn current_thread_is_stable() {
        let a = CurrentThread::current();
        let b = CurrentThread::current();
        assert_eq!(a, b);
    }

    #[test]
    fn other_threads_differ() {
        let here = CurrentThread::current();
        let there = std::thread::spawn(CurrentThread::current).join().unwrap();
        assert_ne!(here, there);
    }
}
