//! Errors returned by blocking operations.
//!
//! [`LockError::TimedOut`] and [`LockError::Deadlock`] are expected outcomes
//! that callers should handle. [`LockError::NotHeld`] means the caller
//! released something it never acquired; that is a bug in the caller, and
//! retrying will not help.
use core::fmt;

/// Which half of a read/write lock an operation was acting on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LockKind {
    /// The shared (read) lock.
    Read,
    /// The exclusive (write) lock.
    Write,
}

/// An error returned by [`RwLock`](crate::RwLock) operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum LockError {
    /// The lock could not be acquired before the timeout expired.
    ///
    /// The lock's state is exactly as it was before the call.
    #[error("timed out waiting for the {kind} lock")]
    TimedOut {
        /// The lock that was being acquired.
        kind: LockKind,
    },

    /// Another identity is already upgrading its read lock to the write lock.
    ///
    /// That upgrade cannot finish until the caller releases its own read
    /// lock, so waiting would never succeed.
    #[error("deadlock: another identity is already upgrading to the write lock")]
    Deadlock,

    /// The caller released a lock it does not hold.
    #[error("{kind} lock released by an identity that does not hold it")]
    NotHeld {
        /// The lock that was being released.
        kind: LockKind,
    },
}

/// An error returned by [`BlockingQueue::pop_front`].
///
/// [`BlockingQueue::pop_front`]: crate::BlockingQueue::pop_front
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PopError {
    /// The queue stayed empty until the timeout expired.
    #[error("timed out waiting for a value")]
    TimedOut,

    /// The queue is empty and has been shut down.
    #[error("queue shut down")]
    ShutDown,
}

/// Returned by [`BlockingQueue::push_back`] when the queue has been shut
/// down. Carries the value that was not enqueued.
///
/// [`BlockingQueue::push_back`]: crate::BlockingQueue::push_back
#[derive(Clone, Eq, PartialEq, thiserror::Error)]
#[error("queue shut down")]
pub struct Closed<T>(pub T);

impl<T> Closed<T> {
    /// Returns the value that could not be pushed.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Closed(..)")
    }
}

impl LockError {
    /// Returns `true` if this error was caused by misuse of the lock rather
    /// than by contention.
    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::NotHeld { .. })
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.pad("read"),
            Self::Write => f.pad("write"),
        }
    }
}
