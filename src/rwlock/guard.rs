use super::{LockState, RwLock};
use crate::{
    error::LockError,
    identity::{CurrentIdentity, CurrentThread},
    timeout::Timeout,
};
use core::{fmt, marker::PhantomData};

/// An upgradable readers-writer lock held by the calling thread.
///
/// This wraps an [`RwLock`] keyed by the identity of the caller, as reported
/// by a [`CurrentIdentity`] provider (by default, [`CurrentThread`]), and
/// hands out RAII guards that release the lock when dropped.
///
/// Acquiring the write lock while holding a [`ReadGuard`] upgrades the read
/// lock; see [`RwLock::acquire_write`] for details. Guards may be dropped in
/// any order.
///
/// # Examples
///
/// ```
/// use keylock::{ThreadRwLock, LockError};
/// use std::{sync::Arc, thread};
///
/// let lock = Arc::new(ThreadRwLock::new());
///
/// let read = lock.read().unwrap();
/// // re-entrant: this thread may read again
/// let read2 = lock.read().unwrap();
/// // and, as the only reader, upgrade without waiting
/// let write = lock.write().unwrap();
///
/// let lock2 = lock.clone();
/// thread::spawn(move || {
///     // another thread cannot read while this thread writes
///     assert!(matches!(
///         lock2.read_timeout(keylock::Timeout::expired()),
///         Err(LockError::TimedOut { .. })
///     ));
/// })
/// .join()
/// .unwrap();
///
/// drop(write);
/// drop((read, read2));
/// assert!(!lock.inner().is_locked());
/// ```
pub struct ThreadRwLock<S: CurrentIdentity = CurrentThread> {
    lock: RwLock<S::Id>,
    _identity: PhantomData<fn() -> S>,
}

/// An RAII read lock on a [`ThreadRwLock`]. Releases the lock when dropped.
///
/// This structure is created by the [`read`] and [`read_timeout`] methods on
/// [`ThreadRwLock`].
///
/// [`read`]: ThreadRwLock::read
/// [`read_timeout`]: ThreadRwLock::read_timeout
#[must_use = "if unused, the lock will immediately unlock"]
pub struct ReadGuard<'lock, S: CurrentIdentity = CurrentThread> {
    lock: &'lock RwLock<S::Id>,
    id: S::Id,
    // the lock belongs to the identity that acquired it.
    _not_send: PhantomData<*const ()>,
}

/// An RAII write lock on a [`ThreadRwLock`]. Releases the lock when dropped.
///
/// This structure is created by the [`write`] and [`write_timeout`] methods
/// on [`ThreadRwLock`].
///
/// [`write`]: ThreadRwLock::write
/// [`write_timeout`]: ThreadRwLock::write_timeout
#[must_use = "if unused, the lock will immediately unlock"]
pub struct WriteGuard<'lock, S: CurrentIdentity = CurrentThread> {
    lock: &'lock RwLock<S::Id>,
    id: S::Id,
    _not_send: PhantomData<*const ()>,
}

// === impl ThreadRwLock ===

impl ThreadRwLock {
    /// Returns a new, unlocked `ThreadRwLock` keyed by the calling thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_identity()
    }
}

impl<S: CurrentIdentity> ThreadRwLock<S> {
    /// Returns a new, unlocked `ThreadRwLock` keyed by the identity provider
    /// `S`.
    #[must_use]
    pub fn with_identity() -> Self {
        Self {
            lock: RwLock::new(),
            _identity: PhantomData,
        }
    }

    /// Acquires a read lock, blocking until it is available.
    ///
    /// # Errors
    ///
    /// This never times out, but returns a `Result` for symmetry with
    /// [`read_timeout`](Self::read_timeout).
    pub fn read(&self) -> Result<ReadGuard<'_, S>, LockError> {
        self.read_timeout(Timeout::infinite())
    }

    /// Acquires a read lock, blocking until it is available or `timeout`
    /// expires.
    ///
    /// # Errors
    ///
    /// See [`RwLock::acquire_read`].
    pub fn read_timeout(
        &self,
        timeout: impl Into<Timeout>,
    ) -> Result<ReadGuard<'_, S>, LockError> {
        let id = S::current();
        self.lock.acquire_read(id.clone(), timeout.into())?;
        Ok(ReadGuard {
            lock: &self.lock,
            id,
            _not_send: PhantomData,
        })
    }

    /// Acquires the write lock, upgrading a read lock held by the caller if
    /// there is one, and blocking until it is available.
    ///
    /// # Errors
    ///
    /// - [`LockError::Deadlock`] if the caller holds a read lock and another
    ///   thread is already waiting to upgrade.
    pub fn write(&self) -> Result<WriteGuard<'_, S>, LockError> {
        self.write_timeout(Timeout::infinite())
    }

    /// Acquires the write lock, blocking until it is available or `timeout`
    /// expires.
    ///
    /// # Errors
    ///
    /// See [`RwLock::acquire_write`].
    pub fn write_timeout(
        &self,
        timeout: impl Into<Timeout>,
    ) -> Result<WriteGuard<'_, S>, LockError> {
        let id = S::current();
        self.lock.acquire_write(id.clone(), timeout.into())?;
        Ok(WriteGuard {
            lock: &self.lock,
            id,
            _not_send: PhantomData,
        })
    }

    /// Returns a snapshot of the lock's bookkeeping.
    #[must_use]
    pub fn state(&self) -> LockState {
        self.lock.state()
    }

    /// Returns the underlying identity-keyed lock.
    #[must_use]
    pub fn inner(&self) -> &RwLock<S::Id> {
        &self.lock
    }
}

impl Default for ThreadRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CurrentIdentity> fmt::Debug for ThreadRwLock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadRwLock").field(&self.lock).finish()
    }
}

// === impl ReadGuard ===

impl<S: CurrentIdentity> Drop for ReadGuard<'_, S> {
    fn drop(&mut self) {
        let released = self.lock.release_read(&self.id);
        debug_assert!(released.is_ok(), "read guard did not hold a read lock");
    }
}

impl<S: CurrentIdentity> fmt::Debug for ReadGuard<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard").field("id", &self.id).finish()
    }
}

// === impl WriteGuard ===

impl<S: CurrentIdentity> Drop for WriteGuard<'_, S> {
    fn drop(&mut self) {
        let released = self.lock.release_write(&self.id);
        debug_assert!(released.is_ok(), "write guard did not hold the write lock");
    }
}

impl<S: CurrentIdentity> fmt::Debug for WriteGuard<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard").field("id", &self.id).finish()
    }
}
