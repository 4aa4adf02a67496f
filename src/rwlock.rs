//! An identity-keyed, upgradable [readers-writer lock].
//!
//! See the documentation for the [`RwLock`] type for details.
//!
//! [readers-writer lock]: https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock
use crate::{
    error::{LockError, LockKind},
    identity::Identity,
    loom::{
        self,
        sync::{Condvar, Mutex},
    },
    timeout::Timeout,
};
use core::fmt;
use std::collections::HashMap;

mod guard;
pub use self::guard::*;


/// A recursive [readers-writer lock] whose holders are named by an
/// [`Identity`], supporting read-to-write upgrades.
///
/// Unlike [`std::sync::RwLock`], this lock does not protect a value and does
/// not hand out guards. Every operation names the identity acting on the lock
/// instead, and the lock keeps a registry of how many read and write locks
/// each identity holds. This allows a lock to be held by something other than
/// a single thread (such as a transaction that hops between threads), and it
/// allows the lock to recognize its own holders:
///
/// - **Re-entrancy**: an identity that holds the lock may acquire it again,
///   and must release it once per acquisition.
/// - **Upgrades**: an identity that holds a read lock may call
///   [`acquire_write`] without releasing it. If it is the only reader, the
///   upgrade completes immediately; otherwise it waits for every other reader
///   to leave, and blocks new readers while it waits.
/// - **Deadlock detection**: only one upgrade may be in progress at a time. If
///   a second reader tries to upgrade while another is waiting, it receives
///   [`LockError::Deadlock`] rather than waiting forever for a reader (itself)
///   that will never leave.
///
/// For a lock keyed by the calling thread that releases through RAII guards,
/// see [`ThreadRwLock`].
///
/// # Fairness
///
/// This lock is not fair. A steady stream of new readers can keep a writer
/// that does not already hold a read lock waiting indefinitely. A waiting
/// *upgrade* does block new readers.
///
/// # Examples
///
/// ```
/// use keylock::{LockError, RwLock, Timeout};
///
/// let lock = RwLock::new();
///
/// // two transactions read concurrently
/// lock.acquire_read(1, Timeout::infinite()).unwrap();
/// lock.acquire_read(2, Timeout::infinite()).unwrap();
///
/// // a third cannot write while they read
/// assert_eq!(
///     lock.acquire_write(3, Timeout::expired()),
///     Err(LockError::TimedOut { kind: keylock::LockKind::Write }),
/// );
///
/// lock.release_read(&1).unwrap();
/// // transaction 2 is now the only reader, so it upgrades without waiting
/// lock.acquire_write(2, Timeout::infinite()).unwrap();
///
/// lock.release_write(&2).unwrap();
/// lock.release_read(&2).unwrap();
/// assert!(!lock.is_locked());
/// ```
///
/// [readers-writer lock]: https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock
/// [`acquire_write`]: RwLock::acquire_write
pub struct RwLock<Id> {
    state: Mutex<State<Id>>,
    /// Identities waiting to acquire, or upgrade to, the write lock.
    writers: Condvar,
    /// Identities waiting to acquire a read lock.
    readers: Condvar,
}

/// The number of nested read and write locks a single identity holds on a
/// [`RwLock`].
///
/// Returned by [`RwLock::held_by`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct HeldCounts {
    /// Nested read locks held.
    pub reads: usize,
    /// Nested write locks held.
    pub writes: usize,
}

/// A snapshot of a [`RwLock`]'s bookkeeping.
///
/// Returned by [`RwLock::state`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LockState {
    /// The number of distinct identities in the reader pool.
    ///
    /// An identity that holds the write lock, or is waiting to upgrade to it,
    /// is not counted here even if it also holds read locks.
    pub readers: usize,
    /// `1` if an identity holds the write lock or is waiting to upgrade to
    /// it, `0` otherwise.
    pub writers: usize,
    /// Whether new readers may currently acquire the lock.
    pub can_read: bool,
    /// The number of identities holding any lock.
    pub holders: usize,
}

struct State<Id> {
    holders: HashMap<Id, HeldCounts>,
    readers: usize,
    writers: usize,
    can_read: bool,
    /// The identity waiting to upgrade its read lock, if any.
    ///
    /// It has already left the reader pool, so releasing its read locks must
    /// not touch `readers`.
    upgrading: Option<Id>,
}

// === impl RwLock ===

impl<Id: Identity> RwLock<Id> {
    /// Returns a new, unlocked `RwLock`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                holders: HashMap::new(),
                readers: 0,
                writers: 0,
                can_read: true,
                upgrading: None,
            }),
            writers: Condvar::new(),
            readers: Condvar::new(),
        }
    }

    /// Acquires a read lock for `id`, blocking until one is available or
    /// `timeout` expires.
    ///
    /// If `id` already holds a read or write lock, this increments its read
    /// count and returns immediately. Otherwise, it waits until no identity
    /// holds the write lock or is waiting to upgrade to it.
    ///
    /// # Errors
    ///
    /// - [`LockError::TimedOut`] if `timeout` expired before the lock was
    ///   acquired. The lock is unchanged.
    pub fn acquire_read(&self, id: Id, timeout: Timeout) -> Result<(), LockError> {
        let mut state = loom::lock(&self.state);

        if let Some(held) = state.holders.get_mut(&id) {
            held.reads += 1;
            trace!(?id, reads = held.reads, "RwLock::acquire_read: re-entered");
            return Ok(());
        }

        while !test_dbg!(state.can_read && state.writers == 0) {
            if timeout.is_expired() {
                debug!(?id, ?timeout, "RwLock::acquire_read: timed out");
                return Err(LockError::TimedOut {
                    kind: LockKind::Read,
                });
            }
            trace!(?id, "RwLock::acquire_read: waiting...");
            state = loom::wait(&self.readers, state, &timeout);
        }

        state.readers += 1;
        trace!(?id, readers = state.readers, "RwLock::acquire_read: locked");
        state.holders.insert(
            id,
            HeldCounts {
                reads: 1,
                writes: 0,
            },
        );
        Ok(())
    }

    /// Releases one read lock held by `id`.
    ///
    /// When this releases the last lock of the last reader, every identity
    /// waiting for the write lock is woken.
    ///
    /// # Errors
    ///
    /// - [`LockError::NotHeld`] if `id` does not hold a read lock.
    pub fn release_read(&self, id: &Id) -> Result<(), LockError> {
        let mut state = loom::lock(&self.state);

        let held = match state.holders.get_mut(id) {
            Some(held) if held.reads > 0 => held,
            _ => {
                debug!(?id, "RwLock::release_read: not held");
                return Err(LockError::NotHeld {
                    kind: LockKind::Read,
                });
            }
        };
        held.reads -= 1;
        trace!(?id, reads = held.reads, "RwLock::release_read");
        if held.reads > 0 || held.writes > 0 {
            return Ok(());
        }

        if state.upgrading.as_ref() == Some(id) {
            // another context of this identity is upgrading; the entry stays
            // until the upgrade completes or rolls back.
            trace!(?id, "RwLock::release_read: upgrade pending");
            return Ok(());
        }

        state.holders.remove(id);
        state.readers -= 1;
        if test_dbg!(state.readers) == 0 {
            // both plain writers and an upgrading reader park on `writers`,
            // and only the upgrader may be able to proceed.
            self.writers.notify_all();
        }
        Ok(())
    }

    /// Acquires the write lock for `id`, blocking until it is available or
    /// `timeout` expires.
    ///
    /// - If `id` already holds the write lock, this increments its write count
    ///   and returns immediately.
    /// - If `id` holds no lock, this waits until no identity holds any lock.
    /// - If `id` holds a read lock, this *upgrades* it: new readers are
    ///   blocked, and the call waits until every other reader has released.
    ///   If `id` is the only reader, the upgrade completes without waiting.
    ///   The read locks `id` held are kept, and become read locks again when
    ///   the write lock is released.
    ///
    /// # Errors
    ///
    /// - [`LockError::Deadlock`] if `id` holds a read lock and another
    ///   identity is already waiting to upgrade. `id` must release its read
    ///   lock for the other upgrade to finish. Returned without blocking.
    /// - [`LockError::TimedOut`] if `timeout` expired before the lock was
    ///   acquired. Any partial upgrade is rolled back, and the lock is left
    ///   as it was before the call.
    pub fn acquire_write(&self, id: Id, timeout: Timeout) -> Result<(), LockError> {
        let mut state = loom::lock(&self.state);

        match state.holders.get_mut(&id) {
            Some(held) if held.writes > 0 => {
                held.writes += 1;
                trace!(?id, writes = held.writes, "RwLock::acquire_write: re-entered");
                return Ok(());
            }
            Some(_) => {
                if test_dbg!(state.writers) > 0 {
                    debug!(?id, "RwLock::acquire_write: another upgrade is in progress");
                    return Err(LockError::Deadlock);
                }

                // claim the upgrade slot and leave the reader pool.
                state.readers -= 1;
                state.writers = 1;
                state.can_read = false;
                state.upgrading = Some(id.clone());

                while test_dbg!(state.readers) > 0 {
                    if timeout.is_expired() {
                        debug!(?id, ?timeout, "RwLock::acquire_write: upgrade timed out");
                        state.upgrading = None;
                        state.writers = 0;
                        state.can_read = true;
                        let still_reading =
                            state.holders.get(&id).is_some_and(|held| held.reads > 0);
                        if still_reading {
                            state.readers += 1;
                        } else {
                            // every read lock was released while the upgrade
                            // was pending, so the identity holds nothing.
                            state.holders.remove(&id);
                            if state.readers == 0 {
                                self.writers.notify_all();
                            }
                        }
                        // readers that arrived while the upgrade was pending
                        // are parked on `can_read`.
                        self.readers.notify_all();
                        return Err(LockError::TimedOut {
                            kind: LockKind::Write,
                        });
                    }
                    trace!(?id, readers = state.readers, "RwLock::acquire_write: upgrading...");
                    state = loom::wait(&self.writers, state, &timeout);
                }
                state.upgrading = None;
                trace!(?id, "RwLock::acquire_write: upgraded");
            }
            None => {
                while !test_dbg!(state.readers == 0 && state.writers == 0) {
                    if timeout.is_expired() {
                        debug!(?id, ?timeout, "RwLock::acquire_write: timed out");
                        return Err(LockError::TimedOut {
                            kind: LockKind::Write,
                        });
                    }
                    trace!(?id, "RwLock::acquire_write: waiting...");
                    state = loom::wait(&self.writers, state, &timeout);
                }

                state.writers = 1;
                state.can_read = false;
                trace!(?id, "RwLock::acquire_write: locked");
            }
        }

        state.holders.entry(id).or_default().writes += 1;
        Ok(())
    }

    /// Releases one write lock held by `id`.
    ///
    /// When this releases `id`'s last write lock, new readers are admitted
    /// again. If `id` still holds read locks (because it upgraded, or took
    /// read locks while writing), it goes back to being an ordinary reader.
    /// Otherwise, one waiting writer is woken.
    ///
    /// # Errors
    ///
    /// - [`LockError::NotHeld`] if `id` does not hold the write lock.
    pub fn release_write(&self, id: &Id) -> Result<(), LockError> {
        let mut state = loom::lock(&self.state);

        let held = match state.holders.get_mut(id) {
            Some(held) if held.writes > 0 => held,
            _ => {
                debug!(?id, "RwLock::release_write: not held");
                return Err(LockError::NotHeld {
                    kind: LockKind::Write,
                });
            }
        };
        held.writes -= 1;
        trace!(?id, writes = held.writes, "RwLock::release_write");
        if held.writes > 0 {
            return Ok(());
        }

        let still_reading = held.reads > 0;
        debug_assert_eq!(state.writers, 1, "write lock released with no writer counted");
        state.writers = 0;
        state.can_read = true;

        if still_reading {
            state.readers += 1;
            trace!(?id, readers = state.readers, "RwLock::release_write: downgraded");
        } else {
            state.holders.remove(id);
            self.writers.notify_one();
        }

        self.readers.notify_all();
        Ok(())
    }

    /// Returns how many read and write locks `id` currently holds, or `None`
    /// if it holds none.
    #[must_use]
    pub fn held_by(&self, id: &Id) -> Option<HeldCounts> {
        loom::lock(&self.state).holders.get(id).copied()
    }

    /// Returns a snapshot of the lock's bookkeeping.
    ///
    /// The snapshot may be stale as soon as it is returned; it is intended for
    /// diagnostics and tests.
    #[must_use]
    pub fn state(&self) -> LockState {
        let state = loom::lock(&self.state);
        LockState {
            readers: state.readers,
            writers: state.writers,
            can_read: state.can_read,
            holders: state.holders.len(),
        }
    }

    /// Returns `true` if any identity holds any lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        !loom::lock(&self.state).holders.is_empty()
    }

    /// Returns `true` if an identity holds the write lock or is waiting to
    /// upgrade to it.
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        loom::lock(&self.state).writers > 0
    }
}

impl<Id: Identity> Default for RwLock<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Identity> fmt::Debug for RwLock<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = loom::lock(&self.state);
        f.debug_struct("RwLock")
            .field("readers", &state.readers)
            .field("writers", &state.writers)
            .field("can_read", &state.can_read)
            .field("upgrading", &state.upgrading)
            .field("holders", &state.holders)
            .finish()
    }
}
