//! A bounded, blocking, multi-producer multi-consumer FIFO queue.
//!
//! See the documentation for the [`BlockingQueue`] type for details.
use crate::{
    error::{Closed, PopError},
    loom::{
        self,
        sync::{Condvar, Mutex},
    },
    timeout::Timeout,
};
use core::{fmt, num::NonZeroUsize};
use std::collections::VecDeque;


/// A first-in, first-out queue with blocking [`push_back`] and [`pop_front`]
/// operations.
///
/// The queue may be bounded by a maximum size (see
/// [`with_max_queue_size`]). When it is full, [`push_back`] blocks until a
/// value is popped. When it is empty, [`pop_front`] blocks until a value is
/// pushed, the queue is shut down, or its timeout expires.
///
/// # Shutdown
///
/// Calling [`shutdown`] permanently closes the queue. Every thread blocked in
/// [`pop_front`] on an empty queue returns [`PopError::ShutDown`], and every
/// thread blocked in [`push_back`] returns its value in a [`Closed`] error.
/// Values that were already enqueued may still be popped; once they are
/// drained, [`pop_front`] fails immediately.
///
/// # Wakeups
///
/// Pushers and poppers share a single condition variable. The queue counts
/// the threads blocked on each side, so a push only wakes a thread when a
/// popper is waiting, and a pop only wakes one when a pusher is waiting.
///
/// # Examples
///
/// ```
/// use keylock::{BlockingQueue, PopError, Timeout};
/// use std::{num::NonZeroUsize, time::Duration};
///
/// let queue = BlockingQueue::with_max_queue_size(NonZeroUsize::new(1).unwrap());
///
/// queue.push_back(5).unwrap();
/// assert_eq!(queue.pop_front(Timeout::infinite()), Ok(5));
/// assert_eq!(
///     queue.pop_front(Duration::from_millis(10)),
///     Err(PopError::TimedOut),
/// );
///
/// queue.shutdown();
/// assert!(queue.push_back(6).is_err());
/// assert_eq!(queue.pop_front(Timeout::infinite()), Err(PopError::ShutDown));
/// ```
///
/// [`push_back`]: BlockingQueue::push_back
/// [`pop_front`]: BlockingQueue::pop_front
/// [`shutdown`]: BlockingQueue::shutdown
/// [`with_max_queue_size`]: BlockingQueue::with_max_queue_size
pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
    max_size: usize,
}

struct State<T> {
    items: VecDeque<T>,
    shut_down: bool,
    blocked_pushers: usize,
    blocked_poppers: usize,
}

impl<T> BlockingQueue<T> {
    /// Returns a new, empty queue with no maximum size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_bound(usize::MAX)
    }

    /// Returns a new, empty queue that holds at most `max_size` values.
    #[must_use]
    pub fn with_max_queue_size(max_size: NonZeroUsize) -> Self {
        Self::with_bound(max_size.get())
    }

    fn with_bound(max_size: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                shut_down: false,
                blocked_pushers: 0,
                blocked_poppers: 0,
            }),
            changed: Condvar::new(),
            max_size,
        }
    }

    /// Sets the maximum number of values the queue may hold.
    ///
    /// This takes `&mut self`, so it can only be called while no other thread
    /// is using the queue. Values already in the queue are kept, even if
    /// there are more than `max_size` of them; pushes block until the queue
    /// drains below the new bound.
    pub fn set_max_queue_size(&mut self, max_size: NonZeroUsize) {
        self.max_size = max_size.get();
    }

    /// Returns the maximum number of values the queue may hold.
    ///
    /// An unbounded queue returns [`usize::MAX`].
    #[must_use]
    pub fn max_queue_size(&self) -> usize {
        self.max_size
    }

    /// Appends `value` to the back of the queue, blocking while the queue is
    /// full.
    ///
    /// If a thread is blocked in [`pop_front`](Self::pop_front), one is
    /// woken.
    ///
    /// # Errors
    ///
    /// If the queue has been shut down (including while this call was
    /// blocked), `value` is not enqueued and is returned in a [`Closed`]
    /// error.
    pub fn push_back(&self, value: T) -> Result<(), Closed<T>> {
        let mut state = loom::lock(&self.state);

        while !state.shut_down && test_dbg!(state.items.len()) >= self.max_size {
            state.blocked_pushers += 1;
            trace!(
                blocked_pushers = state.blocked_pushers,
                "BlockingQueue::push_back: full, waiting..."
            );
            state = loom::wait(&self.changed, state, &Timeout::infinite());
            state.blocked_pushers -= 1;
        }

        if state.shut_down {
            trace!("BlockingQueue::push_back: shut down");
            return Err(Closed(value));
        }

        state.items.push_back(value);
        trace!(len = state.items.len(), "BlockingQueue::push_back");
        if state.blocked_poppers > 0 {
            self.wake_one(state.blocked_pushers > 0);
        }
        Ok(())
    }

    /// Removes the value at the front of the queue, blocking while the queue
    /// is empty until a value is pushed, the queue is shut down, or `timeout`
    /// expires.
    ///
    /// If a thread is blocked in [`push_back`](Self::push_back), one is
    /// woken.
    ///
    /// # Errors
    ///
    /// - [`PopError::ShutDown`] if the queue is empty and has been shut down.
    /// - [`PopError::TimedOut`] if the queue was still empty when `timeout`
    ///   expired.
    pub fn pop_front(&self, timeout: impl Into<Timeout>) -> Result<T, PopError> {
        let timeout = timeout.into();
        let mut state = loom::lock(&self.state);

        loop {
            if let Some(value) = state.items.pop_front() {
                trace!(len = state.items.len(), "BlockingQueue::pop_front");
                if state.blocked_pushers > 0 {
                    self.wake_one(state.blocked_poppers > 0);
                }
                return Ok(value);
            }

            if state.shut_down {
                trace!("BlockingQueue::pop_front: shut down");
                return Err(PopError::ShutDown);
            }

            if timeout.is_expired() {
                trace!(?timeout, "BlockingQueue::pop_front: timed out");
                return Err(PopError::TimedOut);
            }

            state.blocked_poppers += 1;
            trace!(
                blocked_poppers = state.blocked_poppers,
                "BlockingQueue::pop_front: empty, waiting..."
            );
            state = loom::wait(&self.changed, state, &timeout);
            state.blocked_poppers -= 1;
        }
    }

    /// Removes the value at the front of the queue without blocking.
    ///
    /// # Errors
    ///
    /// - [`PopError::ShutDown`] if the queue is empty and has been shut down.
    /// - [`PopError::TimedOut`] if the queue is empty.
    pub fn try_pop_front(&self) -> Result<T, PopError> {
        self.pop_front(Timeout::expired())
    }

    /// Shuts down the queue, waking every blocked thread.
    ///
    /// Shutting down a queue that is already shut down does nothing.
    pub fn shutdown(&self) {
        let mut state = loom::lock(&self.state);
        if state.shut_down {
            return;
        }

        state.shut_down = true;
        debug!(
            len = state.items.len(),
            blocked_pushers = state.blocked_pushers,
            blocked_poppers = state.blocked_poppers,
            "BlockingQueue::shutdown",
        );
        if state.blocked_pushers > 0 || state.blocked_poppers > 0 {
            self.changed.notify_all();
        }
    }

    /// Returns `true` if [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        loom::lock(&self.state).shut_down
    }

    /// Returns the number of values in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        loom::lock(&self.state).items.len()
    }

    /// Returns `true` if the queue holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        loom::lock(&self.state).items.is_empty()
    }

    /// Returns the number of threads blocked in `push_back` and `pop_front`.
    #[cfg(test)]
    pub(crate) fn blocked(&self) -> (usize, usize) {
        let state = loom::lock(&self.state);
        (state.blocked_pushers, state.blocked_poppers)
    }

    /// Wakes one waiter on the side that can now make progress.
    ///
    /// Both sides park on the same condition variable, so if threads are
    /// blocked on the other side as well, a single notification could land on
    /// a thread that cannot proceed. In that case, everyone is woken.
    fn wake_one(&self, both_sides_blocked: bool) {
        if both_sides_blocked {
            self.changed.notify_all();
        } else {
            self.changed.notify_one();
        }
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = loom::lock(&self.state);
        f.debug_struct("BlockingQueue")
            .field("len", &state.items.len())
            .field("max_size", &self.max_size)
            .field("shut_down", &state.shut_down)
            .field("blocked_pushers", &state.blocked_pushers)
            .field("blocked_poppers", &state.blocked_poppers)
            .finish()
    }
}
