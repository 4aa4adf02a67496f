//! Deadlines for blocking operations.
//!
//! Every blocking operation in this crate takes a [`Timeout`]. A `Timeout` is
//! a countdown: it is created once, before the operation starts, and each
//! time the operation is woken it asks the `Timeout` how much time remains.
//! Spurious wakeups therefore never extend the total time spent waiting.
use core::{fmt, time::Duration};
use std::time::Instant;

/// How long a blocking operation may wait before giving up.
///
/// # Examples
///
/// ```
/// use keylock::Timeout;
/// use std::time::Duration;
///
/// // wait forever
/// let forever = Timeout::infinite();
/// assert!(forever.remaining().is_none());
///
/// // wait for at most 10 milliseconds from now
/// let short = Timeout::after(Duration::from_millis(10));
/// assert!(short.remaining().unwrap() <= Duration::from_millis(10));
///
/// // don't wait at all
/// assert!(Timeout::expired().is_expired());
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Timeout {
    deadline: Option<Instant>,
}

impl Timeout {
    /// A `Timeout` that never expires.
    #[must_use]
    pub const fn infinite() -> Self {
        Self { deadline: None }
    }

    /// A `Timeout` that expires `duration` from now.
    ///
    /// If the deadline cannot be represented as an [`Instant`], the returned
    /// `Timeout` never expires.
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(duration),
        }
    }

    /// A `Timeout` that expires at the absolute `deadline`.
    #[must_use]
    pub const fn at(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// A `Timeout` that has already expired.
    ///
    /// Passing this to a blocking operation turns it into a "try" operation:
    /// it succeeds only if it can do so without waiting.
    #[must_use]
    pub fn expired() -> Self {
        Self::at(Instant::now())
    }

    /// Returns the time left before this `Timeout` expires, or `None` if it
    /// never expires.
    ///
    /// Once the deadline has passed, this returns [`Duration::ZERO`].
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` if the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Returns `true` if this `Timeout` never expires.
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.deadline.is_none()
    }

    /// Returns the absolute deadline, if there is one.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::infinite()
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::after(duration)
    }
}

impl From<Instant> for Timeout {
    fn from(deadline: Instant) -> Self {
        Self::at(deadline)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or_else(Self::infinite, Self::after)
    }
}

impl fmt::Debug for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.remaining() {
            None => f.pad("Timeout(infinite)"),
            Some(remaining) => write!(f, "Timeout({remaining:?} remaining)"),
        }
    }
}
