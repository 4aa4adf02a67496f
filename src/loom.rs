#[allow(unused_imports)]
pub(crate) use self::inner::*;

use self::sync::{Condvar, Mutex, MutexGuard};
use crate::timeout::Timeout;
use std::sync::PoisonError;

/// Locks `mutex`, ignoring poisoning.
///
/// The state protected by the mutexes in this crate is only ever mutated by
/// code that cannot panic partway through an update, so a poisoned mutex
/// still guards consistent state.
#[inline]
#[track_caller]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parks on `condvar` until notified, a spurious wakeup occurs, or `timeout`
/// expires.
///
/// Callers must re-check both their predicate and `timeout` after this
/// returns; the deadline is never restarted.
#[track_caller]
pub(crate) fn wait<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: &Timeout,
) -> MutexGuard<'a, T> {
    match timeout.remaining() {
        None => condvar.wait(guard).unwrap_or_else(PoisonError::into_inner),
        Some(remaining) => inner::wait_timeout(condvar, guard, remaining),
    }
}

#[cfg(loom)]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) use loom::model;

    pub(crate) mod sync {
        pub(crate) use loom::sync::{Arc, Condvar, Mutex, MutexGuard};
    }

    pub(crate) mod thread {
        pub(crate) use loom::thread::{current, spawn, yield_now, JoinHandle, ThreadId};
    }

    /// Loom does not model the passage of time, so a timed wait is a plain
    /// wait. Model tests only use infinite timeouts.
    pub(super) fn wait_timeout<'a, T>(
        condvar: &sync::Condvar,
        guard: sync::MutexGuard<'a, T>,
        _: core::time::Duration,
    ) -> sync::MutexGuard<'a, T> {
        condvar
            .wait(guard)
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) mod sync {
        pub(crate) use std::sync::{Arc, Condvar, Mutex, MutexGuard};
    }

    pub(crate) mod thread {
        pub(crate) use std::thread::{current, yield_now, JoinHandle, ThreadId};

        #[cfg(test)]
        pub(crate) fn spawn<F, T>(f: F) -> JoinHandle<T>
        where
            F: FnOnce() -> T + Send + 'static,
            T: Send + 'static,
        {
            use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
            static CHILDREN: AtomicUsize = AtomicUsize::new(1);

            let dispatch = tracing::dispatcher::get_default(|current| current.clone());
            let span = tracing::Span::current();
            let num = CHILDREN.fetch_add(1, Relaxed);
            std::thread::Builder::new()
                .name(format!("child-{num}"))
                .spawn(move || {
                    let _tracing = tracing::dispatcher::set_default(&dispatch);
                    let _span = tracing::info_span!(parent: span, "thread", num).entered();

                    test_info!(num, "spawned child thread");
                    let res = f();
                    test_info!(num, "child thread completed");
                    res
                })
                .expect("failed to spawn test thread")
        }
    }

    pub(super) fn wait_timeout<'a, T>(
        condvar: &sync::Condvar,
        guard: sync::MutexGuard<'a, T>,
        remaining: core::time::Duration,
    ) -> sync::MutexGuard<'a, T> {
        match condvar.wait_timeout(guard, remaining) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    #[cfg(test)]
    pub(crate) fn model(f: impl Fn()) {
        let _trace = crate::util::test::trace_init();
        let _span = tracing::info_span!(
            "test",
            message = std::thread::current().name().unwrap_or("<unnamed>")
        )
        .entered();
        test_info!("started test...");
        f();
        test_info!("test completed successfully!");
    }
}
