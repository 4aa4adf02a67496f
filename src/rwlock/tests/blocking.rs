use super::*;
use crate::{
    loom::{sync::Arc, thread},
    util::test::trace_init,
};
use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
    time::Duration,
};

/// Spins until `f` returns `true`, panicking after a few seconds.
#[track_caller]
fn wait_for(mut f: impl FnMut() -> bool) {
    let timeout = Timeout::after(Duration::from_secs(5));
    while !f() {
        assert!(!timeout.is_expired(), "condition was never satisfied");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn writer_waits_for_writer() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_write(1, Timeout::infinite()).unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let t = thread::spawn({
        let lock = lock.clone();
        let acquired = acquired.clone();
        move || {
            lock.acquire_write(2, Timeout::infinite()).unwrap();
            acquired.store(true, SeqCst);
            lock.release_write(&2).unwrap();
        }
    });

    std::thread::sleep(Duration::from_millis(20));
    assert!(!acquired.load(SeqCst));
    lock.release_write(&1).unwrap();
    t.join().unwrap();
    assert!(acquired.load(SeqCst));
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn reader_waits_for_writer() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_write(1, Timeout::infinite()).unwrap();

    let readers = (2..5)
        .map(|id| {
            let lock = lock.clone();
            thread::spawn(move || {
                lock.acquire_read(id, Timeout::infinite()).unwrap();
                assert!(!lock.is_write_locked());
                lock.release_read(&id).unwrap();
            })
        })
        .collect::<Vec<_>>();

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(lock.state().holders, 1);
    lock.release_write(&1).unwrap();

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn upgrade_waits_for_other_readers() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_read(1, Timeout::infinite()).unwrap();
    lock.acquire_read(2, Timeout::infinite()).unwrap();

    let upgrader = thread::spawn({
        let lock = lock.clone();
        move || {
            lock.acquire_write(1, Timeout::infinite()).unwrap();
            assert_eq!(lock.held_by(&2), None);
            lock.release_write(&1).unwrap();
            lock.release_read(&1).unwrap();
        }
    });

    wait_for(|| lock.is_write_locked());
    // the pending upgrade shuts out new readers
    assert_eq!(
        lock.acquire_read(3, Timeout::expired()),
        Err(LockError::TimedOut {
            kind: LockKind::Read
        })
    );
    // but existing readers may still re-enter
    lock.acquire_read(2, Timeout::expired()).unwrap();
    lock.release_read(&2).unwrap();

    lock.release_read(&2).unwrap();
    upgrader.join().unwrap();
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn concurrent_upgrade_deadlocks() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_read('A', Timeout::infinite()).unwrap();
    lock.acquire_read('B', Timeout::infinite()).unwrap();

    let upgrader = thread::spawn({
        let lock = lock.clone();
        move || {
            lock.acquire_write('A', Timeout::infinite()).unwrap();
            lock.release_write(&'A').unwrap();
            lock.release_read(&'A').unwrap();
        }
    });

    wait_for(|| lock.is_write_locked());
    let before = lock.state();
    // returned without blocking, even with an infinite timeout
    assert_eq!(
        lock.acquire_write('B', Timeout::infinite()),
        Err(LockError::Deadlock)
    );
    assert_eq!(lock.state(), before);

    // releasing the read lock lets the other upgrade finish
    lock.release_read(&'B').unwrap();
    upgrader.join().unwrap();
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn upgrader_releases_read_from_another_context() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_read(1, Timeout::infinite()).unwrap();
    lock.acquire_read(2, Timeout::infinite()).unwrap();

    let upgrader = thread::spawn({
        let lock = lock.clone();
        move || {
            lock.acquire_write(1, Timeout::infinite()).unwrap();
            assert_eq!(lock.held_by(&2), None);
            assert_eq!(lock.held_by(&1), Some(HeldCounts { reads: 0, writes: 1 }));
            lock.release_write(&1).unwrap();
        }
    });
    wait_for(|| lock.is_write_locked());

    // identity 1 lets go of its read lock while its upgrade is still waiting
    // for identity 2. that must not count as identity 2 leaving.
    lock.release_read(&1).unwrap();
    assert_eq!(
        lock.state(),
        LockState {
            readers: 1,
            writers: 1,
            can_read: false,
            holders: 2,
        }
    );
    assert_eq!(
        lock.release_read(&1),
        Err(LockError::NotHeld {
            kind: LockKind::Read
        })
    );

    lock.release_read(&2).unwrap();
    upgrader.join().unwrap();
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn upgrade_timeout_after_read_released_elsewhere() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_read(1, Timeout::infinite()).unwrap();
    lock.acquire_read(2, Timeout::infinite()).unwrap();

    let upgrader = thread::spawn({
        let lock = lock.clone();
        move || lock.acquire_write(1, Timeout::after(Duration::from_millis(100)))
    });
    wait_for(|| lock.is_write_locked());
    lock.release_read(&1).unwrap();

    assert_eq!(
        upgrader.join().unwrap(),
        Err(LockError::TimedOut {
            kind: LockKind::Write
        })
    );
    // identity 1 released everything while waiting, so the rollback leaves it
    // holding nothing, and identity 2 is the only reader.
    assert_eq!(lock.held_by(&1), None);
    assert_eq!(
        lock.state(),
        LockState {
            readers: 1,
            writers: 0,
            can_read: true,
            holders: 1,
        }
    );

    lock.release_read(&2).unwrap();
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn upgrade_timeout_wakes_blocked_readers() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_read(1, Timeout::infinite()).unwrap();
    lock.acquire_read(2, Timeout::infinite()).unwrap();

    let upgrader = thread::spawn({
        let lock = lock.clone();
        move || lock.acquire_write(1, Timeout::after(Duration::from_millis(100)))
    });
    wait_for(|| lock.is_write_locked());

    // this reader parks behind the pending upgrade; the rollback must wake it
    let reader = thread::spawn({
        let lock = lock.clone();
        move || {
            lock.acquire_read(3, Timeout::infinite()).unwrap();
            lock.release_read(&3).unwrap();
        }
    });

    assert_eq!(
        upgrader.join().unwrap(),
        Err(LockError::TimedOut {
            kind: LockKind::Write
        })
    );
    reader.join().unwrap();

    lock.release_read(&1).unwrap();
    lock.release_read(&2).unwrap();
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn timed_out_writer_does_not_strand_others() {
    let _trace = trace_init();
    let lock = Arc::new(RwLock::new());
    lock.acquire_read(0, Timeout::infinite()).unwrap();

    let impatient = thread::spawn({
        let lock = lock.clone();
        move || lock.acquire_write(1, Timeout::after(Duration::from_millis(20)))
    });
    let patient = thread::spawn({
        let lock = lock.clone();
        move || {
            lock.acquire_write(2, Timeout::infinite()).unwrap();
            lock.release_write(&2).unwrap();
        }
    });

    assert!(impatient.join().unwrap().is_err());
    lock.release_read(&0).unwrap();
    patient.join().unwrap();
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn writers_exclude_everyone() {
    const THREADS: usize = 8;
    const ITERS: usize = 200;

    let _trace = trace_init();
    let lock = Arc::new(ThreadRwLock::new());
    let readers = Arc::new(AtomicUsize::new(0));
    let writers = Arc::new(AtomicUsize::new(0));

    let threads = (0..THREADS)
        .map(|n| {
            let lock = lock.clone();
            let readers = readers.clone();
            let writers = writers.clone();
            thread::spawn(move || {
                for i in 0..ITERS {
                    if (n + i) % 3 == 0 {
                        let _write = lock.write().unwrap();
                        assert_eq!(writers.fetch_add(1, SeqCst), 0);
                        assert_eq!(readers.load(SeqCst), 0);
                        writers.fetch_sub(1, SeqCst);
                    } else {
                        let _read = lock.read().unwrap();
                        readers.fetch_add(1, SeqCst);
                        assert_eq!(writers.load(SeqCst), 0);
                        readers.fetch_sub(1, SeqCst);
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(lock.state(), EMPTY);
}

#[test]
fn guard_write_times_out_on_other_thread() {
    let _trace = trace_init();
    let lock = Arc::new(ThreadRwLock::new());
    let read = lock.read().unwrap();

    let other = thread::spawn({
        let lock = lock.clone();
        move || {
            let _read = lock.read().unwrap();
            matches!(
                lock.write_timeout(Duration::from_millis(10)),
                Err(LockError::TimedOut { .. })
            )
        }
    });
    assert!(other.join().unwrap());

    drop(read);
    assert_eq!(lock.state(), EMPTY);
}
