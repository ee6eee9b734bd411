//! Multithreaded behavior of the buffer pool.

#![cfg(not(miri))] // Blocking across threads is too slow under Miri.

use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use codec_buffer::{BufferPool, CodecBuffer, Error, GrowableBuffer};
use crossbeam::channel;
use testing::with_watchdog;

fn pool_of(capacity: usize) -> Arc<BufferPool> {
    Arc::new(
        BufferPool::builder(GrowableBuffer::new)
            .capacity(NonZero::new(capacity).unwrap())
            .build(),
    )
}

#[test]
fn acquire_beyond_capacity_blocks_until_release() {
    with_watchdog(|| {
        let pool = pool_of(2);

        let first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(pool.statistics().leased, 2);

        let (acquired_tx, acquired_rx) = channel::bounded(1);

        let waiter = thread::spawn({
            let pool = Arc::clone(&pool);
            move || {
                let lease = pool.acquire();
                acquired_tx.send(()).unwrap();
                drop(lease);
            }
        });

        // The third borrower must still be waiting.
        assert!(
            acquired_rx
                .recv_timeout(Duration::from_millis(100))
                .is_err()
        );

        drop(first);

        acquired_rx.recv().unwrap();
        waiter.join().unwrap();
        drop(second);

        assert_eq!(pool.statistics().leased, 0);
    });
}

#[test]
fn single_waiter_gets_value_while_pair_waiter_needs_two() {
    with_watchdog(|| {
        let pool = pool_of(2);

        let first = pool.acquire();
        let second = pool.acquire();

        let (pair_tx, pair_rx) = channel::bounded(1);
        let pair_waiter = thread::spawn({
            let pool = Arc::clone(&pool);
            move || {
                let (a, b) = pool.acquire_pair();
                pair_tx.send(()).unwrap();
                drop((a, b));
            }
        });

        // Give the pair waiter time to start waiting before the single waiter arrives.
        thread::sleep(Duration::from_millis(50));

        let (single_tx, single_rx) = channel::bounded(1);
        let single_waiter = thread::spawn({
            let pool = Arc::clone(&pool);
            move || {
                let lease = pool.acquire();
                single_tx.send(()).unwrap();
                drop(lease);
            }
        });

        thread::sleep(Duration::from_millis(50));

        // One slot is now idle. The pair waiter cannot use it, the single waiter must get it
        // even though the other lease stays out.
        drop(first);

        single_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        single_waiter.join().unwrap();

        assert!(pair_rx.try_recv().is_err());

        drop(second);

        pair_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pair_waiter.join().unwrap();

        assert_eq!(pool.statistics().available, 2);
    });
}

#[test]
fn acquire_timeout_succeeds_once_value_returns() {
    with_watchdog(|| {
        let pool = pool_of(1);
        let held = pool.acquire().detach();

        let releaser = thread::spawn({
            let pool = Arc::clone(&pool);
            move || {
                thread::sleep(Duration::from_millis(20));
                pool.release(held);
            }
        });

        let lease = pool.acquire_timeout(Duration::from_secs(5)).unwrap();
        drop(lease);

        releaser.join().unwrap();
    });
}

#[test]
fn leases_never_exceed_capacity() {
    with_watchdog(|| {
        const CAPACITY: usize = 3;
        const THREADS: usize = 8;
        const ROUNDS: usize = 200;

        let pool = pool_of(CAPACITY);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..THREADS)
            .map(|thread_index| {
                let pool = Arc::clone(&pool);
                let concurrent = Arc::clone(&concurrent);
                let peak = Arc::clone(&peak);

                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        pool.with(|buffer| {
                            let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);

                            // Every lease starts empty no matter who used the buffer before.
                            assert_eq!(buffer.size(), 0);
                            buffer.write_var_i64((thread_index * ROUNDS + round) as i64)?;

                            concurrent.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, Error>(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= CAPACITY);

        let stats = pool.statistics();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.available, CAPACITY);
        assert!(stats.constructed <= CAPACITY);
    });
}

#[test]
fn sentinel_never_reaches_next_borrower() {
    let pool = pool_of(1);

    for lease_index in 0..10_i32 {
        let mut lease = pool.acquire();

        assert_eq!(lease.size(), 0);
        assert_eq!(lease.position(), 0);
        assert!(lease.read_i32().is_err());

        lease.write_i32(lease_index).unwrap();
        lease.write_buffer(b"sentinel").unwrap();
    }
}

#[test]
fn pair_on_single_slot_pool_does_not_deadlock() {
    with_watchdog(|| {
        let pool = pool_of(1);

        let copied = pool.with_pair(|key, value| -> Result<Vec<u8>, Error> {
            key.write_var_i32(99)?;
            value.write_buffer(b"value bytes")?;
            value.flip();
            value.read_buffer(11)
        });

        assert_eq!(copied.unwrap(), b"value bytes");
        assert_eq!(pool.statistics().available, 1);
    });
}

#[test]
fn concurrent_pairs_do_not_deadlock() {
    with_watchdog(|| {
        let pool = pool_of(3);

        let workers: Vec<_> = (0..6)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        pool.with_pair(|a, b| {
                            a.write_i8(1).unwrap();
                            b.write_i8(2).unwrap();
                        });
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(pool.statistics().available, 3);
    });
}

#[test]
fn exhausted_pool_reports_distinct_error() {
    let pool = pool_of(1);
    let _held = pool.acquire();

    assert!(matches!(
        pool.try_acquire(),
        Err(Error::PoolExhausted { timeout: None })
    ));
}
