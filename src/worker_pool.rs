use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use crossbeam::channel::{Sender, bounded};

use crate::error::{Error, Result};

/// Size of a worker pool: how many threads consume the queue and how many
/// items may wait in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub workers: usize,
    pub queue_capacity: usize,
}

/// Producer handle of a running pool.
pub struct Feeder<'a, T> {
    tx: Sender<T>,
    abort: &'a AtomicBool,
}

impl<T> Feeder<'_, T> {
    /// Queue an item, blocking while the queue is full.
    ///
    /// Returns `false` once the pool has aborted; the producer should stop.
    pub fn push(&self, item: T) -> bool {
        if self.abort.load(Ordering::Relaxed) {
            return false;
        }
        self.tx.send(item).is_ok()
    }
}

/// Run `produce` on the calling thread, feeding a bounded queue drained by
/// `limits.workers` threads that apply `work` to each item.
///
/// Returns once the producer is done and every worker has drained the
/// queue. The first failing `work` call aborts the pool: remaining workers
/// stop picking up items, the producer's next `push` returns `false`, and
/// that error is returned. Otherwise the number of processed items is
/// returned.
pub fn run<T, P, W>(limits: PoolLimits, produce: P, work: W) -> Result<u64>
where
    T: Send,
    P: FnOnce(&Feeder<'_, T>) -> Result<()>,
    W: Fn(T) -> Result<()> + Sync,
{
    let (tx, rx) = bounded::<T>(limits.queue_capacity.max(1));
    let abort = AtomicBool::new(false);
    let processed = AtomicU64::new(0);
    let first_error: Mutex<Option<Error>> = Mutex::new(None);

    thread::scope(|s| {
        let work = &work;
        let abort_flag = &abort;
        let processed_count = &processed;
        let first_error_slot = &first_error;

        let handles: Vec<_> = (0..limits.workers.max(1))
            .map(|_| {
                let rx = rx.clone();
                s.spawn(move || {
                    for item in rx.iter() {
                        if abort_flag.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = work(item) {
                            if let Ok(mut slot) = first_error_slot.lock() {
                                slot.get_or_insert(e);
                            }
                            abort_flag.store(true, Ordering::Relaxed);
                            break;
                        }
                        processed_count.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        drop(rx);

        let feeder = Feeder {
            tx,
            abort: abort_flag,
        };
        let produced = produce(&feeder);
        // Closing the queue is the drain barrier: workers exit once it is
        // empty.
        drop(feeder);

        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }

        let worker_error = first_error
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(e) = worker_error {
            return Err(e);
        }
        produced?;
        if panicked {
            return Err(Error::WorkerPanic);
        }
        Ok(processed.load(Ordering::Relaxed))
    })
}
