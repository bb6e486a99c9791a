use std::thread::{Scope, ScopedJoinHandle};

use crossbeam::channel::{Receiver, Sender, bounded};
use tracing::debug;

use crate::{archive::ArchiveId, error::Result, index_db::IndexDb};

/// Totals reported by a finished writer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    /// Pairs received from the parse workers.
    pub pairs: u64,
    /// Pairs that were new to the index.
    pub inserted: u64,
    /// Committed write transactions.
    pub batches: u64,
}

/// Start the single writer of an ingestion cycle inside `scope`.
///
/// Parse workers send (path, package) pairs through the returned sender.
/// The writer coalesces whatever is queued, up to `batch_size` pairs, into
/// one write transaction. Once every sender is dropped it commits the
/// remainder and returns; a successful join therefore means every pair is
/// durably stored. A storage error stops the writer, which closes the
/// channel and makes further sends fail.
pub fn spawn<'scope, 'env>(
    scope: &'scope Scope<'scope, 'env>,
    db: &'env IndexDb,
    archive: &'env ArchiveId,
    batch_size: usize,
) -> (
    Sender<(String, String)>,
    ScopedJoinHandle<'scope, Result<WriteStats>>,
) {
    let batch_size = batch_size.max(1);
    let (tx, rx) = bounded(batch_size.saturating_mul(2));
    let handle = scope.spawn(move || write_loop(db, archive, &rx, batch_size));
    (tx, handle)
}

fn write_loop(
    db: &IndexDb,
    archive: &ArchiveId,
    rx: &Receiver<(String, String)>,
    batch_size: usize,
) -> Result<WriteStats> {
    let mut stats = WriteStats::default();
    let mut pending = Vec::with_capacity(batch_size);

    while let Ok(pair) = rx.recv() {
        pending.push(pair);
        while pending.len() < batch_size {
            match rx.try_recv() {
                Ok(pair) => pending.push(pair),
                Err(_) => break,
            }
        }

        let inserted = db.insert_batch(archive, &pending)?;
        stats.pairs += pending.len() as u64;
        stats.inserted += inserted;
        stats.batches += 1;
        debug!(
            archive = %archive,
            pairs = pending.len(),
            inserted,
            "committed batch"
        );
        pending.clear();
    }

    Ok(stats)
}
