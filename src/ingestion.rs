use std::{
    io::{BufRead, BufReader},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use flate2::read::MultiGzDecoder;
use tracing::{info, warn};

use crate::{
    archive::ArchiveId,
    batch_writer::{self, WriteStats},
    config::IngestConfig,
    contents,
    error::{Error, Result},
    fetch::{DocumentSource, Fetched},
    index_db::IndexDb,
    worker_pool::{self, Feeder},
};

/// Read-ahead buffer between decompression and line splitting.
const READ_BUFFER_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server reported no change since the stored marker.
    Unchanged,
    /// The document had no `FILE ... LOCATION` header; nothing was written
    /// and the marker was left alone.
    MissingHeader,
    Ingested {
        /// Data lines parsed.
        lines: u64,
        /// (path, package) pairs that were new to the index.
        inserted: u64,
    },
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub archive: ArchiveId,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

/// Runs refresh cycles: conditional fetch, decompression, parallel parse,
/// batched writes and, last, the freshness marker commit.
pub struct Ingestor {
    db: Arc<IndexDb>,
    source: Arc<dyn DocumentSource>,
    settings: IngestConfig,
}

impl Ingestor {
    pub fn new(
        db: Arc<IndexDb>,
        source: Arc<dyn DocumentSource>,
        settings: IngestConfig,
    ) -> Self {
        Self {
            db,
            source,
            settings,
        }
    }

    pub fn db(&self) -> &Arc<IndexDb> {
        &self.db
    }

    /// Refresh the archive published at `uri`.
    ///
    /// Any error leaves the stored marker untouched, so the next cycle
    /// fetches again and re-applies the whole document. Re-applying is
    /// harmless since index writes are set inserts.
    pub fn refresh(&self, uri: &str) -> Result<IngestReport> {
        let started = Instant::now();
        let archive = ArchiveId::from_uri(uri)?;
        let since = self
            .db
            .refresh_marker(&archive)?
            .filter(|marker| !marker.is_empty());

        let document = match self.source.fetch(uri, since.as_deref())? {
            Fetched::Unchanged => {
                info!(archive = %archive, "document unchanged");
                return Ok(report(archive, Outcome::Unchanged, started));
            }
            Fetched::Modified(document) => document,
        };

        self.db.ensure_archive(&archive)?;

        let mut reader = BufReader::with_capacity(
            READ_BUFFER_BYTES,
            MultiGzDecoder::new(document.body),
        );
        let Some(preamble_lines) = contents::skip_preamble(&mut reader)?
        else {
            warn!(archive = %archive, uri, "document has no header line");
            return Ok(report(archive, Outcome::MissingHeader, started));
        };

        let (lines, stats) =
            self.ingest_lines(&archive, reader, preamble_lines)?;

        self.db.set_refresh_marker(
            &archive,
            document.marker.as_deref().unwrap_or_default(),
        )?;

        let report = report(
            archive,
            Outcome::Ingested {
                lines,
                inserted: stats.inserted,
            },
            started,
        );
        info!(
            archive = %report.archive,
            lines,
            inserted = stats.inserted,
            batches = stats.batches,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingested document"
        );
        Ok(report)
    }

    /// Parse every remaining line on a worker pool and hand the pairs to a
    /// single batching writer. Returns once every pair is committed.
    fn ingest_lines<R: BufRead>(
        &self,
        archive: &ArchiveId,
        mut reader: R,
        preamble_lines: u64,
    ) -> Result<(u64, WriteStats)> {
        let db = self.db.as_ref();

        thread::scope(|s| {
            let (tx, writer) =
                batch_writer::spawn(s, db, archive, self.settings.batch_size);

            let parsed = worker_pool::run(
                self.settings.limits(),
                |feeder| read_lines(&mut reader, preamble_lines, feeder),
                |(line_no, line): (u64, String)| {
                    let entry = contents::parse_line(&line, line_no)?;
                    tx.send((entry.path, entry.package))
                        .map_err(|_| Error::WriterClosed)
                },
            );
            drop(tx);

            // A storage failure closes the writer's channel, which surfaces
            // in the workers as WriterClosed; report the cause instead.
            let stats = writer.join().map_err(|_| Error::WorkerPanic)??;
            let lines = parsed?;
            Ok((lines, stats))
        })
    }
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn report(
    archive: ArchiveId,
    outcome: Outcome,
    started: Instant,
) -> IngestReport {
    IngestReport {
        archive,
        outcome,
        elapsed: started.elapsed(),
    }
}

/// Feed numbered lines to the pool until the stream ends or the pool
/// aborts. Blank lines are fed too; they fail to parse like any other
/// line without a location.
fn read_lines<R: BufRead>(
    reader: &mut R,
    preamble_lines: u64,
    feeder: &Feeder<'_, (u64, String)>,
) -> Result<()> {
    let mut buf = Vec::new();
    let mut line_no = preamble_lines;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(Error::Decompress)?;
        if read == 0 {
            return Ok(());
        }
        line_no += 1;

        let line = String::from_utf8_lossy(&buf).into_owned();
        if !feeder.push((line_no, line)) {
            return Ok(());
        }
    }
}
