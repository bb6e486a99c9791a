use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::{
    archive::ArchiveId,
    error::Result,
    ingestion::{IngestReport, Ingestor},
};

/// Archives with a refresh cycle currently running.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    running: Arc<Mutex<HashSet<ArchiveId>>>,
}

impl InFlight {
    /// Claim `archive` for one cycle. Returns `None` while another cycle
    /// holds it; the claim is released when the returned guard drops.
    pub fn claim(&self, archive: &ArchiveId) -> Option<Claim> {
        if !lock(&self.running).insert(archive.clone()) {
            return None;
        }
        Some(Claim {
            running: Arc::clone(&self.running),
            archive: archive.clone(),
        })
    }

    pub fn is_running(&self, archive: &ArchiveId) -> bool {
        lock(&self.running).contains(archive)
    }
}

/// Lock the claim set, recovering it if a holder panicked.
fn lock(
    running: &Mutex<HashSet<ArchiveId>>,
) -> MutexGuard<'_, HashSet<ArchiveId>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct Claim {
    running: Arc<Mutex<HashSet<ArchiveId>>>,
    archive: ArchiveId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.archive);
    }
}

/// Periodically refreshes every configured source.
///
/// The first round starts immediately. A round never starts a second cycle
/// for an archive that is still being refreshed; slow archives simply miss
/// ticks. Failures are logged per archive, except storage failures, which
/// stop the scheduler.
pub struct Scheduler {
    ingestor: Arc<Ingestor>,
    sources: Vec<String>,
    interval: Duration,
    in_flight: InFlight,
}

type CycleResult = (String, Result<IngestReport>);

impl Scheduler {
    pub fn new(
        ingestor: Arc<Ingestor>,
        sources: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            ingestor,
            sources,
            interval,
            in_flight: InFlight::default(),
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Run one round and wait for it. Returns the reports of cycles that
    /// succeeded; non-fatal failures are logged and skipped.
    pub async fn run_once(&self) -> Result<Vec<IngestReport>> {
        let mut tasks = JoinSet::new();
        self.spawn_round(&mut tasks);

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Some(report) = settle(joined)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Run rounds forever, returning only on a fatal error.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        info!(
            sources = self.sources.len(),
            interval_secs = self.interval.as_secs(),
            "scheduler started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => self.spawn_round(&mut tasks),
                Some(joined) = tasks.join_next() => {
                    settle(joined)?;
                }
            }
        }
    }

    fn spawn_round(&self, tasks: &mut JoinSet<CycleResult>) {
        for uri in &self.sources {
            let archive = match ArchiveId::from_uri(uri) {
                Ok(archive) => archive,
                Err(e) => {
                    warn!(uri = %uri, error = %e, "skipping source");
                    continue;
                }
            };
            let Some(claim) = self.in_flight.claim(&archive) else {
                info!(archive = %archive, "refresh still running, skipping");
                continue;
            };

            let ingestor = Arc::clone(&self.ingestor);
            let uri = uri.clone();
            tasks.spawn_blocking(move || {
                let _claim = claim;
                let result = ingestor.refresh(&uri);
                (uri, result)
            });
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("sources", &self.sources)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Log the outcome of one cycle. Only storage failures are propagated.
fn settle(
    joined: std::result::Result<CycleResult, tokio::task::JoinError>,
) -> Result<Option<IngestReport>> {
    let (uri, result) = match joined {
        Ok(cycle) => cycle,
        Err(e) => {
            warn!(error = %e, "refresh task failed");
            return Ok(None);
        }
    };
    match result {
        Ok(report) => Ok(Some(report)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(uri = %uri, error = %e, "refresh failed");
            Ok(None)
        }
    }
}
