use std::{collections::BTreeMap, thread};

use crossbeam::channel::bounded;
use globset::{GlobBuilder, GlobMatcher};
use redb::ReadableMultimapTable;
use tracing::debug;

use crate::{
    archive::ArchiveId,
    config::SearchConfig,
    error::{Error, Result},
    index_db::{self, IndexDb},
    worker_pool,
};

/// File path -> packages providing it, in path order.
pub type Matches = BTreeMap<String, Vec<String>>;

/// Compile a shell glob matched against whole paths. `*` and `?` also match
/// `/`, as with `fnmatch(3)` without `FNM_PATHNAME`.
///
/// # Examples
///
/// ```
/// use contents_grapple::search::compile_pattern;
///
/// let glob = compile_pattern("*.so").unwrap();
/// assert!(glob.is_match("lib/libfoo.so"));
/// assert!(!glob.is_match("lib/libfoo.so.1"));
/// ```
pub fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(pattern).literal_separator(false).build()?;
    Ok(glob.compile_matcher())
}

/// Every path of `archive` matching `matcher`, with its package set.
///
/// The calling thread scans the archive's keys from one read snapshot into
/// a bounded queue. Matcher workers resolve the package set of each hit
/// from that same snapshot and forward `(path, packages)` through a second
/// bounded queue to a collector, so the result reflects a single committed
/// state.
///
/// An archive that was never ingested yields an empty result.
pub fn find(
    db: &IndexDb,
    archive: &ArchiveId,
    matcher: &GlobMatcher,
    config: &SearchConfig,
) -> Result<Matches> {
    let Some(table) = db.read_index(archive)? else {
        return Ok(Matches::new());
    };
    let table = &table;

    thread::scope(|s| {
        let (hit_tx, hit_rx) =
            bounded::<(String, Vec<String>)>(config.result_capacity.max(1));
        let collector = s.spawn(move || hit_rx.iter().collect::<Matches>());

        let scanned = worker_pool::run(
            config.limits(),
            |feeder| {
                for entry in table.iter()? {
                    let (path, _) = entry?;
                    if !feeder.push(path.value().to_string()) {
                        break;
                    }
                }
                Ok(())
            },
            |path: String| {
                if matcher.is_match(&path) {
                    let packages = index_db::collect_packages(table, &path)?;
                    hit_tx
                        .send((path, packages))
                        .map_err(|_| Error::WorkerPanic)?;
                }
                Ok(())
            },
        );
        drop(hit_tx);

        let matches = collector.join().map_err(|_| Error::WorkerPanic)?;
        let scanned = scanned?;
        debug!(archive = %archive, scanned, matched = matches.len(), "scan");
        Ok(matches)
    })
}
