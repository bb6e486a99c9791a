use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use crate::{
    archive::ArchiveId,
    config::{Config, SearchConfig},
    error::{Error, Result},
    index_db::IndexDb,
    pool,
    search::{self, Matches},
};

/// Query-side handle shared by every caller: the open index plus the pool
/// definitions and search limits loaded at startup.
#[derive(Debug, Clone)]
pub struct Service {
    db: Arc<IndexDb>,
    pools: BTreeMap<String, Vec<ArchiveId>>,
    search: SearchConfig,
    min_pattern_len: usize,
}

impl Service {
    pub fn new(db: Arc<IndexDb>, config: &Config) -> Result<Self> {
        Ok(Self {
            db,
            pools: config.pools()?,
            search: config.search.clone(),
            min_pattern_len: config.query.min_pattern_len,
        })
    }

    pub fn db(&self) -> &Arc<IndexDb> {
        &self.db
    }

    /// Find paths matching `pattern` in a pool or a single archive.
    ///
    /// `target` names a configured pool first, then a known archive
    /// identity. Anything else yields an empty result, so callers cannot
    /// discover which archives exist. Patterns shorter than the configured
    /// minimum, or that are not valid globs, are rejected.
    pub fn find(&self, target: &str, pattern: &str) -> Result<Matches> {
        if pattern.chars().count() < self.min_pattern_len {
            return Err(Error::PatternTooShort {
                pattern: pattern.to_string(),
                min: self.min_pattern_len,
            });
        }
        let matcher = search::compile_pattern(pattern)?;

        if let Some(members) = self.pools.get(target) {
            // Members that never completed a refresh are invisible here
            // too, exactly as when queried directly.
            let mut known = Vec::with_capacity(members.len());
            for member in members {
                if self.db.has_archive(member)? {
                    known.push(member.clone());
                }
            }
            debug!(
                pool = target,
                pattern,
                members = members.len(),
                known = known.len(),
                "pool query"
            );
            return pool::find_in_pool(&self.db, &known, &matcher, &self.search);
        }

        let archive = ArchiveId::from_identity(target.trim_matches('/'));
        if !self.db.has_archive(&archive)? {
            debug!(target, "query for unknown target");
            return Ok(Matches::new());
        }
        search::find(&self.db, &archive, &matcher, &self.search)
    }

    /// Archives that completed at least one refresh.
    pub fn archives(&self) -> Result<Vec<ArchiveId>> {
        self.db.list_archives()
    }

    pub fn pools(&self) -> &BTreeMap<String, Vec<ArchiveId>> {
        &self.pools
    }
}
