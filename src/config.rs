use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    archive::ArchiveId,
    error::{Error, Result},
    worker_pool::PoolLimits,
};

const NEON_SOURCE: &str =
    "http://archive.neon.kde.org/user/dists/xenial/main/Contents-amd64.gz";
const UBUNTU_SOURCE: &str =
    "http://archive.ubuntu.com/ubuntu/dists/xenial/Contents-amd64.gz";

/// Runtime configuration, read from a TOML file.
///
/// Every field has a default; an absent file yields [`Config::default`],
/// which indexes KDE neon's user archive on top of Ubuntu xenial and
/// exposes both as the `neon` pool.
#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// URIs of the gzip-compressed contents documents to ingest.
    pub sources: Vec<String>,
    pub refresh_interval_secs: u64,
    /// Pool name -> member archives in precedence order. Members may be
    /// archive identities or source URIs.
    pub pools: BTreeMap<String, Vec<String>>,
    pub ingest: IngestConfig,
    pub search: SearchConfig,
    pub query: QueryConfig,
    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(
            "neon".to_string(),
            vec![NEON_SOURCE.to_string(), UBUNTU_SOURCE.to_string()],
        );
        Self {
            sources: vec![NEON_SOURCE.to_string(), UBUNTU_SOURCE.to_string()],
            refresh_interval_secs: 30 * 60,
            pools,
            ingest: IngestConfig::default(),
            search: SearchConfig::default(),
            query: QueryConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Parse workers per ingestion cycle.
    pub workers: usize,
    /// Bytes of raw lines allowed to wait for a parse worker.
    pub memory_budget_bytes: u64,
    /// Expected average line length, used to turn the budget into a
    /// queue length.
    pub average_line_bytes: u64,
    /// Maximum (path, package) pairs per write transaction.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            memory_budget_bytes: 64 * 1024 * 1024,
            average_line_bytes: 75,
            batch_size: 50_000,
        }
    }
}

impl IngestConfig {
    /// Lines that may be queued at once: the memory budget divided by the
    /// average line length, at least one.
    pub fn queue_capacity(&self) -> usize {
        let slots = self.memory_budget_bytes / self.average_line_bytes.max(1);
        usize::try_from(slots).unwrap_or(usize::MAX).max(1)
    }

    pub fn limits(&self) -> PoolLimits {
        PoolLimits {
            workers: self.workers,
            queue_capacity: self.queue_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Glob matching workers per query.
    pub workers: usize,
    /// Paths queued between the bucket scan and the matchers.
    pub queue_capacity: usize,
    /// Matches queued between the matchers and the collector.
    pub result_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: 4096,
            result_capacity: 1024,
        }
    }
}

impl SearchConfig {
    pub fn limits(&self) -> PoolLimits {
        PoolLimits {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Shorter patterns are rejected before any scan.
    pub min_pattern_len: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { min_pattern_len: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Copy the body to a scratch file before decompressing it.
    pub spool_to_disk: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            spool_to_disk: true,
            user_agent: concat!("contents-grapple/", env!("CARGO_PKG_VERSION"))
                .to_string(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    /// Load the configuration at `path`, falling back to the defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("refresh_interval_secs", self.refresh_interval_secs),
            ("ingest.workers", self.ingest.workers as u64),
            ("ingest.batch_size", self.ingest.batch_size as u64),
            ("ingest.average_line_bytes", self.ingest.average_line_bytes),
            ("search.workers", self.search.workers as u64),
            ("search.queue_capacity", self.search.queue_capacity as u64),
            ("search.result_capacity", self.search.result_capacity as u64),
            ("fetch.timeout_secs", self.fetch.timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }

        for source in &self.sources {
            ArchiveId::from_uri(source)?;
        }
        self.pools()?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Pools with every member normalized to an archive identity.
    pub fn pools(&self) -> Result<BTreeMap<String, Vec<ArchiveId>>> {
        self.pools
            .iter()
            .map(|(name, members)| {
                let members = members
                    .iter()
                    .map(|m| ArchiveId::parse_lenient(m))
                    .collect::<Result<Vec<_>>>()?;
                Ok((name.clone(), members))
            })
            .collect()
    }
}
