//! contents-grapple - a reverse index from installed file paths to the
//! packages that ship them.
//!
//! Debian-style archives publish `Contents-<arch>.gz` documents listing
//! every file of every package. contents-grapple fetches them (only when
//! they changed), parses them in parallel into an embedded
//! [redb](https://github.com/cberner/redb) store, and answers shell-glob
//! queries against one archive or against a *pool*: an ordered group of
//! archives where earlier members take precedence.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use contents_grapple::{
//!     Config, DataDir, HttpSource, IndexDb, Ingestor, Service,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let config = Config::load(&data_dir.config_file()).unwrap();
//! let db = Arc::new(IndexDb::open(&data_dir.index_db()).unwrap());
//!
//! let source = Arc::new(HttpSource::new(&config.fetch).unwrap());
//! let ingestor = Ingestor::new(db.clone(), source, config.ingest.clone());
//! for uri in &config.sources {
//!     ingestor.refresh(uri).unwrap();
//! }
//!
//! let service = Service::new(db, &config).unwrap();
//! for (path, packages) in service.find("neon", "usr/bin/kate*").unwrap() {
//!     println!("{path}\t{}", packages.join(", "));
//! }
//! ```

pub mod archive;
pub mod batch_writer;
pub mod config;
pub mod contents;
pub mod data_dir;
pub mod error;
pub mod fetch;
pub mod index_db;
pub mod ingestion;
pub mod pool;
pub mod scheduler;
pub mod search;
pub mod service;
pub mod worker_pool;

pub use archive::ArchiveId;
pub use config::Config;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use fetch::{DocumentSource, HttpSource};
pub use index_db::IndexDb;
pub use ingestion::{IngestReport, Ingestor, Outcome};
pub use scheduler::Scheduler;
pub use search::Matches;
pub use service::Service;
