use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{uri} answered with HTTP {status}")]
    Status { uri: String, status: u16 },

    #[error("invalid source URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("failed to decompress document: {0}")]
    Decompress(std::io::Error),

    #[error("malformed contents line {line_no}: {line:?}")]
    MalformedLine { line_no: u64, line: String },

    #[error("index writer stopped before the document was fully written")]
    WriterClosed,

    #[error("worker thread panicked")]
    WorkerPanic,

    #[error("pattern {pattern:?} is shorter than {min} characters")]
    PatternTooShort { pattern: String, min: usize },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// Storage-layer failures the process cannot work around.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Redb(_)
                | Error::RedbDatabase(_)
                | Error::RedbStorage(_)
                | Error::RedbTransaction(_)
                | Error::RedbTable(_)
                | Error::RedbCommit(_)
                | Error::DataDir(_)
        )
    }

    /// Errors that reject a query at the boundary rather than report a
    /// fault.
    pub fn is_query_rejection(&self) -> bool {
        matches!(self, Error::PatternTooShort { .. } | Error::Pattern(_))
    }
}
