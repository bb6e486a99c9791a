use url::Url;

use crate::error::{Error, Result};

/// Stable identity of an archive, derived from the URI of its contents
/// document as `host[:port]/<directory of the document>`.
///
/// Repositories that publish the document inside a component directory
/// (e.g. `dists/xenial/main/Contents-amd64.gz`) are collapsed one level,
/// so both layouts of the same suite share an identity.
///
/// # Examples
///
/// ```
/// use contents_grapple::ArchiveId;
///
/// let id = ArchiveId::from_uri(
///     "http://archive.ubuntu.com/ubuntu/dists/xenial/Contents-amd64.gz",
/// )
/// .unwrap();
/// assert_eq!(id.as_str(), "archive.ubuntu.com/ubuntu/dists/xenial");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveId(String);

impl ArchiveId {
    pub fn from_uri(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let mut dir = parent_dir(url.path());
        if dir.contains("main") {
            dir = parent_dir(dir);
        }

        let mut id = host;
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            id.push('/');
            id.push_str(segment);
        }
        Ok(Self(id))
    }

    /// Wrap an identity that is already normalized, e.g. one read back
    /// from the `archives` table.
    pub fn from_identity(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Interpret a configuration value that may be either a source URI or
    /// an identity.
    pub fn parse_lenient(value: &str) -> Result<Self> {
        if value.contains("://") {
            Self::from_uri(value)
        } else {
            Ok(Self::from_identity(value.trim_matches('/')))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything up to the last `/`, or `/` for a top-level path.
fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}
