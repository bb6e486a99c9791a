use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The CONTENTS_GRAPPLE_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/contents-grapple/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("CONTENTS_GRAPPLE_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("contents-grapple")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The embedded store holding refresh markers and every archive index.
    pub fn index_db(&self) -> PathBuf {
        self.root.join("contents.redb")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.index_db(), tmp.path().join("contents.redb"));
        assert_eq!(dir.config_file(), tmp.path().join("config.toml"));
    }

    #[test]
    fn missing_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("state").join("grapple");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(nested.is_dir());
        assert_eq!(dir.root(), nested);
    }

    #[test]
    fn unusable_path_is_a_data_dir_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, b"not a directory").unwrap();

        let err = DataDir::resolve(Some(&file.join("sub"))).unwrap_err();
        assert!(matches!(err, Error::DataDir(_)));
        assert!(err.is_fatal());
    }
}
