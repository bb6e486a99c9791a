use std::path::Path;

use redb::{
    Database,
    MultimapTableDefinition,
    ReadOnlyMultimapTable,
    ReadableDatabase,
    ReadableMultimapTable,
    ReadableTable,
    TableDefinition,
    TableError,
};

use crate::{archive::ArchiveId, error::Result};

/// Archive identity -> freshness marker of the last complete refresh.
const ARCHIVES: TableDefinition<&str, &str> = TableDefinition::new("archives");

/// Prefix of the per-archive index tables. Keeps archive namespaces apart
/// from `archives` whatever the identity looks like.
const INDEX_PREFIX: &str = "index:";

/// Table name holding the file path -> packages multimap of one archive.
pub fn index_table_name(archive: &ArchiveId) -> String {
    format!("{INDEX_PREFIX}{archive}")
}

type IndexTable<'a> = MultimapTableDefinition<'a, &'static str, &'static str>;

fn index_table(name: &str) -> IndexTable<'_> {
    MultimapTableDefinition::new(name)
}

/// Read snapshot of one archive's path -> packages multimap.
pub type IndexSnapshot = ReadOnlyMultimapTable<&'static str, &'static str>;

/// The persistent reverse index.
///
/// Layout:
/// - `archives`: archive identity -> opaque freshness marker
/// - `index:<identity>`: multimap from file path to package identifiers
///
/// The multimap gives set semantics per path: re-inserting an existing
/// (path, package) pair is a no-op, so ingestion is idempotent.
pub struct IndexDb {
    db: Database,
}

impl IndexDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(ARCHIVES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Archives --

    /// Create the archive's index table if it does not exist yet.
    pub fn ensure_archive(&self, archive: &ArchiveId) -> Result<()> {
        let name = index_table_name(archive);
        let txn = self.db.begin_write()?;
        txn.open_multimap_table(index_table(&name))?;
        txn.commit()?;
        Ok(())
    }

    pub fn refresh_marker(
        &self,
        archive: &ArchiveId,
    ) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ARCHIVES)?;
        Ok(table
            .get(archive.as_str())?
            .map(|v| v.value().to_string()))
    }

    /// Record the freshness marker of a fully applied document. This is the
    /// last step of a refresh cycle.
    pub fn set_refresh_marker(
        &self,
        archive: &ArchiveId,
        marker: &str,
    ) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ARCHIVES)?;
            table.insert(archive.as_str(), marker)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Identities of every archive that completed at least one refresh.
    pub fn list_archives(&self) -> Result<Vec<ArchiveId>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ARCHIVES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            result.push(ArchiveId::from_identity(k.value()));
        }
        Ok(result)
    }

    pub fn has_archive(&self, archive: &ArchiveId) -> Result<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ARCHIVES)?;
        Ok(table.get(archive.as_str())?.is_some())
    }

    // -- Index entries --

    /// Insert (path, package) pairs in a single write transaction.
    ///
    /// Returns how many pairs were not present before.
    pub fn insert_batch(
        &self,
        archive: &ArchiveId,
        entries: &[(String, String)],
    ) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }
        let name = index_table_name(archive);
        let txn = self.db.begin_write()?;
        let mut added = 0;
        {
            let mut table = txn.open_multimap_table(index_table(&name))?;
            for (path, package) in entries {
                let existed = table.insert(path.as_str(), package.as_str())?;
                if !existed {
                    added += 1;
                }
            }
        }
        txn.commit()?;
        Ok(added)
    }

    /// Open a read snapshot of one archive's index.
    ///
    /// Returns `None` when the archive was never ingested.
    pub fn read_index(
        &self,
        archive: &ArchiveId,
    ) -> Result<Option<IndexSnapshot>> {
        let name = index_table_name(archive);
        let txn = self.db.begin_read()?;
        match txn.open_multimap_table(index_table(&name)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Packages recorded for one path, in sorted order.
    pub fn packages_for(
        &self,
        archive: &ArchiveId,
        path: &str,
    ) -> Result<Vec<String>> {
        let Some(table) = self.read_index(archive)? else {
            return Ok(Vec::new());
        };
        collect_packages(&table, path)
    }

    /// Number of distinct paths indexed for an archive.
    pub fn path_count(&self, archive: &ArchiveId) -> Result<u64> {
        let Some(table) = self.read_index(archive)? else {
            return Ok(0);
        };
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

/// Resolve the package set of `path` within an open snapshot.
pub fn collect_packages(
    table: &IndexSnapshot,
    path: &str,
) -> Result<Vec<String>> {
    let mut packages = Vec::new();
    for value in table.get(path)? {
        packages.push(value?.value().to_string());
    }
    Ok(packages)
}

impl std::fmt::Debug for IndexDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, IndexDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = IndexDb::open(&tmp.path().join("contents.redb")).unwrap();
        (tmp, db)
    }

    fn archive() -> ArchiveId {
        ArchiveId::from_identity("host/dists/xenial")
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(p, k)| (p.to_string(), k.to_string()))
            .collect()
    }

    #[test]
    fn markers_crud() {
        let (_tmp, db) = test_db();
        let id = archive();

        assert_eq!(db.refresh_marker(&id).unwrap(), None);
        assert!(!db.has_archive(&id).unwrap());
        assert!(db.list_archives().unwrap().is_empty());

        db.set_refresh_marker(&id, "Tue, 01 Mar 2016 10:00:00 GMT")
            .unwrap();
        assert_eq!(
            db.refresh_marker(&id).unwrap(),
            Some("Tue, 01 Mar 2016 10:00:00 GMT".to_string())
        );
        assert!(db.has_archive(&id).unwrap());
        assert_eq!(db.list_archives().unwrap(), vec![id.clone()]);

        db.set_refresh_marker(&id, "Wed, 02 Mar 2016 10:00:00 GMT")
            .unwrap();
        assert_eq!(
            db.refresh_marker(&id).unwrap(),
            Some("Wed, 02 Mar 2016 10:00:00 GMT".to_string())
        );
    }

    #[test]
    fn ensure_archive_is_idempotent() {
        let (_tmp, db) = test_db();
        let id = archive();

        assert!(db.read_index(&id).unwrap().is_none());
        db.ensure_archive(&id).unwrap();
        db.ensure_archive(&id).unwrap();
        assert!(db.read_index(&id).unwrap().is_some());
        assert_eq!(db.path_count(&id).unwrap(), 0);
        // Bucket existence alone does not make an archive listed.
        assert!(!db.has_archive(&id).unwrap());
    }

    #[test]
    fn insert_batch_has_set_semantics() {
        let (_tmp, db) = test_db();
        let id = archive();

        let batch = pairs(&[
            ("usr/bin/ls", "coreutils"),
            ("usr/bin/ls", "busybox"),
            ("usr/bin/ls", "coreutils"),
            ("usr/share/doc/foo/copyright", "libfoo-dev"),
        ]);
        assert_eq!(db.insert_batch(&id, &batch).unwrap(), 3);
        assert_eq!(db.insert_batch(&id, &batch).unwrap(), 0);

        assert_eq!(
            db.packages_for(&id, "usr/bin/ls").unwrap(),
            vec!["busybox".to_string(), "coreutils".to_string()]
        );
        assert_eq!(db.path_count(&id).unwrap(), 2);
    }

    #[test]
    fn empty_batch_is_noop() {
        let (_tmp, db) = test_db();
        assert_eq!(db.insert_batch(&archive(), &[]).unwrap(), 0);
        assert!(db.read_index(&archive()).unwrap().is_none());
    }

    #[test]
    fn unknown_archive_reads_empty() {
        let (_tmp, db) = test_db();
        let ghost = ArchiveId::from_identity("nowhere/dists/none");
        assert!(db.packages_for(&ghost, "usr/bin/ls").unwrap().is_empty());
        assert_eq!(db.path_count(&ghost).unwrap(), 0);
    }

    #[test]
    fn archives_are_isolated() {
        let (_tmp, db) = test_db();
        let a = ArchiveId::from_identity("a/dists/x");
        let b = ArchiveId::from_identity("b/dists/x");

        db.insert_batch(&a, &pairs(&[("usr/bin/ls", "coreutils")]))
            .unwrap();
        db.insert_batch(&b, &pairs(&[("usr/bin/ls", "busybox")]))
            .unwrap();

        assert_eq!(
            db.packages_for(&a, "usr/bin/ls").unwrap(),
            vec!["coreutils".to_string()]
        );
        assert_eq!(
            db.packages_for(&b, "usr/bin/ls").unwrap(),
            vec!["busybox".to_string()]
        );
    }

    #[test]
    fn archive_named_like_metadata_table_does_not_clash() {
        let (_tmp, db) = test_db();
        let odd = ArchiveId::from_identity("archives");
        db.insert_batch(&odd, &pairs(&[("etc/motd", "base-files")]))
            .unwrap();
        db.set_refresh_marker(&odd, "marker").unwrap();
        assert_eq!(db.list_archives().unwrap(), vec![odd]);
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("contents.redb");
        let id = archive();

        {
            let db = IndexDb::open(&path).unwrap();
            db.insert_batch(&id, &pairs(&[("usr/bin/ls", "coreutils")]))
                .unwrap();
            db.set_refresh_marker(&id, "marker").unwrap();
        }

        {
            let db = IndexDb::open(&path).unwrap();
            assert_eq!(
                db.refresh_marker(&id).unwrap(),
                Some("marker".to_string())
            );
            assert_eq!(
                db.packages_for(&id, "usr/bin/ls").unwrap(),
                vec!["coreutils".to_string()]
            );
        }
    }
}
