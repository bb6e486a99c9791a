use globset::GlobMatcher;
use rayon::prelude::*;

use crate::{
    archive::ArchiveId,
    config::SearchConfig,
    error::Result,
    index_db::IndexDb,
    search::{self, Matches},
};

/// Search every member of a pool and merge the results.
///
/// Members are searched concurrently but merged in declared order: a path
/// found in several members keeps the packages of the earliest one.
pub fn find_in_pool(
    db: &IndexDb,
    members: &[ArchiveId],
    matcher: &GlobMatcher,
    config: &SearchConfig,
) -> Result<Matches> {
    let per_member = members
        .par_iter()
        .map(|archive| search::find(db, archive, matcher, config))
        .collect::<Result<Vec<_>>>()?;
    Ok(merge_first_wins(per_member))
}

/// Merge results in order; earlier results win on conflicting paths.
pub fn merge_first_wins<I>(results: I) -> Matches
where
    I: IntoIterator<Item = Matches>,
{
    let mut merged = Matches::new();
    for matches in results {
        for (path, packages) in matches {
            merged.entry(path).or_insert(packages);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::compile_pattern;

    fn matches(items: &[(&str, &[&str])]) -> Matches {
        items
            .iter()
            .map(|(path, packages)| {
                (
                    path.to_string(),
                    packages.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn earlier_member_wins() {
        let a = matches(&[("usr/bin/ls", &["coreutils"])]);
        let b = matches(&[
            ("usr/bin/ls", &["busybox"]),
            ("usr/bin/vi", &["vim"]),
        ]);

        let merged = merge_first_wins([a, b]);
        assert_eq!(merged["usr/bin/ls"], vec!["coreutils"]);
        assert_eq!(merged["usr/bin/vi"], vec!["vim"]);
    }

    #[test]
    fn no_union_of_package_sets() {
        let a = matches(&[("usr/bin/ls", &["coreutils"])]);
        let b = matches(&[("usr/bin/ls", &["busybox", "coreutils"])]);
        let merged = merge_first_wins([b.clone(), a.clone()]);
        assert_eq!(merged["usr/bin/ls"], vec!["busybox", "coreutils"]);
        let merged = merge_first_wins([a, b]);
        assert_eq!(merged["usr/bin/ls"], vec!["coreutils"]);
    }

    #[test]
    fn empty_inputs() {
        assert!(merge_first_wins(Vec::<Matches>::new()).is_empty());
        assert!(merge_first_wins([Matches::new(), Matches::new()]).is_empty());
    }

    #[test]
    fn pool_search_respects_declared_order() {
        let tmp = tempfile::tempdir().unwrap();
        let db = IndexDb::open(&tmp.path().join("contents.redb")).unwrap();
        let neon = ArchiveId::from_identity("neon/dists/xenial");
        let ubuntu = ArchiveId::from_identity("ubuntu/dists/xenial");

        db.insert_batch(
            &neon,
            &[("usr/bin/kate".to_string(), "kate-neon".to_string())],
        )
        .unwrap();
        db.insert_batch(
            &ubuntu,
            &[
                ("usr/bin/kate".to_string(), "kate".to_string()),
                ("usr/bin/kwrite".to_string(), "kwrite".to_string()),
            ],
        )
        .unwrap();

        let matcher = compile_pattern("usr/bin/k*").unwrap();
        let config = SearchConfig::default();

        let found = find_in_pool(
            &db,
            &[neon.clone(), ubuntu.clone()],
            &matcher,
            &config,
        )
        .unwrap();
        assert_eq!(found["usr/bin/kate"], vec!["kate-neon"]);
        assert_eq!(found["usr/bin/kwrite"], vec!["kwrite"]);

        let reversed =
            find_in_pool(&db, &[ubuntu, neon], &matcher, &config).unwrap();
        assert_eq!(reversed["usr/bin/kate"], vec!["kate"]);
    }

    #[test]
    fn empty_pool_and_unknown_members() {
        let tmp = tempfile::tempdir().unwrap();
        let db = IndexDb::open(&tmp.path().join("contents.redb")).unwrap();
        let matcher = compile_pattern("*").unwrap();
        let config = SearchConfig::default();

        assert!(find_in_pool(&db, &[], &matcher, &config).unwrap().is_empty());
        let ghost = ArchiveId::from_identity("ghost");
        assert!(
            find_in_pool(&db, &[ghost], &matcher, &config)
                .unwrap()
                .is_empty()
        );
    }
}
