use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

use contents_grapple::{ArchiveId, IndexDb};

fn grapple_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_contents-grapple"))
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(grapple_bin())
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .env_remove("CONTENTS_GRAPPLE_LOG")
        .output()
        .unwrap()
}

fn setup_fixture(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let db = IndexDb::open(&data_dir.join("contents.redb"))?;
    let neon = ArchiveId::from_identity("neon.test/user/dists/xenial");
    let ubuntu = ArchiveId::from_identity("ubuntu.test/ubuntu/dists/xenial");

    db.insert_batch(
        &neon,
        &[("usr/bin/kate".to_string(), "kate".to_string())],
    )?;
    db.set_refresh_marker(&neon, "Tue, 01 Mar 2016 10:00:00 GMT")?;
    db.insert_batch(
        &ubuntu,
        &[
            ("usr/bin/kate".to_string(), "kate-ubuntu".to_string()),
            ("usr/bin/ls".to_string(), "coreutils".to_string()),
        ],
    )?;
    db.set_refresh_marker(&ubuntu, "Tue, 01 Mar 2016 09:00:00 GMT")?;

    std::fs::write(
        data_dir.join("config.toml"),
        "sources = []\n\
         \n\
         [pools]\n\
         desktop = [\"neon.test/user/dists/xenial\", \
                    \"ubuntu.test/ubuntu/dists/xenial\"]\n",
    )?;
    Ok(())
}

#[test]
fn find_in_pool_as_json() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let output =
        run(tempdir.path(), &["find", "desktop", "usr/bin/*", "--json"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["usr/bin/kate"], serde_json::json!(["kate"]));
    assert_eq!(value["usr/bin/ls"], serde_json::json!(["coreutils"]));
    Ok(())
}

#[test]
fn find_in_archive_as_text() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let output = run(
        tempdir.path(),
        &["find", "ubuntu.test/ubuntu/dists/xenial", "usr/bin/kat?"],
    );
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout)?,
        "usr/bin/kate\tkate-ubuntu\n"
    );
    Ok(())
}

#[test]
fn short_pattern_fails() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let output = run(tempdir.path(), &["find", "desktop", "*"]);
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn lists_archives_and_pools() -> Result<(), Box<dyn std::error::Error>> {
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let output = run(tempdir.path(), &["archives", "--json"]);
    assert!(output.status.success());
    let archives: Vec<String> = serde_json::from_slice(&output.stdout)?;
    assert_eq!(archives.len(), 2);

    let output = run(tempdir.path(), &["pools", "--json"]);
    assert!(output.status.success());
    let pools: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(
        pools["desktop"],
        serde_json::json!([
            "neon.test/user/dists/xenial",
            "ubuntu.test/ubuntu/dists/xenial"
        ])
    );
    Ok(())
}
