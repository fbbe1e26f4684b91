#![cfg(unix)]

use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tempfile::tempdir;

fn bibshelf(tmp: &Path, root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("bibshelf");
    cmd.current_dir(tmp)
        .env("HOME", tmp)
        .env("BIBSHELF_LIBRARY_ROOT", root)
        .env("BIBSHELF_CONFIG_PATH", tmp.join("missing-config.toml"))
        .env("BIBSHELF_LINK_CATEGORIES", "Keywords")
        .env_remove("BIBSHELF_FILES_DIR")
        .env_remove("BIBSHELF_STATE_DIR");
    cmd
}

fn record(key: &str, author: &str, title: &str, year: &str, keywords: &str, file: &Path) -> String {
    format!(
        "{{\"type\":\"article\",\"key\":\"{key}\",\"fields\":{{\"author\":\"{author}\",\"title\":\"{title}\",\"year\":\"{year}\",\"keywords\":\"{keywords}\",\"file\":\"{}\"}}}}\n",
        file.display()
    )
}

#[test]
fn dropping_a_keyword_removes_only_that_link() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("Papers");
    let a = tmp.path().join("a.pdf");
    let b = tmp.path().join("b.pdf");
    fs::write(&a, b"widgets").expect("write");
    fs::write(&b, b"gears").expect("write");
    let batch = tmp.path().join("first.jsonl");
    let mut lines = record("Smith2020", "Smith, J.", "A Study Of Widgets", "2020", "widgets, gears", &a);
    lines.push_str(&record("Doe2019", "Doe, Jane", "Gear Trains", "2019", "gears", &b));
    fs::write(&batch, lines).expect("write batch");

    bibshelf(tmp.path(), &root)
        .arg("import")
        .arg(&batch)
        .assert()
        .success()
        .stdout(predicate::str::contains("links_created=3"));

    let smith_gears = root.join("Keywords/Gears/Smith - 2020 - A Study Of Widgets.pdf");
    let smith_widgets = root.join("Keywords/Widgets/Smith - 2020 - A Study Of Widgets.pdf");
    let doe_gears = root.join("Keywords/Gears/Doe - 2019 - Gear Trains.pdf");
    let doe_inode = fs::symlink_metadata(&doe_gears).expect("meta").ino();
    let smith_widgets_inode = fs::symlink_metadata(&smith_widgets).expect("meta").ino();

    let placed = root.join("Files/S/Smith2020.pdf");
    let edit = tmp.path().join("edit.jsonl");
    fs::write(
        &edit,
        record("Smith2020", "Smith, J.", "A Study Of Widgets", "2020", "widgets", &placed),
    )
    .expect("write edit");
    bibshelf(tmp.path(), &root)
        .arg("import")
        .arg(&edit)
        .assert()
        .success()
        .stdout(predicate::str::contains("links_removed=1"));

    assert!(fs::symlink_metadata(&smith_gears).is_err());
    assert_eq!(fs::symlink_metadata(&doe_gears).expect("meta").ino(), doe_inode);
    assert_eq!(
        fs::symlink_metadata(&smith_widgets).expect("meta").ino(),
        smith_widgets_inode
    );
    assert_eq!(
        fs::read_link(&doe_gears).expect("link"),
        root.join("Files/D/Doe2019.pdf")
    );
}

#[test]
fn dry_run_reports_repairs_without_making_them() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("Papers");
    let a = tmp.path().join("a.pdf");
    fs::write(&a, b"widgets").expect("write");
    let batch = tmp.path().join("batch.jsonl");
    fs::write(
        &batch,
        record("Smith2020", "Smith, J.", "A Study Of Widgets", "2020", "widgets", &a),
    )
    .expect("write batch");
    bibshelf(tmp.path(), &root)
        .arg("import")
        .arg(&batch)
        .assert()
        .success();

    let link = root.join("Keywords/Widgets/Smith - 2020 - A Study Of Widgets.pdf");
    fs::remove_file(&link).expect("rm link");

    bibshelf(tmp.path(), &root)
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("planned_link_creates=1"));
    assert!(fs::symlink_metadata(&link).is_err());

    bibshelf(tmp.path(), &root)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("links_created=1"));
    assert!(fs::symlink_metadata(&link).is_ok());
}

#[test]
fn sync_needs_an_existing_library() {
    let tmp = tempdir().expect("tempdir");
    bibshelf(tmp.path(), &tmp.path().join("nowhere"))
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("E002_LIBRARY_MISSING"));
}
