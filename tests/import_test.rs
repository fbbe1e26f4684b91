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
        .env_remove("BIBSHELF_FILES_DIR")
        .env_remove("BIBSHELF_STATE_DIR")
        .env_remove("BIBSHELF_PLACEMENT_STRATEGY");
    cmd
}

fn widgets_line(file: &Path) -> String {
    format!(
        "{{\"type\":\"article\",\"key\":\"Smith2020\",\"fields\":{{\"author\":\"Smith, J.\",\"title\":\"A Study Of Widgets\",\"year\":\"2020\",\"keyword\":\"widgets\",\"file\":\"{}\"}}}}\n",
        file.display()
    )
}

#[test]
fn import_places_links_and_settles() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("Papers");
    let input = tmp.path().join("in.pdf");
    fs::write(&input, b"%PDF-1.4 widgets").expect("write pdf");
    let batch = tmp.path().join("batch.jsonl");
    fs::write(&batch, widgets_line(&input)).expect("write batch");

    bibshelf(tmp.path(), &root)
        .arg("import")
        .arg(&batch)
        .assert()
        .success()
        .stdout(predicate::str::contains("added=1"));

    let canonical = root.join("Files/S/Smith2020.pdf");
    assert!(!input.exists());
    assert_eq!(fs::read(&canonical).expect("read"), b"%PDF-1.4 widgets");
    let links = [
        root.join("Authors/Smith/2020 - A Study Of Widgets.pdf"),
        root.join("Years/2020/Smith - A Study Of Widgets.pdf"),
        root.join("Keywords/Widgets/Smith - 2020 - A Study Of Widgets.pdf"),
        root.join("Titles/A Study Of Widgets - Smith - 2020.pdf"),
    ];
    for link in &links {
        assert_eq!(fs::read_link(link).expect("link"), canonical);
    }
    let inodes: Vec<u64> = links
        .iter()
        .map(|l| fs::symlink_metadata(l).expect("meta").ino())
        .collect();

    let catalog = root.join(".bibshelf/catalog.jsonl");
    bibshelf(tmp.path(), &root)
        .arg("fingerprint")
        .arg(&catalog)
        .assert()
        .success()
        .stdout(predicate::str::contains("modified=false"));

    bibshelf(tmp.path(), &root)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped_unmodified=1"))
        .stdout(predicate::str::contains(
            "links_created=0 links_replaced=0 links_removed=0 links_kept=4",
        ));
    let after: Vec<u64> = links
        .iter()
        .map(|l| fs::symlink_metadata(l).expect("meta").ino())
        .collect();
    assert_eq!(inodes, after);

    let audit = fs::read_to_string(root.join(".bibshelf/logs/audit.log")).expect("audit");
    assert_eq!(audit.lines().count(), 2);
}

#[test]
fn relative_library_root_is_anchored_at_the_working_directory() {
    let tmp = tempdir().expect("tempdir");
    let base = tmp.path().canonicalize().expect("canonical tempdir");
    let input = base.join("in.pdf");
    fs::write(&input, b"%PDF-1.4 widgets").expect("write pdf");
    fs::write(base.join("batch.jsonl"), widgets_line(&input)).expect("write batch");

    bibshelf(&base, Path::new("Papers"))
        .args(["import", "batch.jsonl"])
        .assert()
        .success();

    let root = base.join("Papers");
    let canonical = root.join("Files/S/Smith2020.pdf");
    let link = root.join("Years/2020/Smith - A Study Of Widgets.pdf");
    assert_eq!(fs::read_link(&link).expect("link"), canonical);
    assert!(link.is_file());
    let catalog = fs::read_to_string(root.join(".bibshelf/catalog.jsonl")).expect("catalog");
    assert!(catalog.contains(&canonical.display().to_string()));

    bibshelf(&base, Path::new("Papers"))
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("links_removed=0"))
        .stdout(predicate::str::contains("swept_links=0"));
    assert!(link.is_file());
}

#[test]
fn store_collision_is_reported_and_source_kept() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("Papers");
    let occupied = root.join("Files/S/Smith2020.pdf");
    fs::create_dir_all(occupied.parent().expect("parent")).expect("mkdir");
    fs::write(&occupied, b"someone else's paper").expect("write");
    let input = tmp.path().join("in.pdf");
    fs::write(&input, b"%PDF-1.4 widgets").expect("write pdf");
    let batch = tmp.path().join("batch.jsonl");
    fs::write(&batch, widgets_line(&input)).expect("write batch");

    bibshelf(tmp.path(), &root)
        .arg("import")
        .arg(&batch)
        .assert()
        .failure()
        .stderr(predicate::str::contains("code=RECORD_COLLISION"))
        .stderr(predicate::str::contains("key=Smith2020"));

    assert_eq!(fs::read(&input).expect("read"), b"%PDF-1.4 widgets");
    assert_eq!(fs::read(&occupied).expect("read"), b"someone else's paper");
}

#[test]
fn bad_records_fail_alone() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("Papers");
    let input = tmp.path().join("in.pdf");
    fs::write(&input, b"%PDF").expect("write pdf");
    let batch = tmp.path().join("batch.jsonl");
    let mut lines = widgets_line(&input);
    lines.push_str("{\"type\":\"misc\",\"key\":\"Ghost\",\"fields\":{\"file\":\"ghost.pdf\"}}\n");
    lines.push_str("{\"key\":\"NoType\"}\n");
    fs::write(&batch, lines).expect("write batch");

    bibshelf(tmp.path(), &root)
        .arg("import")
        .arg(&batch)
        .assert()
        .failure()
        .stdout(predicate::str::contains("processed=1 of 3"))
        .stderr(predicate::str::contains("key=Ghost"))
        .stderr(predicate::str::contains("key=NoType"));

    assert!(root.join("Files/S/Smith2020.pdf").is_file());
}

#[test]
fn json_flag_prints_the_report() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("Papers");
    let output = bibshelf(tmp.path(), &root)
        .args(["--json", "status"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["command"], "status");
    assert_eq!(report["ok"], true);
}
