use crate::error::ShelfErrorCode;
use crate::shelf::paths::ShelfPaths;
use crate::shelf::record::BibRecord;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogWrite {
    pub inserted: usize,
    pub replaced: usize,
    pub total: usize,
}

fn read_catalog_file(path: &Path) -> Result<Vec<BibRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: BibRecord = serde_json::from_str(trimmed).with_context(|| {
            format!(
                "{}: catalog line {} in {} is not a record",
                ShelfErrorCode::E004CatalogCorrupt.as_str(),
                idx + 1,
                path.display()
            )
        })?;
        out.push(record);
    }
    Ok(out)
}

/// Rewrite the catalog through a temp file in the same directory so readers
/// never see a half-written file.
fn write_catalog_file(path: &Path, records: &[BibRecord]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("catalog path {} has no parent", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage catalog in {}", parent.display()))?;
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(staged, "{line}")?;
    }
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_catalog(paths: &ShelfPaths) -> Result<Vec<BibRecord>> {
    read_catalog_file(&paths.catalog_file)
}

/// A record to store, plus the path its file had before placement moved it.
#[derive(Debug, Clone, Copy)]
pub struct Upsert<'r> {
    pub record: &'r BibRecord,
    pub previous_file: Option<&'r Path>,
}

impl<'r> From<&'r BibRecord> for Upsert<'r> {
    fn from(record: &'r BibRecord) -> Self {
        Self {
            record,
            previous_file: None,
        }
    }
}

fn same_entry(stored: &BibRecord, incoming: &Upsert<'_>) -> bool {
    if stored.key == incoming.record.key {
        return true;
    }
    let Some(stored_file) = stored.file() else {
        return false;
    };
    incoming.record.file().as_deref() == Some(stored_file.as_path())
        || incoming.previous_file == Some(stored_file.as_path())
}

/// Replace catalog entries that share a key or a file with one of `records`,
/// appending the rest. Nothing is written when `records` is empty.
pub fn upsert_records(paths: &ShelfPaths, records: &[Upsert<'_>]) -> Result<CatalogWrite> {
    let mut catalog = read_catalog(paths)?;
    if records.is_empty() {
        return Ok(CatalogWrite {
            total: catalog.len(),
            ..CatalogWrite::default()
        });
    }

    let mut out = CatalogWrite::default();
    for incoming in records {
        let first = catalog.iter().position(|stored| same_entry(stored, incoming));
        match first {
            Some(idx) => {
                catalog[idx] = incoming.record.clone();
                let mut pos = 0usize;
                catalog.retain(|stored| {
                    let keep = pos == idx || !same_entry(stored, incoming);
                    pos += 1;
                    keep
                });
                out.replaced += 1;
            }
            None => {
                catalog.push(incoming.record.clone());
                out.inserted += 1;
            }
        }
    }

    write_catalog_file(&paths.catalog_file, &catalog)?;
    out.total = catalog.len();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shelf::record::EntryType;
    use tempfile::tempdir;

    fn rec(key: &str, file: &str, title: &str) -> BibRecord {
        BibRecord::new(EntryType::Article, key)
            .with_field("title", title)
            .with_field("file", file)
    }

    #[test]
    fn missing_catalog_reads_empty() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().to_path_buf());
        assert!(read_catalog(&paths).expect("read").is_empty());
    }

    #[test]
    fn upsert_replaces_by_key_or_file() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().to_path_buf());
        let a = rec("a", "/lib/Files/A/a.pdf", "First");
        let b = rec("b", "/lib/Files/B/b.pdf", "Second");
        let wrote = upsert_records(&paths, &[Upsert::from(&a), Upsert::from(&b)]).expect("upsert");
        assert_eq!((wrote.inserted, wrote.replaced, wrote.total), (2, 0, 2));

        let a2 = rec("a", "/lib/Files/A/a.pdf", "First, revised");
        let renamed = rec("b-renamed", "/lib/Files/B/b.pdf", "Second");
        let wrote = upsert_records(&paths, &[Upsert::from(&a2), Upsert::from(&renamed)]).expect("upsert");
        assert_eq!((wrote.inserted, wrote.replaced, wrote.total), (0, 2, 2));

        let stored = read_catalog(&paths).expect("read");
        assert_eq!(stored[0].field("title"), Some("First, revised"));
        assert_eq!(stored[1].key, "b-renamed");
    }

    #[test]
    fn upsert_collapses_entries_matching_one_record() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().to_path_buf());
        let a = rec("a", "/x/a.pdf", "A");
        let b = rec("b", "/x/b.pdf", "B");
        upsert_records(&paths, &[Upsert::from(&a), Upsert::from(&b)]).expect("upsert");

        let merged = rec("a", "/x/b.pdf", "Merged");
        let wrote = upsert_records(&paths, &[Upsert::from(&merged)]).expect("upsert");
        assert_eq!(wrote.total, 1);
    }

    #[test]
    fn renamed_and_moved_record_replaces_its_old_entry() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().to_path_buf());
        let old = rec("Smith2020", "/lib/Files/S/Smith2020.pdf", "Widgets");
        upsert_records(&paths, &[Upsert::from(&old)]).expect("upsert");

        let new = rec("Smith2020a", "/lib/Files/S/Smith2020a.pdf", "Widgets");
        let wrote = upsert_records(
            &paths,
            &[Upsert {
                record: &new,
                previous_file: Some(Path::new("/lib/Files/S/Smith2020.pdf")),
            }],
        )
        .expect("upsert");
        assert_eq!((wrote.replaced, wrote.total), (1, 1));
        assert_eq!(read_catalog(&paths).expect("read")[0].key, "Smith2020a");
    }

    #[test]
    fn corrupt_line_reports_catalog_code() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().to_path_buf());
        fs::create_dir_all(&paths.state_dir).expect("mkdir");
        fs::write(&paths.catalog_file, "{not json}\n").expect("write");
        let err = read_catalog(&paths).expect_err("corrupt");
        assert!(format!("{err:#}").contains("E004_CATALOG_CORRUPT"));
    }

    #[test]
    fn empty_upsert_does_not_create_the_file() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().to_path_buf());
        upsert_records(&paths, &[]).expect("upsert");
        assert!(!paths.catalog_file.exists());
    }
}
