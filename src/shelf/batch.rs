use crate::error::ShelfError;
use crate::shelf::paths::absolute_dir;
use crate::shelf::record::BibRecord;
use crate::shelf::util::lexical_normalize;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct Batch {
    pub source: PathBuf,
    pub records: Vec<BibRecord>,
    pub failures: Vec<ShelfError>,
}

fn key_hint(value: &Value, position: usize) -> String {
    value
        .get("key")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{position}"))
}

fn parse_values(raw: &str, source: &Path) -> Result<Vec<(usize, Result<Value, String>)>> {
    if raw.trim_start().starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(raw)
            .with_context(|| format!("failed to parse batch array {}", source.display()))?;
        return Ok(values
            .into_iter()
            .enumerate()
            .map(|(idx, v)| (idx + 1, Ok(v)))
            .collect());
    }
    Ok(raw
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let parsed = serde_json::from_str::<Value>(line.trim()).map_err(|e| e.to_string());
            (idx + 1, parsed)
        })
        .collect())
}

/// Relative `file` values are taken relative to the batch file's directory.
fn anchor_file(record: &mut BibRecord, base: &Path) {
    if let Some(file) = record.file() {
        if file.is_relative() {
            record.set_file(&lexical_normalize(&base.join(file)));
        }
    }
}

/// Read a batch of records from a JSON array or a JSON-lines file. A record
/// that cannot be parsed becomes a failure and the rest of the batch loads.
pub fn load_batch(path: &Path) -> Result<Batch> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let base = if base.as_os_str().is_empty() {
        std::env::current_dir().context("failed to resolve current directory")?
    } else {
        absolute_dir(&base)?
    };

    let mut batch = Batch {
        source: path.to_path_buf(),
        ..Batch::default()
    };
    for (position, value) in parse_values(&raw, path)? {
        let parse_failure = |key: String, message: String| ShelfError::Parse {
            key,
            path: path.to_path_buf(),
            message: format!("entry {position}: {message}"),
        };
        let value = match value {
            Ok(value) => value,
            Err(message) => {
                batch
                    .failures
                    .push(parse_failure(format!("#{position}"), message));
                continue;
            }
        };
        let key = key_hint(&value, position);
        match serde_json::from_value::<BibRecord>(value) {
            Ok(mut record) => {
                anchor_file(&mut record, &base);
                batch.records.push(record);
            }
            Err(err) => batch.failures.push(parse_failure(key, err.to_string())),
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_lines_keep_going_past_bad_records() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("batch.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"type\":\"article\",\"key\":\"a\",\"fields\":{\"file\":\"in/a.pdf\"}}\n",
                "\n",
                "{\"type\":\"scroll\",\"key\":\"b\"}\n",
                "not json\n",
                "{\"type\":\"book\",\"key\":\"c\",\"fields\":{\"file\":\"/abs/c.pdf\",\"year\":2001}}\n",
            ),
        )
        .expect("write");

        let batch = load_batch(&path).expect("load");
        assert_eq!(batch.records.len(), 2);
        assert_eq!(
            batch.records[0].file(),
            Some(tmp.path().join("in/a.pdf"))
        );
        assert_eq!(batch.records[1].field("year"), Some("2001"));
        assert_eq!(batch.failures.len(), 2);
        assert_eq!(batch.failures[0].key(), "b");
        assert_eq!(batch.failures[1].key(), "#4");
    }

    #[test]
    fn arrays_load_in_order() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("batch.json");
        fs::write(
            &path,
            r#"[{"type":"misc","key":"x"},{"type":"misc","key":"y"}]"#,
        )
        .expect("write");
        let batch = load_batch(&path).expect("load");
        let keys: Vec<_> = batch.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[test]
    fn broken_array_fails_the_whole_batch() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("batch.json");
        fs::write(&path, "[{\"type\":").expect("write");
        assert!(load_batch(&path).is_err());
    }
}
