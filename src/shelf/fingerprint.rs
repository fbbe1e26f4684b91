use crate::shelf::record::{BibRecord, FINGERPRINT_FIELD};
use sha2::{Digest, Sha256};

const UNIT_SEP: u8 = 0x1f;
const RECORD_SEP: u8 = 0x1e;

/// SHA-256 over type, key and the sorted `(name, value)` pairs of every field
/// not excluded. `fingerprint` is always excluded; names compare
/// case-insensitively.
pub fn fingerprint(record: &BibRecord, exclude: &[&str]) -> String {
    let mut pairs: Vec<(&str, &str)> = record
        .fields
        .iter()
        .filter(|(name, _)| {
            *name != FINGERPRINT_FIELD && !exclude.iter().any(|ex| ex.eq_ignore_ascii_case(name))
        })
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(record.entry_type.as_str().as_bytes());
    hasher.update([RECORD_SEP]);
    hasher.update(record.key.as_bytes());
    hasher.update([RECORD_SEP]);
    for (name, value) in pairs {
        hasher.update(name.as_bytes());
        hasher.update([UNIT_SEP]);
        hasher.update(value.as_bytes());
        hasher.update([RECORD_SEP]);
    }
    format!("{:x}", hasher.finalize())
}
