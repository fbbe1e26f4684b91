use crate::shelf::fingerprint::fingerprint;
use crate::shelf::record::{BibRecord, FILE_FIELD, FINGERPRINT_FIELD};

/// Digest used for change detection: everything except the file location.
pub fn current_fingerprint(record: &BibRecord) -> String {
    fingerprint(record, &[FILE_FIELD])
}

/// Records without a stored fingerprint have never been written back.
pub fn is_modified(record: &BibRecord) -> bool {
    match record.stored_fingerprint() {
        Some(stored) => stored != current_fingerprint(record),
        None => true,
    }
}

/// Call right before the record is persisted.
pub fn commit_fingerprint(record: &mut BibRecord) {
    let digest = current_fingerprint(record);
    record.fields.insert(FINGERPRINT_FIELD, digest);
}

#[derive(Debug, Clone, Default)]
pub struct ChangePartition {
    pub modified: Vec<usize>,
    pub unmodified: Vec<usize>,
}

impl ChangePartition {
    pub fn is_modified(&self, idx: usize) -> bool {
        self.modified.binary_search(&idx).is_ok()
    }
}

pub fn partition(records: &[BibRecord]) -> ChangePartition {
    let mut out = ChangePartition::default();
    for (idx, record) in records.iter().enumerate() {
        if is_modified(record) {
            out.modified.push(idx);
        } else {
            out.unmodified.push(idx);
        }
    }
    out
}
