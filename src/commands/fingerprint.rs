use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::shelf::batch::load_batch;
use crate::shelf::change::{current_fingerprint, is_modified};
use crate::shelf::warn;

#[derive(Debug, Clone)]
pub struct FingerprintOptions {
    pub batch: PathBuf,
}

/// Print each record's digest and whether it differs from the stored one.
pub fn run(opts: &FingerprintOptions) -> Result<CommandReport> {
    let batch = load_batch(&opts.batch)?;
    let mut report = CommandReport::new("fingerprint");

    let mut modified = 0usize;
    for record in &batch.records {
        let dirty = is_modified(record);
        if dirty {
            modified += 1;
        }
        report.detail(format!(
            "key={} fingerprint={} modified={}",
            record.key,
            current_fingerprint(record),
            dirty
        ));
    }
    report.detail(format!(
        "records={} modified={} unmodified={}",
        batch.records.len(),
        modified,
        batch.records.len() - modified
    ));

    for failure in &batch.failures {
        warn::emit_failure("parse", "load", failure);
        report.issue(failure.to_string());
    }
    Ok(report)
}
