use anyhow::Result;

use crate::commands::{CommandReport, audit_report, open_library, pipeline_details};
use crate::shelf::catalog::read_catalog;
use crate::shelf::lock::LibraryLock;
use crate::shelf::pipeline::Pipeline;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

/// Re-run placement and linking over every catalog record.
pub fn run(opts: &SyncOptions) -> Result<CommandReport> {
    let (paths, loaded) = open_library(true)?;
    let mut report = CommandReport::new("sync");
    report.detail(format!("library_root={}", paths.library_root.display()));
    report.detail(format!("strategy={}", loaded.config.placement.strategy.as_str()));

    let _lock = LibraryLock::acquire(&paths)?;
    let records = read_catalog(&paths)?;
    if records.is_empty() {
        report.detail("catalog is empty; nothing to sync".to_string());
    }

    let pipeline = Pipeline::new(&paths, &loaded.config)?;
    let run = pipeline.run(records, opts.dry_run)?;
    if opts.dry_run {
        report.detail("dry-run: no files or links were changed".to_string());
    }
    pipeline_details(&mut report, &run, opts.dry_run);

    if !opts.dry_run {
        audit_report(&paths, &report);
    }
    Ok(report)
}
