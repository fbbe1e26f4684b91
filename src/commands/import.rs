use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, audit_report, open_library, pipeline_details};
use crate::shelf::batch::load_batch;
use crate::shelf::lock::LibraryLock;
use crate::shelf::pipeline::Pipeline;
use crate::shelf::util::ensure_dir;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub batch: PathBuf,
}

pub fn run(opts: &ImportOptions) -> Result<CommandReport> {
    let (paths, loaded) = open_library(false)?;
    let mut report = CommandReport::new("import");
    report.detail(format!("batch={}", opts.batch.display()));
    report.detail(format!("library_root={}", paths.library_root.display()));

    let batch = load_batch(&opts.batch)?;
    ensure_dir(&paths.library_root)?;
    ensure_dir(&paths.files_dir)?;
    let _lock = LibraryLock::acquire(&paths)?;

    let pipeline = Pipeline::new(&paths, &loaded.config)?;
    let mut run = pipeline.run(batch.records, false)?;
    run.records += batch.failures.len();
    let mut failures: Vec<_> = batch.failures.into_iter().map(|f| ("parse", f)).collect();
    failures.append(&mut run.failures);
    run.failures = failures;

    pipeline_details(&mut report, &run, false);
    audit_report(&paths, &report);
    Ok(report)
}
