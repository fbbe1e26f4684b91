use anyhow::Result;

use crate::commands::{CommandReport, audit_report, open_library};
use crate::shelf::lock::LibraryLock;
use crate::shelf::sweep;
use crate::shelf::warn::{self, WarnEvent};

#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    pub dry_run: bool,
}

pub fn run(opts: &SweepOptions) -> Result<CommandReport> {
    let (paths, _) = open_library(true)?;
    let mut report = CommandReport::new("sweep");
    report.detail(format!("library_root={}", paths.library_root.display()));

    let _lock = LibraryLock::acquire(&paths)?;
    let (plan, outcome) = sweep::sweep(&paths, opts.dry_run)?;
    if plan.is_empty() {
        report.detail("link tree is clean".to_string());
    }

    if opts.dry_run {
        for link in &plan.broken_links {
            report.detail(format!("would_remove_link={}", link.display()));
        }
        for dir in &plan.empty_dirs {
            report.detail(format!("would_remove_dir={}", dir.display()));
        }
        report.detail(format!(
            "dry-run: broken_links={} empty_dirs={}",
            plan.broken_links.len(),
            plan.empty_dirs.len()
        ));
        return Ok(report);
    }

    report.detail(format!("removed_links={}", outcome.removed_links));
    report.detail(format!("removed_dirs={}", outcome.removed_dirs));
    for (path, err) in &outcome.skipped {
        let shown = path.display().to_string();
        warn::emit(WarnEvent {
            code: "SWEEP_SKIPPED",
            stage: "sweep",
            action: "remove",
            key: "",
            path: &shown,
            reason: "entry-kept",
            err: &err.to_string(),
        });
        report.issue(format!("could not remove {shown}: {err}"));
    }

    audit_report(&paths, &report);
    Ok(report)
}
