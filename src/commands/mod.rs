pub mod fingerprint;
pub mod import;
pub mod status;
pub mod sweep;
pub mod sync;
pub mod verify;

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::error::ShelfErrorCode;
use crate::shelf::audit;
use crate::shelf::config::{LoadedConfig, load_config};
use crate::shelf::paths::{ShelfPaths, resolve_paths};
use crate::shelf::pipeline::{self, PipelineReport};
use crate::shelf::warn::{self, WarnEvent};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Paths and config for a command. With `must_exist`, a missing library root
/// is an error instead of something to create later.
pub fn open_library(must_exist: bool) -> Result<(ShelfPaths, LoadedConfig)> {
    let paths = resolve_paths()?;
    if must_exist && !paths.library_root.is_dir() {
        anyhow::bail!(
            "{}: library root {} does not exist",
            ShelfErrorCode::E002LibraryMissing.as_str(),
            paths.library_root.display()
        );
    }
    let loaded = load_config()?;
    Ok((paths, loaded))
}

/// Counts from a pipeline run, plus one issue per failed record.
pub fn pipeline_details(report: &mut CommandReport, run: &PipelineReport, dry_run: bool) {
    report.detail(format!("records={}", run.records));
    report.detail(format!("modified={}", run.modified));
    report.detail(format!("skipped_unmodified={}", run.unmodified));
    if dry_run {
        report.detail(format!("planned_moves={}", run.planned_moves));
        report.detail(format!("planned_link_creates={}", run.planned_link_creates));
        report.detail(format!("planned_link_removes={}", run.planned_link_removes));
    } else {
        report.detail(format!("added={}", run.added));
        report.detail(format!("relocated={}", run.relocated));
        report.detail(format!("in_place={}", run.in_place));
        report.detail(format!("deduplicated={}", run.deduplicated));
        report.detail(format!(
            "catalog_inserted={} catalog_replaced={} catalog_total={}",
            run.catalog.inserted, run.catalog.replaced, run.catalog.total
        ));
        report.detail(format!(
            "links_created={} links_replaced={} links_removed={} links_kept={}",
            run.links.created, run.links.replaced, run.links.removed, run.links.kept
        ));
    }
    if let Some((plan, outcome)) = &run.sweep {
        if dry_run {
            report.detail(format!(
                "sweep_planned_links={} sweep_planned_dirs={}",
                plan.broken_links.len(),
                plan.empty_dirs.len()
            ));
        } else {
            report.detail(format!(
                "swept_links={} swept_dirs={}",
                outcome.removed_links, outcome.removed_dirs
            ));
        }
    }

    pipeline::emit_failures(&run.failures);
    for (stage, failure) in &run.failures {
        report.issue(format!("{stage}: {failure}"));
    }
    let failed_keys: BTreeSet<&str> = run.failures.iter().map(|(_, f)| f.key()).collect();
    let processed = run.records.saturating_sub(failed_keys.len());
    report.detail(format!("processed={} of {}", processed, run.records));
}

/// Best-effort audit line for a mutating command.
pub fn audit_report(paths: &ShelfPaths, report: &CommandReport) {
    let status = if report.ok { "ok" } else { "failed" };
    let message = format!(
        "details={} issues={}",
        report.details.join("; "),
        report.issues.len()
    );
    if let Err(err) = audit::append_event(paths, &report.command, status, &message) {
        let path = paths.logs_dir.display().to_string();
        warn::emit(WarnEvent {
            code: "AUDIT_WRITE_FAILED",
            stage: "audit",
            action: "append",
            key: "",
            path: &path,
            reason: "audit-skipped",
            err: &format!("{err:#}"),
        });
    }
}
