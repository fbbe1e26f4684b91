//! The batch pipeline shared by `import` and `sync`.

use crate::error::ShelfError;
use crate::shelf::catalog::{self, CatalogWrite, Upsert};
use crate::shelf::change;
use crate::shelf::config::ShelfConfig;
use crate::shelf::links::{LinkSyncOutcome, LinkSynchronizer, SyncItem};
use crate::shelf::paths::ShelfPaths;
use crate::shelf::placement::{PlacementEngine, check_preconditions};
use crate::shelf::record::BibRecord;
use crate::shelf::sweep::{self, SweepOutcome, SweepPlan};
use crate::shelf::warn;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Failures tagged with the pipeline stage that produced them.
pub type StageFailure = (&'static str, ShelfError);

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub records: usize,
    pub modified: usize,
    pub unmodified: usize,
    pub added: usize,
    pub relocated: usize,
    pub in_place: usize,
    pub deduplicated: usize,
    pub planned_moves: usize,
    pub catalog: CatalogWrite,
    pub links: LinkSyncOutcome,
    pub planned_link_creates: usize,
    pub planned_link_removes: usize,
    pub sweep: Option<(SweepPlan, SweepOutcome)>,
    pub failures: Vec<StageFailure>,
}

impl PipelineReport {
    pub fn ok(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn build_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("bibshelf-worker-{idx}"))
        .build()
        .context("failed to start worker pool")
}

pub struct Pipeline<'a> {
    paths: &'a ShelfPaths,
    config: &'a ShelfConfig,
    pool: rayon::ThreadPool,
}

impl<'a> Pipeline<'a> {
    pub fn new(paths: &'a ShelfPaths, config: &'a ShelfConfig) -> Result<Self> {
        Ok(Self {
            paths,
            config,
            pool: build_pool(config.workers.threads)?,
        })
    }

    /// Drop records that cannot enter placement, recording why.
    fn admit(&self, records: Vec<BibRecord>, report: &mut PipelineReport) -> Vec<BibRecord> {
        let mut ready = Vec::with_capacity(records.len());
        for record in records {
            match check_preconditions(&record) {
                Ok(_) => ready.push(record),
                Err(err) => report.failures.push(("precondition", err)),
            }
        }
        ready
    }

    pub fn run(&self, records: Vec<BibRecord>, dry_run: bool) -> Result<PipelineReport> {
        let mut report = PipelineReport {
            records: records.len(),
            ..PipelineReport::default()
        };
        let mut ready = self.admit(records, &mut report);
        let changes = change::partition(&ready);
        report.modified = changes.modified.len();
        report.unmodified = changes.unmodified.len();

        if dry_run {
            self.plan_only(&ready, &mut report)?;
            return Ok(report);
        }

        let engine = PlacementEngine::new(self.paths, &self.config.placement);
        let placed = engine.place(&mut ready, &self.pool);
        report.added = placed.added.len();
        report.relocated = placed.relocated.len();
        report.in_place = placed.in_place;
        report.deduplicated = placed.deduplicated;

        let mut write_back = Vec::new();
        for (idx, record) in ready.iter_mut().enumerate() {
            if placed.failed(idx) {
                continue;
            }
            if changes.is_modified(idx) || placed.previous_paths.contains_key(&idx) {
                change::commit_fingerprint(record);
                write_back.push(idx);
            }
        }
        let to_write: Vec<Upsert<'_>> = write_back
            .iter()
            .map(|idx| Upsert {
                record: &ready[*idx],
                previous_file: placed.previous_paths.get(idx).map(PathBuf::as_path),
            })
            .collect();
        report.catalog = catalog::upsert_records(self.paths, &to_write)?;

        let items: Vec<SyncItem<'_>> = ready
            .iter()
            .enumerate()
            .filter(|(idx, _)| !placed.failed(*idx))
            .map(|(idx, record)| SyncItem {
                record,
                aliases: placed.previous_paths.get(&idx).cloned().into_iter().collect(),
            })
            .collect();
        let syncer = LinkSynchronizer::new(self.paths, &self.config.links);
        report.links = syncer.sync(&items, &self.pool)?;

        report
            .failures
            .extend(placed.failures.into_iter().map(|(_, err)| ("placement", err)));
        let link_failures = std::mem::take(&mut report.links.failures);
        report
            .failures
            .extend(link_failures.into_iter().map(|err| ("link-sync", err)));

        if self.config.sweep.after_sync {
            report.sweep = Some(sweep::sweep(self.paths, false)?);
        }
        Ok(report)
    }

    /// Placement targets and link diffs as if the run had happened.
    fn plan_only(&self, ready: &[BibRecord], report: &mut PipelineReport) -> Result<()> {
        let engine = PlacementEngine::new(self.paths, &self.config.placement);
        let mut projected = Vec::with_capacity(ready.len());
        let mut aliases: BTreeMap<usize, PathBuf> = BTreeMap::new();
        for (idx, plan) in engine.plan(ready).into_iter().enumerate() {
            match plan {
                Ok(plan) => {
                    let mut record = ready[idx].clone();
                    if plan.needs_move() {
                        report.planned_moves += 1;
                        aliases.insert(projected.len(), plan.from.clone());
                    }
                    record.set_file(&plan.to);
                    projected.push(record);
                }
                Err(err) => report.failures.push(("placement", err)),
            }
        }

        let items: Vec<SyncItem<'_>> = projected
            .iter()
            .enumerate()
            .map(|(idx, record)| SyncItem {
                record,
                aliases: aliases.get(&idx).cloned().into_iter().collect(),
            })
            .collect();
        let syncer = LinkSynchronizer::new(self.paths, &self.config.links);
        let plan = syncer.plan(&items, &self.pool)?;
        report.planned_link_creates = plan.plans.iter().map(|p| p.create.len()).sum();
        report.planned_link_removes = plan.plans.iter().map(|p| p.remove.len()).sum();
        report
            .failures
            .extend(plan.failures.into_iter().map(|err| ("link-sync", err)));

        if self.config.sweep.after_sync {
            report.sweep = Some(sweep::sweep(self.paths, true)?);
        }
        Ok(())
    }
}

/// One warn line per failure, in the order they were collected.
pub fn emit_failures(failures: &[StageFailure]) {
    for (stage, failure) in failures {
        warn::emit_failure(stage, "process", failure);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::shelf::record::EntryType;
    use std::fs;
    use tempfile::tempdir;

    fn widgets(file: &std::path::Path) -> BibRecord {
        BibRecord::new(EntryType::Article, "Smith2020")
            .with_field("author", "Smith, J.")
            .with_field("title", "A Study Of Widgets")
            .with_field("year", "2020")
            .with_field("keyword", "widgets")
            .with_field("file", file.display().to_string())
    }

    #[test]
    fn rerun_with_catalog_records_changes_nothing() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().join("lib"));
        let config = ShelfConfig::default();
        let pipeline = Pipeline::new(&paths, &config).expect("pipeline");
        let input = tmp.path().join("in.pdf");
        fs::write(&input, b"%PDF widgets").expect("write");

        let first = pipeline.run(vec![widgets(&input)], false).expect("run");
        assert!(first.ok(), "{:?}", first.failures);
        assert_eq!(first.added, 1);
        assert_eq!(first.catalog.inserted, 1);

        let stored = catalog::read_catalog(&paths).expect("catalog");
        assert!(!change::is_modified(&stored[0]));
        let second = pipeline.run(stored, false).expect("rerun");
        assert_eq!(second.unmodified, 1);
        assert_eq!(second.catalog, CatalogWrite { total: 1, ..CatalogWrite::default() });
        assert_eq!((second.links.created, second.links.removed), (0, 0));
        assert_eq!(second.in_place, 1);
    }

    #[test]
    fn failed_preconditions_do_not_stop_the_batch() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().join("lib"));
        let config = ShelfConfig::default();
        let pipeline = Pipeline::new(&paths, &config).expect("pipeline");
        let input = tmp.path().join("in.pdf");
        fs::write(&input, b"%PDF").expect("write");
        let missing = BibRecord::new(EntryType::Misc, "Ghost")
            .with_field("file", tmp.path().join("ghost.pdf").display().to_string());

        let report = pipeline.run(vec![missing, widgets(&input)], false).expect("run");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "precondition");
        assert_eq!(report.added, 1);
    }

    #[test]
    fn dry_run_plans_without_moving() {
        let tmp = tempdir().expect("tempdir");
        let paths = ShelfPaths::from_root(tmp.path().join("lib"));
        let config = ShelfConfig::default();
        let pipeline = Pipeline::new(&paths, &config).expect("pipeline");
        let input = tmp.path().join("in.pdf");
        fs::write(&input, b"%PDF").expect("write");

        let report = pipeline.run(vec![widgets(&input)], true).expect("run");
        assert_eq!(report.planned_moves, 1);
        assert_eq!(report.planned_link_creates, 4);
        assert!(input.exists());
        assert!(!paths.files_dir.exists());
        assert!(!paths.catalog_file.exists());
    }
}
