use crate::shelf::change;
use crate::shelf::config::ShelfConfig;
use crate::shelf::links::{LinkSnapshot, LinkSynchronizer, SyncItem, blocks_link};
use crate::shelf::paths::ShelfPaths;
use crate::shelf::pipeline::build_pool;
use crate::shelf::placement::PlacementEngine;
use crate::shelf::record::BibRecord;
use crate::shelf::util::{is_within, lexical_normalize, resolve_path};
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finding {
    NoFile,
    Missing,
    OutsideStore,
    Misplaced,
    StaleFingerprint,
    Unlinked,
    /// A wanted link path is held by an entry that `sync` and `sweep` leave alone.
    LinkBlocked,
}

impl Finding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoFile => "no_file_field",
            Self::Missing => "file_missing",
            Self::OutsideStore => "outside_store",
            Self::Misplaced => "not_at_canonical_path",
            Self::StaleFingerprint => "stale_fingerprint",
            Self::Unlinked => "unlinked",
            Self::LinkBlocked => "link_blocked",
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RecordFindings {
    pub key: String,
    pub file: String,
    pub findings: Vec<Finding>,
    pub blocked_links: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct VerifySummary {
    pub checked: usize,
    pub links: usize,
    pub problems: Vec<RecordFindings>,
}

/// Check catalog records against the store and the link tree. Nothing is
/// repaired.
pub fn verify_records(
    paths: &ShelfPaths,
    config: &ShelfConfig,
    records: &[BibRecord],
) -> Result<VerifySummary> {
    let snapshot = LinkSnapshot::capture(&paths.library_root, &paths.link_tree_exclusions())?;
    let engine = PlacementEngine::new(paths, &config.placement);
    let mut blocked = blocked_links(paths, config, records)?;
    let mut out = VerifySummary {
        checked: records.len(),
        links: snapshot.len(),
        ..VerifySummary::default()
    };

    for record in records {
        let mut findings = Vec::new();
        match record.file() {
            None => findings.push(Finding::NoFile),
            Some(file) => {
                if !file.is_file() {
                    findings.push(Finding::Missing);
                } else {
                    if !is_within(&file, &paths.files_dir) {
                        findings.push(Finding::OutsideStore);
                    } else if let Ok(expected) = engine.canonical_target(record) {
                        if resolve_path(&expected) != resolve_path(&file) {
                            findings.push(Finding::Misplaced);
                        }
                    }
                    let reached = snapshot.links_to(&[lexical_normalize(&file), resolve_path(&file)]);
                    if reached.is_empty() {
                        findings.push(Finding::Unlinked);
                    }
                }
            }
        }
        if change::is_modified(record) {
            findings.push(Finding::StaleFingerprint);
        }
        let blocked_links = blocked.remove(&record.key).unwrap_or_default();
        if !blocked_links.is_empty() {
            findings.push(Finding::LinkBlocked);
        }
        if !findings.is_empty() {
            out.problems.push(RecordFindings {
                key: record.key.clone(),
                file: record.field("file").unwrap_or_default().to_string(),
                findings,
                blocked_links,
            });
        }
    }
    Ok(out)
}

/// Wanted link paths per record that are occupied by something else.
fn blocked_links(
    paths: &ShelfPaths,
    config: &ShelfConfig,
    records: &[BibRecord],
) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let items: Vec<SyncItem<'_>> = records
        .iter()
        .filter(|record| record.file().is_some())
        .map(|record| SyncItem {
            record,
            aliases: Vec::new(),
        })
        .collect();
    let pool = build_pool(config.workers.threads)?;
    let plan = LinkSynchronizer::new(paths, &config.links).plan(&items, &pool)?;

    let mut out = BTreeMap::new();
    for record_plan in plan.plans {
        let held: Vec<PathBuf> = record_plan
            .create
            .into_iter()
            .filter(|link| blocks_link(link, &record_plan.file))
            .collect();
        if !held.is_empty() {
            out.insert(record_plan.key, held);
        }
    }
    Ok(out)
}
