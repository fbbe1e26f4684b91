//! Link tree reconciliation.
//!
//! Every sync is three steps: snapshot the links that exist now, diff them
//! against the links each record should have, apply the diff. Nothing about a
//! previous run is remembered, so a crash or a hand-edited tree is repaired by
//! running again.

use crate::error::ShelfError;
use crate::shelf::config::LinkConfig;
use crate::shelf::linkspec::derive_link_specs;
use crate::shelf::paths::ShelfPaths;
use crate::shelf::record::BibRecord;
use crate::shelf::util::{lexical_normalize, resolve_path};
use crate::shelf::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

fn is_excluded(path: &Path, exclusions: &[PathBuf]) -> bool {
    exclusions.iter().any(|ex| ex.as_path() == path)
}

/// Every symlink under the link tree, indexed by what it points at.
#[derive(Debug, Clone, Default)]
pub struct LinkSnapshot {
    targets: BTreeMap<PathBuf, PathBuf>,
    by_target: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl LinkSnapshot {
    fn insert(&mut self, link: PathBuf, target: PathBuf, canonical: Option<PathBuf>) {
        self.by_target
            .entry(target.clone())
            .or_default()
            .insert(link.clone());
        if let Some(canonical) = canonical.filter(|c| *c != target) {
            self.by_target
                .entry(canonical)
                .or_default()
                .insert(link.clone());
        }
        self.targets.insert(link, target);
    }

    /// Build from `(link, raw target)` pairs without touching the filesystem.
    #[cfg(test)]
    fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = (PathBuf, PathBuf)>,
    {
        let mut out = Self::default();
        for (link, raw) in links {
            let target = absolute_target(&link, &raw);
            out.insert(link, target, None);
        }
        out
    }

    /// Walk `root` without following links, skipping `exclusions`.
    pub fn capture(root: &Path, exclusions: &[PathBuf]) -> Result<Self> {
        let mut out = Self::default();
        if !root.exists() {
            return Ok(out);
        }
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry.path(), exclusions));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    warn::emit(WarnEvent {
                        code: "LINK_WALK_FAILED",
                        stage: "link-sync",
                        action: "snapshot",
                        key: "",
                        path: &path,
                        reason: "entry-skipped",
                        err: &err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.path_is_symlink() {
                continue;
            }
            let link = entry.into_path();
            let raw = fs::read_link(&link)
                .with_context(|| format!("failed to read link {}", link.display()))?;
            let target = absolute_target(&link, &raw);
            let canonical = fs::canonicalize(&link).ok();
            out.insert(link, target, canonical);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Links pointing at any of `files`.
    pub fn links_to(&self, files: &[PathBuf]) -> BTreeSet<PathBuf> {
        files
            .iter()
            .filter_map(|file| self.by_target.get(file))
            .flatten()
            .cloned()
            .collect()
    }
}

fn absolute_target(link: &Path, raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        lexical_normalize(raw)
    } else {
        let base = link.parent().unwrap_or_else(|| Path::new(""));
        lexical_normalize(&base.join(raw))
    }
}

/// One record's view into the sync: where its file is now and where it used
/// to be before placement moved it.
#[derive(Debug, Clone)]
pub struct SyncItem<'r> {
    pub record: &'r BibRecord,
    pub aliases: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPlan {
    pub key: String,
    pub file: PathBuf,
    pub create: Vec<PathBuf>,
    pub remove: Vec<PathBuf>,
    pub keep: usize,
}

#[derive(Debug, Default)]
pub struct LinkSyncPlan {
    pub plans: Vec<LinkPlan>,
    pub failures: Vec<ShelfError>,
}

#[derive(Debug, Default)]
pub struct LinkSyncOutcome {
    pub created: usize,
    pub replaced: usize,
    pub removed: usize,
    pub kept: usize,
    pub failures: Vec<ShelfError>,
}

struct Desired {
    key: String,
    file: PathBuf,
    identities: Vec<PathBuf>,
    links: BTreeSet<PathBuf>,
}

/// Diff desired links against the snapshot. A path wanted by two records goes
/// to the first in batch order; the later record gets a collision failure for
/// that path.
fn plan_links(desired: Vec<Desired>, snapshot: &LinkSnapshot) -> (Vec<LinkPlan>, Vec<ShelfError>) {
    let mut claims: BTreeMap<PathBuf, String> = BTreeMap::new();
    let mut failures = Vec::new();
    let mut plans = Vec::with_capacity(desired.len());

    for item in desired {
        let mut wanted = BTreeSet::new();
        for link in item.links {
            match claims.get(&link) {
                Some(owner) if *owner != item.key => failures.push(ShelfError::Collision {
                    key: item.key.clone(),
                    path: link,
                    other: format!("link wanted by record {owner}"),
                }),
                _ => {
                    claims.insert(link.clone(), item.key.clone());
                    wanted.insert(link);
                }
            }
        }

        let existing = snapshot.links_to(&item.identities);
        plans.push(LinkPlan {
            create: wanted.difference(&existing).cloned().collect(),
            remove: existing.difference(&wanted).cloned().collect(),
            keep: wanted.intersection(&existing).count(),
            key: item.key,
            file: item.file,
        });
    }
    (plans, failures)
}

pub struct LinkSynchronizer<'a> {
    paths: &'a ShelfPaths,
    cfg: &'a LinkConfig,
}

impl<'a> LinkSynchronizer<'a> {
    pub fn new(paths: &'a ShelfPaths, cfg: &'a LinkConfig) -> Self {
        Self { paths, cfg }
    }

    fn desired_for(&self, item: &SyncItem<'_>) -> Option<Desired> {
        let file = item.record.file()?;
        let extension = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("pdf")
            .to_ascii_lowercase();
        let links = derive_link_specs(item.record, self.cfg)
            .iter()
            .filter_map(|spec| spec.relative_path(&extension))
            .map(|rel| self.paths.library_root.join(rel))
            .collect();

        let mut identities = vec![lexical_normalize(&file), resolve_path(&file)];
        identities.extend(item.aliases.iter().map(|a| lexical_normalize(a)));
        identities.sort();
        identities.dedup();

        Some(Desired {
            key: item.record.key.clone(),
            file,
            identities,
            links,
        })
    }

    /// Snapshot the tree and compute every record's diff. Derivation runs on
    /// `pool`; nothing is written.
    pub fn plan(&self, items: &[SyncItem<'_>], pool: &rayon::ThreadPool) -> Result<LinkSyncPlan> {
        let desired: Vec<Option<Desired>> =
            pool.install(|| items.par_iter().map(|item| self.desired_for(item)).collect());
        let mut failures = Vec::new();
        let mut ready = Vec::with_capacity(desired.len());
        for (item, desired) in items.iter().zip(desired) {
            match desired {
                Some(d) => ready.push(d),
                None => failures.push(ShelfError::Precondition {
                    key: item.record.key.clone(),
                    path: PathBuf::new(),
                    message: "record has no `file` field".to_string(),
                }),
            }
        }

        let snapshot =
            LinkSnapshot::capture(&self.paths.library_root, &self.paths.link_tree_exclusions())?;
        let (plans, mut collisions) = plan_links(ready, &snapshot);
        failures.append(&mut collisions);
        Ok(LinkSyncPlan { plans, failures })
    }

    /// Reconcile the link tree for `items`. All filesystem mutation happens on
    /// the calling thread: stale links for every record go first, then new
    /// links are created, so the result does not depend on record order.
    pub fn sync(&self, items: &[SyncItem<'_>], pool: &rayon::ThreadPool) -> Result<LinkSyncOutcome> {
        let plan = self.plan(items, pool)?;
        let mut out = LinkSyncOutcome {
            failures: plan.failures,
            ..LinkSyncOutcome::default()
        };

        for record_plan in &plan.plans {
            out.kept += record_plan.keep;
            for link in &record_plan.remove {
                match remove_link(link) {
                    Ok(true) => out.removed += 1,
                    Ok(false) => {}
                    Err(source) => out.failures.push(ShelfError::Link {
                        key: record_plan.key.clone(),
                        path: link.clone(),
                        action: "remove",
                        source,
                    }),
                }
            }
        }

        for record_plan in &plan.plans {
            for link in &record_plan.create {
                match place_link(&record_plan.key, &record_plan.file, link) {
                    Ok(LinkWrite::Created) => out.created += 1,
                    Ok(LinkWrite::Replaced) => out.replaced += 1,
                    Ok(LinkWrite::AlreadyThere) => out.kept += 1,
                    Err(err) => out.failures.push(err),
                }
            }
        }

        Ok(out)
    }
}

/// Remove `link` if it is still a symlink. `Ok(false)` when it is already gone.
fn remove_link(link: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(link)?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

enum LinkWrite {
    Created,
    Replaced,
    AlreadyThere,
}

fn place_link(key: &str, file: &Path, link: &Path) -> Result<LinkWrite, ShelfError> {
    let link_err = |action: &'static str, source| ShelfError::Link {
        key: key.to_string(),
        path: link.to_path_buf(),
        action,
        source,
    };

    match fs::symlink_metadata(link) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = link.parent() {
                fs::create_dir_all(parent).map_err(|e| link_err("create parent for", e))?;
            }
            create_symlink(file, link).map_err(|e| link_err("create", e))?;
            Ok(LinkWrite::Created)
        }
        Err(err) => Err(link_err("inspect", err)),
        Ok(meta) if !meta.file_type().is_symlink() => Err(ShelfError::Collision {
            key: key.to_string(),
            path: link.to_path_buf(),
            other: "an existing entry that is not a link".to_string(),
        }),
        Ok(_) => match fs::canonicalize(link) {
            Ok(live) if live == resolve_path(file) => Ok(LinkWrite::AlreadyThere),
            Ok(live) => Err(ShelfError::Collision {
                key: key.to_string(),
                path: link.to_path_buf(),
                other: format!("an existing link to {}", live.display()),
            }),
            Err(_) => {
                fs::remove_file(link).map_err(|e| link_err("unlink stale", e))?;
                create_symlink(file, link).map_err(|e| link_err("replace", e))?;
                Ok(LinkWrite::Replaced)
            }
        },
    }
}

/// `link` is held by something a sync will not replace: a non-link entry, or
/// a live link to a file other than `file`.
pub fn blocks_link(link: &Path, file: &Path) -> bool {
    match fs::symlink_metadata(link) {
        Err(_) => false,
        Ok(meta) if !meta.file_type().is_symlink() => true,
        Ok(_) => fs::canonicalize(link).is_ok_and(|live| live != resolve_path(file)),
    }
}
