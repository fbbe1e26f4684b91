use crate::shelf::paths::ShelfPaths;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    LiveLink,
    BrokenLink,
    File,
}

/// The link tree below the library root, minus the file store and state
/// directory. Paths are kept in sorted order.
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    root: PathBuf,
    entries: BTreeMap<PathBuf, EntryKind>,
}

impl TreeSnapshot {
    pub fn from_entries<I>(root: &Path, entries: I) -> Self
    where
        I: IntoIterator<Item = (PathBuf, EntryKind)>,
    {
        Self {
            root: root.to_path_buf(),
            entries: entries.into_iter().collect(),
        }
    }

    pub fn capture(root: &Path, exclusions: &[PathBuf]) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if !root.exists() {
            return Ok(Self::from_entries(root, entries));
        }
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !exclusions.iter().any(|ex| ex.as_path() == entry.path()));
        for entry in walker {
            let entry =
                entry.with_context(|| format!("failed to walk {}", root.display()))?;
            let kind = if entry.path_is_symlink() {
                if fs::metadata(entry.path()).is_ok() {
                    EntryKind::LiveLink
                } else {
                    EntryKind::BrokenLink
                }
            } else if entry.file_type().is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.insert(entry.into_path(), kind);
        }
        Ok(Self::from_entries(root, entries))
    }

    /// Direct children of `dir`. Descendants sort contiguously after it.
    fn children<'s>(
        &'s self,
        dir: &'s Path,
    ) -> impl Iterator<Item = (&'s PathBuf, &'s EntryKind)> + 's {
        self.entries
            .range::<Path, _>((Bound::Excluded(dir), Bound::Unbounded))
            .take_while(move |(path, _)| path.starts_with(dir))
            .filter(move |(path, _)| path.parent() == Some(dir))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepPlan {
    pub broken_links: Vec<PathBuf>,
    /// Deepest first, so each directory is empty by the time it is removed.
    pub empty_dirs: Vec<PathBuf>,
}

impl SweepPlan {
    pub fn is_empty(&self) -> bool {
        self.broken_links.is_empty() && self.empty_dirs.is_empty()
    }
}

/// Broken links, plus directories that hold nothing but broken links and
/// other such directories. The library root itself is never listed.
pub fn plan_sweep(snapshot: &TreeSnapshot) -> SweepPlan {
    let broken_links: Vec<PathBuf> = snapshot
        .entries
        .iter()
        .filter(|(_, kind)| **kind == EntryKind::BrokenLink)
        .map(|(path, _)| path.clone())
        .collect();

    let mut dirs: Vec<&PathBuf> = snapshot
        .entries
        .iter()
        .filter(|(_, kind)| **kind == EntryKind::Dir)
        .map(|(path, _)| path)
        .collect();
    dirs.sort_by_key(|path| std::cmp::Reverse(path.components().count()));

    let mut removable: BTreeMap<&Path, bool> = BTreeMap::new();
    let mut empty_dirs = Vec::new();
    for dir in dirs {
        if *dir == snapshot.root {
            continue;
        }
        let clears = snapshot.children(dir).all(|(child, kind)| match kind {
            EntryKind::BrokenLink => true,
            EntryKind::Dir => removable.get(child.as_path()).copied().unwrap_or(false),
            EntryKind::LiveLink | EntryKind::File => false,
        });
        removable.insert(dir.as_path(), clears);
        if clears {
            empty_dirs.push(dir.clone());
        }
    }

    SweepPlan {
        broken_links,
        empty_dirs,
    }
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub removed_links: usize,
    pub removed_dirs: usize,
    pub skipped: Vec<(PathBuf, io::Error)>,
}

/// Carry out `plan`. Each link is re-checked before removal so one that was
/// repaired after the snapshot survives; directories that turn out non-empty
/// are skipped.
pub fn apply_sweep(plan: &SweepPlan) -> SweepOutcome {
    let mut out = SweepOutcome::default();
    for link in &plan.broken_links {
        let still_broken = fs::symlink_metadata(link)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false)
            && fs::metadata(link).is_err();
        if !still_broken {
            continue;
        }
        match fs::remove_file(link) {
            Ok(()) => out.removed_links += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => out.skipped.push((link.clone(), err)),
        }
    }
    for dir in &plan.empty_dirs {
        match fs::remove_dir(dir) {
            Ok(()) => out.removed_dirs += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => out.skipped.push((dir.clone(), err)),
        }
    }
    out
}

/// Snapshot, plan, and apply against the library's link tree.
pub fn sweep(paths: &ShelfPaths, dry_run: bool) -> Result<(SweepPlan, SweepOutcome)> {
    let snapshot = TreeSnapshot::capture(&paths.library_root, &paths.link_tree_exclusions())?;
    let plan = plan_sweep(&snapshot);
    let outcome = if dry_run {
        SweepOutcome::default()
    } else {
        apply_sweep(&plan)
    };
    Ok((plan, outcome))
}
