//! Canonical store placement: where a record's file lives and getting it there.

use crate::error::ShelfError;
use crate::shelf::config::{PlacementConfig, PlacementStrategy};
use crate::shelf::fingerprint::fingerprint;
use crate::shelf::normalize::normalize_segment;
use crate::shelf::paths::ShelfPaths;
use crate::shelf::record::{BibRecord, FILE_FIELD};
use crate::shelf::util::{file_hash, is_within, move_file, same_file};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const FALLBACK_BUCKET: &str = "_";
const DEFAULT_EXTENSION: &str = "pdf";

/// The record's backing file, if it is an absolute path to an existing
/// regular file that is not a symlink.
pub fn check_preconditions(record: &BibRecord) -> Result<PathBuf, ShelfError> {
    let precondition = |path: PathBuf, message: &str| ShelfError::Precondition {
        key: record.key.clone(),
        path,
        message: message.to_string(),
    };
    if record.key.trim().is_empty() {
        return Err(precondition(PathBuf::new(), "record has an empty key"));
    }
    let Some(file) = record.file() else {
        return Err(precondition(PathBuf::new(), "record has no `file` field"));
    };
    if !file.is_absolute() {
        return Err(precondition(file, "`file` must be an absolute path"));
    }
    match fs::symlink_metadata(&file) {
        Ok(meta) if meta.file_type().is_symlink() => Err(precondition(
            file,
            "`file` is a symbolic link; point the record at the real file",
        )),
        Ok(meta) if meta.is_file() => Ok(file),
        Ok(_) => Err(precondition(file, "`file` is not a regular file")),
        Err(source) => Err(ShelfError::Io {
            key: record.key.clone(),
            path: file,
            action: "stat",
            source,
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPlacement {
    pub key: String,
    pub from: PathBuf,
    pub to: PathBuf,
    /// The file was already somewhere under the canonical store.
    pub in_store: bool,
}

impl PlannedPlacement {
    pub fn needs_move(&self) -> bool {
        self.from != self.to && !same_file(&self.from, &self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    InPlace,
    Moved,
    /// An identical copy already sat at the target; the source was dropped.
    Deduplicated,
}

#[derive(Debug, Default)]
pub struct PlacementOutcome {
    /// Records whose file came from outside the canonical store.
    pub added: Vec<usize>,
    /// Records moved from one store path to another.
    pub relocated: Vec<usize>,
    pub in_place: usize,
    pub deduplicated: usize,
    /// Path each moved record had before placement.
    pub previous_paths: BTreeMap<usize, PathBuf>,
    pub failures: Vec<(usize, ShelfError)>,
}

impl PlacementOutcome {
    pub fn failed(&self, idx: usize) -> bool {
        self.failures.iter().any(|(i, _)| *i == idx)
    }
}

pub struct PlacementEngine<'a> {
    paths: &'a ShelfPaths,
    cfg: &'a PlacementConfig,
}

impl<'a> PlacementEngine<'a> {
    pub fn new(paths: &'a ShelfPaths, cfg: &'a PlacementConfig) -> Self {
        Self { paths, cfg }
    }

    fn identity(&self, record: &BibRecord) -> Result<String, ShelfError> {
        let identity = match self.cfg.strategy {
            PlacementStrategy::Key => normalize_segment(&record.key).replace(' ', "_"),
            PlacementStrategy::Fingerprint => fingerprint(record, &[FILE_FIELD]),
        };
        if identity.is_empty() {
            return Err(ShelfError::Precondition {
                key: record.key.clone(),
                path: record.file().unwrap_or_default(),
                message: "key has no filesystem-safe characters".to_string(),
            });
        }
        Ok(identity)
    }

    fn bucket(&self, identity: &str) -> String {
        let bucket: String = identity
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(self.cfg.bucket_chars)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if bucket.is_empty() {
            FALLBACK_BUCKET.to_string()
        } else {
            bucket
        }
    }

    /// `<files>/<bucket>/<identity>.<ext>`, a pure function of the record.
    pub fn canonical_target(&self, record: &BibRecord) -> Result<PathBuf, ShelfError> {
        let identity = self.identity(record)?;
        let extension = record
            .file()
            .and_then(|f| f.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase))
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        Ok(self
            .paths
            .files_dir
            .join(self.bucket(&identity))
            .join(format!("{identity}.{extension}")))
    }

    /// Targets for every record. Two records claiming one target is a
    /// collision; the first in batch order keeps it.
    pub fn plan(&self, records: &[BibRecord]) -> Vec<Result<PlannedPlacement, ShelfError>> {
        let mut claimed: BTreeMap<PathBuf, String> = BTreeMap::new();
        records
            .iter()
            .map(|record| {
                let from = check_preconditions(record)?;
                let to = self.canonical_target(record)?;
                if let Some(owner) = claimed.get(&to) {
                    return Err(ShelfError::Collision {
                        key: record.key.clone(),
                        path: to,
                        other: format!("record {owner} in the same batch"),
                    });
                }
                claimed.insert(to.clone(), record.key.clone());
                Ok(PlannedPlacement {
                    key: record.key.clone(),
                    in_store: is_within(&from, &self.paths.files_dir),
                    from,
                    to,
                })
            })
            .collect()
    }

    fn apply_one(
        &self,
        record: &mut BibRecord,
        plan: &PlannedPlacement,
    ) -> Result<PlacementKind, ShelfError> {
        let io_err = |action: &'static str, path: &Path, source| ShelfError::Io {
            key: plan.key.clone(),
            path: path.to_path_buf(),
            action,
            source,
        };

        if !plan.needs_move() {
            if record.file().as_deref() != Some(plan.to.as_path()) {
                record.set_file(&plan.to);
            }
            return Ok(PlacementKind::InPlace);
        }

        let kind = match fs::symlink_metadata(&plan.to) {
            Ok(_) => {
                let ours = file_hash(&plan.from).map_err(|e| io_err("hash", &plan.from, e))?;
                let theirs = file_hash(&plan.to).map_err(|e| io_err("hash", &plan.to, e))?;
                if ours != theirs {
                    return Err(ShelfError::Collision {
                        key: plan.key.clone(),
                        path: plan.to.clone(),
                        other: format!(
                            "existing file with different content (source {})",
                            plan.from.display()
                        ),
                    });
                }
                fs::remove_file(&plan.from).map_err(|e| io_err("remove duplicate", &plan.from, e))?;
                PlacementKind::Deduplicated
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                move_file(&plan.from, &plan.to).map_err(|e| io_err("move", &plan.from, e))?;
                PlacementKind::Moved
            }
            Err(err) => return Err(io_err("stat", &plan.to, err)),
        };

        record.set_file(&plan.to);
        Ok(kind)
    }

    /// Plan, then move every record's file into the store on `pool`. A
    /// failure leaves that record's file and `file` field untouched and does
    /// not stop the others.
    pub fn place(&self, records: &mut [BibRecord], pool: &rayon::ThreadPool) -> PlacementOutcome {
        let plans = self.plan(records);
        let results: Vec<(usize, Result<(PlannedPlacement, PlacementKind), ShelfError>)> = pool
            .install(|| {
                records
                    .par_iter_mut()
                    .zip(plans.into_par_iter())
                    .enumerate()
                    .map(|(idx, (record, plan))| {
                        let result = plan.and_then(|plan| {
                            let kind = self.apply_one(record, &plan)?;
                            Ok((plan, kind))
                        });
                        (idx, result)
                    })
                    .collect()
            });

        let mut out = PlacementOutcome::default();
        for (idx, result) in results {
            match result {
                Ok((plan, kind)) => {
                    if !plan.in_store {
                        out.added.push(idx);
                    } else if kind != PlacementKind::InPlace {
                        out.relocated.push(idx);
                    }
                    match kind {
                        PlacementKind::InPlace => out.in_place += 1,
                        PlacementKind::Deduplicated => out.deduplicated += 1,
                        PlacementKind::Moved => {}
                    }
                    if kind != PlacementKind::InPlace {
                        out.previous_paths.insert(idx, plan.from);
                    }
                }
                Err(err) => out.failures.push((idx, err)),
            }
        }
        out
    }
}
