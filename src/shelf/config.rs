use crate::error::ShelfErrorCode;
use crate::shelf::linkspec::LinkCategory;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStrategy {
    /// `Files/<first key chars>/<key>.<ext>`
    Key,
    /// `Files/<first hex chars>/<sha256>.<ext>`
    Fingerprint,
}

impl PlacementStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Fingerprint => "fingerprint",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub strategy: PlacementStrategy,
    pub bucket_chars: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            strategy: PlacementStrategy::Key,
            bucket_chars: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub categories: Vec<LinkCategory>,
    pub keyword_delimiters: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            categories: LinkCategory::ALL.to_vec(),
            keyword_delimiters: ",;".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkerConfig {
    /// 0 means one worker per available CPU.
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub after_sync: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { after_sync: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShelfConfig {
    pub placement: PlacementConfig,
    pub links: LinkConfig,
    pub workers: WorkerConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialShelfConfig {
    placement: Option<PlacementConfig>,
    links: Option<LinkConfig>,
    workers: Option<WorkerConfig>,
    sweep: Option<SweepConfig>,
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_csv(var: &str) -> Option<Vec<String>> {
    let raw = env::var(var).ok()?;
    let out = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();
    if out.is_empty() { None } else { Some(out) }
}

fn invalid(message: String) -> anyhow::Error {
    anyhow!("{}: {message}", ShelfErrorCode::E003ConfigInvalid.as_str())
}

fn validate(cfg: &ShelfConfig) -> Result<()> {
    if !(1..=8).contains(&cfg.placement.bucket_chars) {
        return Err(invalid(
            "invalid placement bucket_chars: require 1 <= bucket_chars <= 8".to_string(),
        ));
    }
    if cfg.links.keyword_delimiters.is_empty() {
        return Err(invalid(
            "invalid keyword delimiters: cannot be empty".to_string(),
        ));
    }
    if cfg.links.categories.is_empty() {
        return Err(invalid(
            "invalid link categories: enable at least one category".to_string(),
        ));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("BIBSHELF_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let config = dirs::config_dir()?;
    Some(config.join("bibshelf").join("config.toml"))
}

fn merge_file_config(base: &mut ShelfConfig) -> Result<Option<PathBuf>> {
    let Some(path) = resolve_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PartialShelfConfig = toml::from_str(&raw).map_err(|err| {
        invalid(format!(
            "failed to parse bibshelf config {}: {err}",
            path.display()
        ))
    })?;
    if let Some(placement) = parsed.placement {
        base.placement = placement;
    }
    if let Some(links) = parsed.links {
        base.links = links;
    }
    if let Some(workers) = parsed.workers {
        base.workers = workers;
    }
    if let Some(sweep) = parsed.sweep {
        base.sweep = sweep;
    }
    Ok(Some(path))
}

fn apply_env_overrides(cfg: &mut ShelfConfig) -> Result<()> {
    let strategy = env_or_string(
        "BIBSHELF_PLACEMENT_STRATEGY",
        cfg.placement.strategy.as_str(),
    );
    cfg.placement.strategy = match strategy.to_ascii_lowercase().as_str() {
        "key" => PlacementStrategy::Key,
        "fingerprint" => PlacementStrategy::Fingerprint,
        other => {
            return Err(invalid(format!(
                "invalid placement strategy `{other}`: use `key` or `fingerprint`"
            )));
        }
    };
    cfg.placement.bucket_chars = env_or_usize("BIBSHELF_BUCKET_CHARS", cfg.placement.bucket_chars);
    cfg.links.keyword_delimiters =
        env_or_string("BIBSHELF_KEYWORD_DELIMITERS", &cfg.links.keyword_delimiters);
    if let Some(names) = env_csv("BIBSHELF_LINK_CATEGORIES") {
        let mut categories = Vec::with_capacity(names.len());
        for name in names {
            let category = name.parse::<LinkCategory>().map_err(invalid)?;
            categories.push(category);
        }
        cfg.links.categories = categories;
    }
    cfg.workers.threads = env_or_usize("BIBSHELF_WORKERS", cfg.workers.threads);
    cfg.sweep.after_sync = env_or_bool("BIBSHELF_SWEEP_AFTER_SYNC", cfg.sweep.after_sync);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ShelfConfig,
    pub source: Option<PathBuf>,
}

pub fn load_config() -> Result<LoadedConfig> {
    let mut cfg = ShelfConfig::default();
    let source = merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;
    Ok(LoadedConfig {
        config: cfg,
        source,
    })
}
