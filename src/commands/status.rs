use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::shelf::config::load_config;
use crate::shelf::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/bibshelf_env_allowlist.rs"));

const ENV_PREFIX: &str = "BIBSHELF_";

/// `BIBSHELF_*` names set in the environment that no code reads.
fn unknown_env_vars<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = names
        .into_iter()
        .filter(|name| name.starts_with(ENV_PREFIX))
        .filter(|name| !GENERATED_BIBSHELF_ENV_ALLOWLIST.contains(&name.as_str()))
        .collect();
    out.sort();
    out
}

/// First source file that reads `name`.
fn env_source(name: &str) -> Option<&'static str> {
    GENERATED_BIBSHELF_ENV_SOURCES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, file)| *file)
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    report.detail(format!("build_id={}", env!("BUILD_UUID")));

    let paths = resolve_paths()?;
    report.detail(format!("library_root={}", paths.library_root.display()));
    report.detail(format!("files_dir={}", paths.files_dir.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("catalog={}", paths.catalog_file.display()));
    if !paths.library_root.is_dir() {
        report.detail("library_root.exists=false".to_string());
    }

    match load_config() {
        Ok(loaded) => {
            let cfg = &loaded.config;
            match &loaded.source {
                Some(source) => report.detail(format!("config_file={}", source.display())),
                None => report.detail("config_file=defaults".to_string()),
            }
            report.detail(format!("placement.strategy={}", cfg.placement.strategy.as_str()));
            report.detail(format!("placement.bucket_chars={}", cfg.placement.bucket_chars));
            let categories: Vec<&str> = cfg.links.categories.iter().map(|c| c.dir_name()).collect();
            report.detail(format!("links.categories={}", categories.join(",")));
            report.detail(format!("workers.threads={}", cfg.workers.threads));
            report.detail(format!("sweep.after_sync={}", cfg.sweep.after_sync));
        }
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }

    let set: Vec<String> = env::vars()
        .map(|(name, _)| name)
        .filter(|name| name.starts_with(ENV_PREFIX))
        .collect();
    for name in &set {
        match env_source(name) {
            Some(file) => report.detail(format!("env.{name}=set read_in={file}")),
            None => report.detail(format!("env.{name}=set")),
        }
    }
    for name in unknown_env_vars(set) {
        report.issue(format!("unknown environment variable {name} (typo?)"));
    }

    Ok(report)
}
