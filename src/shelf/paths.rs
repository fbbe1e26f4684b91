use crate::shelf::util::lexical_normalize;
use anyhow::{Context, Result};
use std::env;
use std::path::{self, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ShelfPaths {
    pub library_root: PathBuf,
    pub files_dir: PathBuf,
    pub state_dir: PathBuf,
    pub catalog_file: PathBuf,
    pub logs_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl ShelfPaths {
    pub fn from_root(library_root: PathBuf) -> Self {
        let files_dir = library_root.join("Files");
        let state_dir = library_root.join(".bibshelf");
        Self::with_dirs(library_root, files_dir, state_dir)
    }

    pub fn with_dirs(library_root: PathBuf, files_dir: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            catalog_file: state_dir.join("catalog.jsonl"),
            logs_dir: state_dir.join("logs"),
            lock_file: state_dir.join("bibshelf.lock"),
            library_root,
            files_dir,
            state_dir,
        }
    }

    /// Directories under the library root that are not part of the link tree.
    pub fn link_tree_exclusions(&self) -> Vec<PathBuf> {
        vec![self.files_dir.clone(), self.state_dir.clone()]
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

/// `dir` made absolute against the working directory, with `.` and `..` folded.
pub fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    let absolute = path::absolute(dir)
        .with_context(|| format!("failed to resolve {} to an absolute path", dir.display()))?;
    Ok(lexical_normalize(&absolute))
}

pub fn resolve_paths() -> Result<ShelfPaths> {
    let library_root = match env::var("BIBSHELF_LIBRARY_ROOT") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join("Papers"),
    };
    let library_root = absolute_dir(&library_root)?;
    let files_dir = env_or_default_path("BIBSHELF_FILES_DIR", library_root.join("Files"));
    let state_dir = env_or_default_path("BIBSHELF_STATE_DIR", library_root.join(".bibshelf"));
    let files_dir = absolute_dir(&files_dir)?;
    let state_dir = absolute_dir(&state_dir)?;

    Ok(ShelfPaths::with_dirs(library_root, files_dir, state_dir))
}

#[cfg(test)]
mod tests {
    use super::{ShelfPaths, absolute_dir};
    use std::path::PathBuf;

    #[test]
    fn relative_dirs_are_anchored_at_cwd() {
        let cwd = std::env::current_dir().expect("cwd");
        let resolved = absolute_dir(&PathBuf::from("./Papers/../Papers/Files")).expect("absolute");
        assert!(resolved.is_absolute());
        assert_eq!(resolved, cwd.join("Papers/Files"));
        assert_eq!(
            absolute_dir(&PathBuf::from("/papers/./Files")).expect("absolute"),
            PathBuf::from("/papers/Files")
        );
    }

    #[test]
    fn derived_paths_follow_state_dir() {
        let paths = ShelfPaths::from_root(PathBuf::from("/papers"));
        assert_eq!(paths.files_dir, PathBuf::from("/papers/Files"));
        assert_eq!(
            paths.catalog_file,
            PathBuf::from("/papers/.bibshelf/catalog.jsonl")
        );
        assert_eq!(
            paths.link_tree_exclusions(),
            vec![
                PathBuf::from("/papers/Files"),
                PathBuf::from("/papers/.bibshelf")
            ]
        );
    }
}
