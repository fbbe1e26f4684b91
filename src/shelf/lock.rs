use crate::error::ShelfErrorCode;
use crate::shelf::paths::ShelfPaths;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;

/// Exclusive hold on the library for one mutating command. Released on drop.
#[derive(Debug)]
pub struct LibraryLock {
    file: File,
}

impl LibraryLock {
    pub fn acquire(paths: &ShelfPaths) -> Result<Self> {
        fs::create_dir_all(&paths.state_dir)
            .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&paths.lock_file)
            .with_context(|| format!("failed to open {}", paths.lock_file.display()))?;
        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "{}: another bibshelf process holds {}",
                ShelfErrorCode::E001Locked.as_str(),
                paths.lock_file.display()
            );
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { file })
    }
}

impl Drop for LibraryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
