use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// SHA-256 of a file's bytes, streamed.
pub fn file_hash(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Canonical form when the path exists, lexical form otherwise.
pub fn resolve_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| lexical_normalize(path))
}

/// Component-wise containment after resolving symlinks and `..`.
pub fn is_within(path: &Path, root: &Path) -> bool {
    resolve_path(path).starts_with(resolve_path(root))
}

pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move `from` to `to`, creating parents. Within one filesystem this is a
/// rename. Across filesystems the bytes are copied to a temp file beside the
/// target, verified against the source hash, persisted without clobbering,
/// and only then is the source removed. On error the source is untouched.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if from == to {
        return Ok(());
    }
    let parent = to
        .parent()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "target has no parent"))?;
    fs::create_dir_all(parent)?;

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::CrossesDevices => copy_verify_remove(from, to, parent),
        Err(err) => Err(err),
    }
}

fn copy_verify_remove(from: &Path, to: &Path, parent: &Path) -> io::Result<()> {
    let source_hash = file_hash(from)?;
    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    {
        let mut source = fs::File::open(from)?;
        io::copy(&mut source, staged.as_file_mut())?;
        staged.as_file().sync_all()?;
    }
    let staged_hash = file_hash(staged.path())?;
    if staged_hash != source_hash {
        return Err(io::Error::other(format!(
            "copy verification failed for {}",
            from.display()
        )));
    }
    staged.persist_noclobber(to).map_err(|err| err.error)?;
    fs::remove_file(from)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lexical_normalize_folds_dots() {
        assert_eq!(
            lexical_normalize(Path::new("/a/b/../c/./d.pdf")),
            PathBuf::from("/a/c/d.pdf")
        );
        assert_eq!(
            lexical_normalize(Path::new("../x")),
            PathBuf::from("../x")
        );
    }

    #[test]
    fn containment_is_component_wise() {
        let tmp = tempdir().expect("tempdir");
        let store = tmp.path().join("Files");
        let sibling = tmp.path().join("Files2");
        fs::create_dir_all(&store).expect("mkdir store");
        fs::create_dir_all(&sibling).expect("mkdir sibling");
        let inside = store.join("a.pdf");
        fs::write(&inside, b"x").expect("write");
        let outside = sibling.join("a.pdf");
        fs::write(&outside, b"x").expect("write");

        assert!(is_within(&inside, &store));
        assert!(!is_within(&outside, &store));
        assert!(is_within(&sibling.join("../Files/a.pdf"), &store));
    }

    #[test]
    fn move_creates_parents_and_removes_source() {
        let tmp = tempdir().expect("tempdir");
        let from = tmp.path().join("in.pdf");
        fs::write(&from, b"%PDF-1.4 widgets").expect("write");
        let to = tmp.path().join("Files/S/Smith2020.pdf");

        move_file(&from, &to).expect("move");
        assert!(!from.exists());
        assert_eq!(fs::read(&to).expect("read"), b"%PDF-1.4 widgets");
    }

    #[test]
    fn copy_path_verifies_and_refuses_to_clobber() {
        let tmp = tempdir().expect("tempdir");
        let from = tmp.path().join("in.pdf");
        fs::write(&from, b"new").expect("write");
        let to = tmp.path().join("out.pdf");
        fs::write(&to, b"old").expect("write");

        let err = copy_verify_remove(&from, &to, tmp.path()).expect_err("must not clobber");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&from).expect("read"), b"new");
        assert_eq!(fs::read(&to).expect("read"), b"old");

        fs::remove_file(&to).expect("rm");
        copy_verify_remove(&from, &to, tmp.path()).expect("copy");
        assert!(!from.exists());
        assert_eq!(fs::read(&to).expect("read"), b"new");
    }
}
