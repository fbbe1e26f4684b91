use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

const ENV_PREFIX: &str = "BIBSHELF_";
/// Tokens with the prefix that are output markers, not variables.
const NOT_VARIABLES: &[&str] = &["BIBSHELF_WARN"];

fn is_name_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'
}

/// Whole identifier-like tokens that start with the prefix. A prefix inside a
/// longer identifier does not count.
fn env_names(source: &str) -> impl Iterator<Item = &str> {
    source
        .split(|c: char| !is_name_char(c))
        .filter(|token| token.len() > ENV_PREFIX.len() && token.starts_with(ENV_PREFIX))
        .filter(|token| !NOT_VARIABLES.contains(token))
}

/// Source text before the unit test module.
fn non_test_source(source: &str) -> &str {
    source
        .find("mod tests {")
        .map_or(source, |end| &source[..end])
}

/// Each variable mapped to the first source file, in walk order, that names
/// it outside of tests.
fn scan_sources(root: &Path) -> std::io::Result<BTreeMap<String, PathBuf>> {
    let mut found = BTreeMap::new();
    let files = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"));
    for entry in files {
        let source = fs::read_to_string(entry.path())?;
        for name in env_names(non_test_source(&source)) {
            found
                .entry(name.to_string())
                .or_insert_with(|| entry.path().to_path_buf());
        }
    }
    Ok(found)
}

fn write_allowlist(found: &BTreeMap<String, PathBuf>, out: &Path) -> std::io::Result<()> {
    let mut f = fs::File::create(out)?;
    writeln!(f, "pub const GENERATED_BIBSHELF_ENV_ALLOWLIST: &[&str] = &[")?;
    for name in found.keys() {
        writeln!(f, "    {name:?},")?;
    }
    writeln!(f, "];")?;
    writeln!(f, "pub const GENERATED_BIBSHELF_ENV_SOURCES: &[(&str, &str)] = &[")?;
    for (name, file) in found {
        let file = file.to_string_lossy().replace('\\', "/");
        writeln!(f, "    ({name:?}, {file:?}),")?;
    }
    writeln!(f, "];")?;
    Ok(())
}

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let found = scan_sources(Path::new("src")).expect("failed to scan src for BIBSHELF variables");
    write_allowlist(&found, &out_dir.join("bibshelf_env_allowlist.rs"))
        .expect("failed to write BIBSHELF env allowlist");

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("clock after epoch");
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_default();
    println!(
        "cargo:rustc-env=BUILD_UUID={version}+{:x}.{:x}",
        now.as_secs(),
        now.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
