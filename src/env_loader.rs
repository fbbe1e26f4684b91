use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(state_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(dir) = state_home {
        return Some(dir.join(".env"));
    }
    Some(home_dir?.join(".bibshelf/.env"))
}

/// Load `.env` from the working directory, else from `BIBSHELF_STATE_DIR` or
/// `~/.bibshelf`. Variables already set in the environment win.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("BIBSHELF_STATE_DIR").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
