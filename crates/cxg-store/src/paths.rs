use std::env;
use std::path::PathBuf;

/// Default base directory for cxg storage.
fn default_base_dir() -> PathBuf {
    dirs_home().join(".cxg")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `$CXG_DATA_DIR/patterns.db`, falling back to `~/.cxg/patterns.db`.
pub fn default_db_path() -> PathBuf {
    data_dir(env::var("CXG_DATA_DIR").ok()).join("patterns.db")
}

fn data_dir(override_dir: Option<String>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_base_dir(),
    }
}
