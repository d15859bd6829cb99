use std::path::{Path, PathBuf};

/// Application directory (~/.blogapp)
pub fn app_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".blogapp")
}

/// ~/.blogapp/config.json
pub fn config_json_path() -> PathBuf {
    app_dir().join("config.json")
}

/// File holding the persisted token pair inside a data directory.
pub fn tokens_path(data_dir: &Path) -> PathBuf {
    data_dir.join("tokens.json")
}

pub fn ensure_dir(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}
