// ABOUTME: Platform config and data directories for goob.
// ABOUTME: Default locations for the config file, the SQLite database, and rolling logs.

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "goob";
const APPLICATION: &str = "goob";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// e.g. ~/.local/share/goob/, falling back to ./data
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default conversation database
pub fn db_file() -> PathBuf {
    data_dir().join("goob.sqlite")
}

/// e.g. ~/.config/goob/, falling back to the current directory
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
