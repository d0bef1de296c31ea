// src/infra/paths.rs — Config and run-log locations
//
// All paths respect the FUNSEARCH_HOME environment variable for isolation.
// When unset, config lives in ~/.funsearch/ and run logs under the XDG data dir.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn funsearch_home() -> Option<PathBuf> {
    std::env::var_os("FUNSEARCH_HOME").map(PathBuf::from)
}

/// Home directory, falling back to the working directory when none is known.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $FUNSEARCH_HOME/ or ~/.funsearch/
pub fn config_dir() -> PathBuf {
    if let Some(home) = funsearch_home() {
        return home;
    }
    dirs_home().join(".funsearch")
}

/// Data directory: $FUNSEARCH_HOME/data/ or ~/.local/share/funsearch/
pub fn data_dir() -> PathBuf {
    if let Some(home) = funsearch_home() {
        return home.join("data");
    }
    ProjectDirs::from("", "", "funsearch")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| config_dir().join("data"))
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default parent directory for per-run profiler output.
pub fn runs_dir() -> PathBuf {
    data_dir().join("runs")
}
