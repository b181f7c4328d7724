use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kinetrace").map(|pd| pd.config_dir().join("config.json"))
    }

    /// Where analysis output lands when no `--out` is given.
    pub fn output_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("kinetrace")
                .join("analysis")
        } else {
            ProjectDirs::from("", "", "kinetrace")
                .map(|pd| pd.data_local_dir().join("analysis"))
                .unwrap_or_else(|| PathBuf::from("analysis"))
        }
    }
}
