use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable naming an optional JSON config file.
pub const CONFIG_ENV: &str = "SOCIALED_CONFIG";
pub const DATA_DIR_ENV: &str = "SOCIALED_DATA_DIR";
pub const REPO_URL_ENV: &str = "SOCIALED_REPO_URL";
pub const BRANCH_ENV: &str = "SOCIALED_BRANCH";

pub const DEFAULT_REPO_URL: &str = "https://gitee.com/kkunshao/social-ed_datasets.git";
pub const DEFAULT_BRANCH: &str = "main";

/// Where datasets come from and where they are stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoaderConfig {
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Root under which each dataset gets its own directory.
    /// Defaults to `dataset/data` under the crate's install root.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
}

fn default_repo_url() -> String {
    DEFAULT_REPO_URL.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

/// `<install_root>/dataset/data`, independent of the working directory.
pub fn default_data_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("dataset").join("data")
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            repo_url: default_repo_url(),
            branch: default_branch(),
            data_root: default_data_root(),
        }
    }
}

impl LoaderConfig {
    /// Parse a JSON config file; missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults, then the file named by `SOCIALED_CONFIG`, then the
    /// individual `SOCIALED_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`LoaderConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => {
                debug!("Reading loader config from {path}");
                Self::from_file(Path::new(&path))?
            }
            None => Self::default(),
        };
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            config.data_root = PathBuf::from(dir);
        }
        if let Some(url) = lookup(REPO_URL_ENV) {
            config.repo_url = url;
        }
        if let Some(branch) = lookup(BRANCH_ENV) {
            config.branch = branch;
        }
        Ok(config)
    }

    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = LoaderConfig::default();
        assert_eq!(c.repo_url, DEFAULT_REPO_URL);
        assert_eq!(c.branch, "main");
        assert_eq!(c.data_root, default_data_root());
    }

    #[test]
    fn test_default_root_ignores_working_directory() {
        let root = default_data_root();
        assert!(root.is_absolute());
        assert!(root.ends_with("dataset/data"));
        assert!(root.starts_with(env!("CARGO_MANIFEST_DIR")));
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            (DATA_DIR_ENV, "/tmp/socialed"),
            (BRANCH_ENV, "dev"),
        ]);
        let c = LoaderConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.data_root, Path::new("/tmp/socialed"));
        assert_eq!(c.branch, "dev");
        assert_eq!(c.repo_url, DEFAULT_REPO_URL);
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socialed.json");
        std::fs::write(&path, r#"{"repo_url": "https://example.org/data.git", "branch": "v2"}"#)
            .unwrap();
        let path_str = path.to_string_lossy().to_string();
        let c = LoaderConfig::from_lookup(|k| match k {
            CONFIG_ENV => Some(path_str.clone()),
            BRANCH_ENV => Some("v3".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(c.repo_url, "https://example.org/data.git");
        assert_eq!(c.branch, "v3");
        assert_eq!(c.data_root, default_data_root());
    }

    #[test]
    fn test_bad_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(LoaderConfig::from_file(&path).is_err());
    }
}
