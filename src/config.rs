use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How archive entries are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    pub fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Deflated => zip::CompressionMethod::Deflated,
            Compression::Stored => zip::CompressionMethod::Stored,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the request log file is created in
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Write the per-request log file at all
    #[serde(default = "default_request_log")]
    pub request_log: bool,

    /// Directory for scratch archives (system temp dir when unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Only serve paths that canonicalize under this directory
    #[serde(default)]
    pub allowed_root: Option<PathBuf>,

    /// Compression for archive entries
    #[serde(default)]
    pub compression: Compression,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_request_log() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            request_log: default_request_log(),
            scratch_dir: None,
            allowed_root: None,
            compression: Compression::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
