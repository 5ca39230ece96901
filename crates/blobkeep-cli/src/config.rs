use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Settings read from `blobkeep.toml`. Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage root directory.
    pub root: PathBuf,
    /// How many uploads may hold a temporary file at once (0 = unlimited).
    pub max_temp_files: usize,
    /// Channel capacity of the notification logger.
    pub listener_capacity: usize,
    /// Entries in the blob size cache (0 disables it).
    pub stat_cache_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./blobs"),
            max_temp_files: 64,
            listener_capacity: 16,
            stat_cache_entries: 1024,
        }
    }
}

impl Config {
    /// Load `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
