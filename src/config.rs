use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file. A missing file is not an error:
    /// every option has a default and lane geometry is derived from the video
    /// resolution. A malformed file is fatal.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        let config: Config =
            serde_yaml::from_str(&contents).with_context(|| format!("failed to parse {}", path))?;
        Ok(config)
    }
}
