use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cxg_core::EngineConfig;
use serde::Deserialize;

/// Contents of the optional `cxg.toml` file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub engine: EngineConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub limit: Option<usize>,
    pub maximal: bool,
    pub json: bool,
}

/// Explicit `--config` path, else `$CXG_CONFIG`.
pub fn resolve_path(flag: Option<&Path>) -> Option<PathBuf> {
    flag.map(Path::to_path_buf).or_else(|| {
        std::env::var("CXG_CONFIG")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    })
}

pub fn load(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = parse(&text).with_context(|| format!("invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}

pub fn parse(text: &str) -> Result<FileConfig> {
    Ok(toml::from_str(text)?)
}
