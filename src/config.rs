use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::assembly::TemplateFormat;
use crate::error::{InfraError, Result};
use crate::variables::Context;

pub const CONFIG_FILE_NAME: &str = "infra.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "infra.out";

/// contents of `infra.toml`:
///
/// ```toml
/// [context]
/// environment = "dev"
/// region = "us-east-1"
///
/// [output]
/// dir = "infra.out"
/// format = "json"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfraConfig {
    pub context: toml::Table,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub format: TemplateFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            format: TemplateFormat::Json,
        }
    }
}

impl InfraConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| InfraError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| InfraError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// the `[context]` table as a context, to be overridden by
    /// dotenv and command line values.
    pub fn context(&self) -> Context {
        let mut ctx = Context::new();
        ctx.apply_table(self.context.clone());
        ctx
    }
}

/// given a search dir, see if infra.toml exists in this dir, and if so,
/// return the path to it. If not found, back up 1 dir at a time
/// (limit 5 dirs searched in total).
pub fn find_config_file<P: AsRef<Path>>(start_dir: P) -> Option<PathBuf> {
    let mut search_dir = start_dir.as_ref().to_path_buf();
    for _ in 0..5 {
        let candidate = search_dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !search_dir.pop() {
            break;
        }
    }
    None
}
