use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{InfraError, Result};
use crate::parsing::{parse_context_arg, parse_dotenv, ContextValue};

/// key/value store the app reads its invocation parameters from.
/// sources are merged in the order they are applied: later sources
/// override values of earlier ones.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Context {
    values: BTreeMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<K: AsRef<str>, V: Into<ContextValue>>(&mut self, key: K, val: V) {
        self.values.insert(key.as_ref().to_string(), val.into());
    }

    /// returns the string value of `key`, treating an empty string
    /// the same as a missing value.
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(val) => {
                let s = val.assert_str(key)?;
                if s.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(s))
                }
            }
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str(key)?
            .ok_or_else(|| InfraError::MissingContext { key: key.to_string() })
    }

    pub fn apply_table(&mut self, table: toml::Table) {
        for (key, val) in table {
            self.values.insert(key, val.into());
        }
    }

    /// applies `key=value` arguments as given on the command line
    pub fn apply_args<S: AsRef<str>>(&mut self, args: &[S]) -> Result<()> {
        for arg in args {
            let (key, val) = parse_context_arg(arg.as_ref())?;
            self.values.insert(key, val);
        }
        Ok(())
    }

    pub fn load_dot_env<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| InfraError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        for (key, val) in parse_dotenv(&contents) {
            self.values.insert(key, ContextValue::Str(val));
        }
        tracing::debug!(path = %path.display(), "loaded dotenv context");
        Ok(())
    }
}
