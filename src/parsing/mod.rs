use std::collections::BTreeMap;

use crate::error::{InfraError, Result};

/// A single context value. Values passed on the command line are always
/// strings, values from the config file can be nested.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Str(String),
    List(Vec<ContextValue>),
    Map(BTreeMap<String, ContextValue>),
}

impl ContextValue {
    fn type_name(&self) -> &'static str {
        match self {
            ContextValue::Str(_) => "string",
            ContextValue::List(_) => "list",
            ContextValue::Map(_) => "map",
        }
    }

    fn unexpected(&self, key: &str, expected: &'static str) -> InfraError {
        InfraError::UnexpectedContextType {
            key: key.to_string(),
            expected,
            found: format!("{} {:?}", self.type_name(), self),
        }
    }

    pub fn assert_str(&self, key: &str) -> Result<String> {
        match self {
            ContextValue::Str(s) => Ok(s.clone()),
            _ => Err(self.unexpected(key, "string")),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Str(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Str(value)
    }
}

impl From<toml::Value> for ContextValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ContextValue::Str(s),
            toml::Value::Integer(i) => ContextValue::Str(i.to_string()),
            toml::Value::Float(f) => ContextValue::Str(f.to_string()),
            toml::Value::Boolean(b) => ContextValue::Str(b.to_string()),
            toml::Value::Datetime(d) => ContextValue::Str(d.to_string()),
            toml::Value::Array(a) => ContextValue::List(a.into_iter().map(Into::into).collect()),
            toml::Value::Table(t) => {
                ContextValue::Map(t.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// parses a `key=value` argument as given via `-c key=value`.
/// only the first `=` splits, so values may contain `=` themselves.
pub fn parse_context_arg(arg: &str) -> Result<(String, ContextValue)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| InfraError::InvalidContextArg(arg.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(InfraError::InvalidContextArg(arg.to_string()));
    }
    Ok((key.to_string(), ContextValue::Str(value.to_string())))
}

/// parses dotenv style contents. blank lines and lines starting with `#`
/// are skipped, as are lines without a `=`.
pub fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = vec![];
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let val = val.trim();
            let val = val
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(val);
            out.push((key.trim().to_string(), val.to_string()));
        }
    }
    out
}
