use std::path::PathBuf;

/// Everything that can stop a synthesis run.
#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    /// A required context value was not provided
    #[error("Context variable '{key}' is required. Pass it using -c {key}=<value>")]
    MissingContext { key: String },

    #[error("Invalid environment name '{0}'. Allowed values are: 'dev' or 'prod'.")]
    InvalidEnvironment(String),

    #[error("Invalid context argument {0:?}\nExpected the form key=value")]
    InvalidContextArg(String),

    #[error("Expected {expected} type at {key}. Instead found {found}")]
    UnexpectedContextType {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("Invalid region code {0:?}\nMust be one of the known AWS regions")]
    InvalidRegion(String),

    #[error("Invalid stack name {name}\n{reason}")]
    InvalidStackName { name: String, reason: String },

    #[error("Invalid resource name {name:?}\n{reason}")]
    InvalidLogicalId { name: String, reason: String },

    #[error("Duplicate logical id '{id}' in stack {stack}")]
    DuplicateLogicalId { stack: String, id: String },

    #[error("Validation failed on resource '{resource}'\n{reason}")]
    ResourceValidation { resource: String, reason: String },

    /// a role was given a permission outside of the set it is allowed to hold
    #[error("Role '{role}' may not be granted action '{action}'")]
    PolicyViolation { role: String, action: String },

    #[error("Stack '{0}' does not exist")]
    UnknownStack(String),

    #[error("Stack '{stack}' depends on '{dependency}', which must be added to the app before it")]
    DependencyOrder { stack: String, dependency: String },

    #[error("Failed to read {path:?}\n{source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path:?}\n{source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}\n{source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize template\n{0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to serialize template\n{0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl InfraError {
    /// true for the errors caused by a missing or malformed invocation
    /// parameter, as opposed to a bad value for a parameter that was given.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            InfraError::MissingContext { .. }
                | InfraError::InvalidContextArg(_)
                | InfraError::Config { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, InfraError>;
