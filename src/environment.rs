use std::fmt;
use std::str::FromStr;

use crate::error::{InfraError, Result};
use crate::variables::Context;

pub const ENVIRONMENT_CONTEXT_KEY: &str = "environment";

/// the environment a set of stacks is synthesized for. Every stack, resource
/// and trust condition is scoped by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentName {
    Dev,
    Prod,
}

impl EnvironmentName {
    pub const ALL: [EnvironmentName; 2] = [EnvironmentName::Dev, EnvironmentName::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentName::Dev => "dev",
            EnvironmentName::Prod => "prod",
        }
    }

    /// the git branch whose workflows are allowed to deploy this environment.
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.as_str())
    }

    /// reads the environment from context. Fails if it was not provided,
    /// or if it is not one of the known environments.
    pub fn resolve(context: &Context) -> Result<Self> {
        let value = context.require_str(ENVIRONMENT_CONTEXT_KEY)?;
        value.parse()
    }
}

impl FromStr for EnvironmentName {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dev" => Ok(EnvironmentName::Dev),
            "prod" => Ok(EnvironmentName::Prod),
            x => Err(InfraError::InvalidEnvironment(x.to_string())),
        }
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_environment_is_a_config_error() {
        let err = EnvironmentName::resolve(&Context::new()).unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(
            err.to_string(),
            "Context variable 'environment' is required. Pass it using -c environment=<value>"
        );
    }

    #[test]
    fn unknown_environment_names_the_value() {
        for bad in ["staging", "Dev", "PROD", " dev"] {
            let mut ctx = Context::new();
            ctx.set(ENVIRONMENT_CONTEXT_KEY, bad);
            let err = EnvironmentName::resolve(&ctx).unwrap_err();
            assert!(!err.is_config_error());
            assert_eq!(
                err.to_string(),
                format!("Invalid environment name '{bad}'. Allowed values are: 'dev' or 'prod'.")
            );
        }
    }

    #[test]
    fn known_environments_resolve() {
        for env in EnvironmentName::ALL {
            let mut ctx = Context::new();
            ctx.set(ENVIRONMENT_CONTEXT_KEY, env.as_str());
            assert_eq!(EnvironmentName::resolve(&ctx).unwrap(), env);
        }
        assert_eq!(EnvironmentName::Prod.branch_ref(), "refs/heads/prod");
    }
}
