//! Synthesizes the CloudFormation templates for the acme frontend: a private
//! hosting bucket behind CloudFront, and the IAM roles GitHub Actions assumes
//! to deploy to it.

pub mod error;
pub mod parsing;
pub mod variables;
pub mod environment;
pub mod regions;
pub mod resources;
pub mod stacks;
pub mod app;
pub mod assembly;
pub mod config;

pub use app::App;
pub use assembly::{CloudAssembly, TemplateFormat};
pub use environment::EnvironmentName;
pub use error::{InfraError, Result};
pub use variables::Context;

use stacks::{DeploymentStack, HostingStack};

/// resolves the environment from `context` and builds the hosting stack,
/// then the deployment stack that depends on it.
pub fn build_app(context: Context) -> Result<App> {
    let environment = EnvironmentName::resolve(&context)?;
    tracing::info!(%environment, "building app");

    let mut app = App::new(context);
    let hosting = HostingStack::new(environment)?;
    let deployment = DeploymentStack::new(environment, &hosting.outputs)?;
    app.add_stack(hosting.stack);
    app.add_stack(deployment.stack);
    Ok(app)
}

pub fn synthesize(context: Context) -> Result<CloudAssembly> {
    build_app(context)?.synth()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::ENVIRONMENT_CONTEXT_KEY;

    fn context_for(env: &str) -> Context {
        let mut ctx = Context::new();
        ctx.set(ENVIRONMENT_CONTEXT_KEY, env);
        ctx
    }

    #[test]
    fn synthesis_without_environment_fails() {
        let err = synthesize(Context::new()).unwrap_err();
        assert!(matches!(err, InfraError::MissingContext { ref key } if key == "environment"));
    }

    #[test]
    fn synthesis_with_unknown_environment_fails() {
        let err = synthesize(context_for("qa")).unwrap_err();
        assert!(matches!(err, InfraError::InvalidEnvironment(ref v) if v == "qa"));
        assert!(err.to_string().contains("'qa'"));
    }

    #[test]
    fn synthesizes_hosting_then_deployment() {
        for env in EnvironmentName::ALL {
            let assembly = synthesize(context_for(env.as_str())).unwrap();
            let expected = vec![format!("{env}-HostingStack"), format!("{env}-DeploymentStack")];
            assert_eq!(assembly.stack_names(), expected);
            for stack in assembly.stacks.iter() {
                assert!(stack.stack_name.starts_with(&format!("{env}-")));
            }
            let hosting_name = assembly.stacks[0].stack_name.clone();
            assert_eq!(assembly.stacks[1].dependencies, vec![hosting_name]);
        }
    }

    #[test]
    fn deployment_imports_every_hosting_export() {
        let assembly = synthesize(context_for("dev")).unwrap();
        let hosting = &assembly.stacks[0].template;
        let deployment = serde_json::to_string(&assembly.stacks[1].template).unwrap();
        let exports: Vec<_> = hosting.outputs.values().filter_map(|o| o.export.as_ref()).collect();
        assert_eq!(exports.len(), 2);
        for export in exports {
            assert!(deployment.contains(&export.name), "{} is never imported", export.name);
        }
    }

    #[test]
    fn synthesis_is_deterministic() {
        for env in ["dev", "prod"] {
            let first = synthesize(context_for(env)).unwrap();
            let second = synthesize(context_for(env)).unwrap();
            assert_eq!(first, second);
            for (a, b) in first.stacks.iter().zip(second.stacks.iter()) {
                assert_eq!(
                    a.render(TemplateFormat::Json).unwrap(),
                    b.render(TemplateFormat::Json).unwrap()
                );
            }
        }
    }

    #[test]
    fn environments_do_not_share_names() {
        let dev = synthesize(context_for("dev")).unwrap();
        let prod = synthesize(context_for("prod")).unwrap();
        for (d, p) in dev.stacks.iter().zip(prod.stacks.iter()) {
            for id in d.template.resources.keys() {
                assert!(!p.template.resources.contains_key(id));
            }
        }
    }
}
