use crate::assembly::{CloudAssembly, SynthesizedStack};
use crate::error::{InfraError, Result};
use crate::regions::{verify_region, DEFAULT_REGION};
use crate::stacks::Stack;
use crate::variables::Context;

pub const REGION_CONTEXT_KEY: &str = "region";

/// root of the resource graph: the context it was invoked with and the
/// stacks it contains, in the order they get deployed.
#[derive(Debug)]
pub struct App {
    context: Context,
    stacks: Vec<Stack>,
}

impl App {
    pub fn new(context: Context) -> Self {
        Self { context, stacks: vec![] }
    }

    /// the region stacks get deployed to. Defaults to us-east-1.
    pub fn region(&self) -> Result<String> {
        let region = self
            .context
            .get_str(REGION_CONTEXT_KEY)?
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        verify_region(&region)?;
        Ok(region)
    }

    pub fn add_stack(&mut self, stack: Stack) {
        self.stacks.push(stack);
    }

    pub fn stacks(&self) -> &[Stack] {
        &self.stacks
    }

    /// renders every stack. A stack may only depend on stacks added before it,
    /// which makes the insertion order a valid deploy order.
    pub fn synth(&self) -> Result<CloudAssembly> {
        let region = self.region()?;
        let mut out = vec![];
        for (i, stack) in self.stacks.iter().enumerate() {
            for dep in stack.dependencies() {
                if self.stacks[..i].iter().any(|s| &s.stack_name == dep) {
                    continue;
                }
                if self.stacks[i..].iter().any(|s| &s.stack_name == dep) {
                    return Err(InfraError::DependencyOrder {
                        stack: stack.stack_name.clone(),
                        dependency: dep.clone(),
                    });
                }
                return Err(InfraError::UnknownStack(dep.clone()));
            }
            if self.stacks[..i].iter().any(|s| s.stack_name == stack.stack_name) {
                return Err(InfraError::InvalidStackName {
                    name: stack.stack_name.clone(),
                    reason: "a stack with this name was already added to the app".to_string(),
                });
            }
            let template = stack.to_template()?;
            tracing::info!(
                stack = %stack.stack_name,
                resources = template.resources.len(),
                outputs = template.outputs.len(),
                "synthesized stack"
            );
            out.push(SynthesizedStack {
                stack_name: stack.stack_name.clone(),
                template,
                dependencies: stack.dependencies().to_vec(),
            });
        }
        Ok(CloudAssembly { region, stacks: out })
    }
}
