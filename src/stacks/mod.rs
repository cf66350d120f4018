use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{InfraError, Result};
use crate::resources::*;

pub mod hosting;
pub mod deployment;

pub use hosting::{HostingStack, HostingOutputs};
pub use deployment::DeploymentStack;

/// a deployable unit: a named set of resources and outputs that becomes
/// one cloudformation template.
pub struct Stack {
    pub stack_name: String,
    pub description: Option<String>,
    resources: Vec<Resource>,
    outputs: BTreeMap<String, ResourceOutput>,
    /// names of stacks that must be deployed before this one
    dependencies: Vec<String>,
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("stack_name", &self.stack_name)
            .field("resources", &self.resources.iter().map(|r| &r.name).collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl Stack {
    pub fn new(stack_name: &str) -> Result<Self> {
        validate_stack_name(stack_name)?;
        Ok(Self {
            stack_name: stack_name.to_string(),
            description: None,
            resources: vec![],
            outputs: BTreeMap::new(),
            dependencies: vec![],
        })
    }

    pub fn has_resource(&self, logical_id: &str) -> bool {
        self.resources.iter().any(|r| r.name == logical_id)
    }

    pub fn add_resource<R: CfnResource + 'static>(
        &mut self,
        logical_id: &str,
        resource: R,
    ) -> Result<()> {
        verify_resource_name(logical_id)?;
        if self.has_resource(logical_id) {
            return Err(InfraError::DuplicateLogicalId {
                stack: self.stack_name.clone(),
                id: logical_id.to_string(),
            });
        }
        tracing::debug!(
            stack = %self.stack_name,
            logical_id,
            ty = resource.type_string(),
            "adding resource"
        );
        self.resources.push(Resource {
            name: logical_id.to_string(),
            properties: Box::new(resource),
        });
        Ok(())
    }

    pub fn add_output(
        &mut self,
        output_id: &str,
        value: Value,
        description: Option<&str>,
    ) -> Result<()> {
        self.insert_output(output_id, ResourceOutput {
            description: description.map(str::to_string),
            value,
            export: None,
        })
    }

    /// adds an output that other stacks can read via `Fn::ImportValue`.
    /// Returns the export name.
    pub fn export_output(
        &mut self,
        output_id: &str,
        value: Value,
        description: Option<&str>,
    ) -> Result<String> {
        let name = self.export_name(output_id);
        self.insert_output(output_id, ResourceOutput {
            description: description.map(str::to_string),
            value,
            export: Some(OutputExport { name: name.clone() }),
        })?;
        Ok(name)
    }

    fn insert_output(&mut self, output_id: &str, output: ResourceOutput) -> Result<()> {
        verify_resource_name(output_id)?;
        if self.outputs.contains_key(output_id) {
            return Err(InfraError::DuplicateLogicalId {
                stack: self.stack_name.clone(),
                id: output_id.to_string(),
            });
        }
        self.outputs.insert(output_id.to_string(), output);
        Ok(())
    }

    pub fn export_name(&self, output_id: &str) -> String {
        format!("{}:{}", self.stack_name, output_id)
    }

    pub fn add_dependency(&mut self, stack_name: &str) {
        if !self.dependencies.iter().any(|d| d == stack_name) {
            self.dependencies.push(stack_name.to_string());
        }
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// validates every resource and renders the template.
    pub fn to_template(&self) -> Result<SavedTemplate> {
        let mut out_template = SavedTemplate {
            description: self.description.clone(),
            ..Default::default()
        };
        for resource in self.resources.iter() {
            let props = &resource.properties;
            if let Err(reason) = props.validate() {
                return Err(InfraError::ResourceValidation {
                    resource: resource.name.clone(),
                    reason,
                });
            }
            let depends_on = props.depends_on();
            if let Some(missing) = depends_on.iter().find(|d| !self.has_resource(d)) {
                return Err(InfraError::ResourceValidation {
                    resource: resource.name.clone(),
                    reason: format!(
                        "depends on '{missing}' which is not part of stack {}",
                        self.stack_name
                    ),
                });
            }
            let removal = props.removal_policy();
            let saved_resource = SavedResource {
                ty: props.type_string().to_string(),
                properties: props.properties(),
                depends_on,
                deletion_policy: removal,
                update_replace_policy: removal,
            };
            out_template.resources.insert(resource.name.clone(), saved_resource);
        }
        out_template.outputs = self.outputs.clone();
        Ok(out_template)
    }
}

// A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
// It must start with an alphabetical character and can't be longer than 128 characters.
pub fn validate_stack_name(stack_name: &str) -> Result<()> {
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || InfraError::InvalidStackName {
        name: stack_name.to_string(),
        reason: restriction.to_string(),
    };
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    Ok(())
}
