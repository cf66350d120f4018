use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{InfraError, Result};

mod s3_bucket;
pub use s3_bucket::*;
mod cloudfront;
pub use cloudfront::*;
mod iam;
pub use iam::*;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const POLICY_VERSION: &str = "2012-10-17";

/// a cloudformation resource type. Implementors describe their `Type` and
/// `Properties`; the stack turns them into template entries.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Value;

    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }

    /// logical ids this resource must be created after
    fn depends_on(&self) -> Vec<String> {
        vec![]
    }

    /// what cloudformation does with the physical resource when it is
    /// removed from the template or replaced. `None` leaves the default.
    fn removal_policy(&self) -> Option<RemovalPolicy> {
        None
    }
}

pub struct Resource {
    pub name: String,
    pub properties: Box<dyn CfnResource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputExport {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Export", default, skip_serializing_if = "Option::is_none")]
    pub export: Option<OutputExport>,
}

/// BTreeMaps keep the serialized key order stable, so synthesizing the same
/// input twice yields byte-identical templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    /// every resource of the given cloudformation type, keyed by logical id
    pub fn resources_of_type<'a>(
        &'a self,
        ty: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }
}

pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn import_value(export_name: &str) -> Value {
    json!({ "Fn::ImportValue": export_name })
}

/// `{ "Fn::Sub": [template, { var: value, ... }] }`. Without variables this
/// is the short `{ "Fn::Sub": template }` form.
pub fn sub(template: &str, variables: &[(&str, Value)]) -> Value {
    if variables.is_empty() {
        return json!({ "Fn::Sub": template });
    }
    let mut vars = Map::new();
    for (name, value) in variables {
        vars.insert(name.to_string(), value.clone());
    }
    json!({ "Fn::Sub": [template, Value::Object(vars)] })
}

/// turns a construct id such as `dev-HostingBucket` into a cloudformation
/// logical id by dropping everything that isn't alphanumeric.
pub fn to_logical_id(construct_id: &str) -> String {
    construct_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

pub fn verify_resource_name(resource_name: &str) -> Result<()> {
    let reason = if resource_name.len() > 255 {
        "must be at most 255 characters"
    } else if resource_name.is_empty() {
        "Must contain at least 1 character"
    } else if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        "Must contain only alphanumeric characters [A-Za-z0-9]"
    } else {
        return Ok(());
    };
    Err(InfraError::InvalidLogicalId {
        name: resource_name.to_string(),
        reason: reason.to_string(),
    })
}

/// one `Allow` statement of an IAM policy document.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub principal: Option<Value>,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub condition: Option<Value>,
}

impl PolicyStatement {
    pub fn allow<S: AsRef<str>>(actions: &[S], resources: Vec<Value>) -> Self {
        Self {
            principal: None,
            actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resources,
            condition: None,
        }
    }

    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    /// single actions/resources are written as a plain value rather
    /// than a one element list.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("Effect".to_string(), json!("Allow"));
        if let Some(principal) = &self.principal {
            map.insert("Principal".to_string(), principal.clone());
        }
        let actions: Vec<Value> = self.actions.iter().map(|a| Value::String(a.clone())).collect();
        map.insert("Action".to_string(), one_or_many(actions));
        if !self.resources.is_empty() {
            map.insert("Resource".to_string(), one_or_many(self.resources.clone()));
        }
        if let Some(condition) = &self.condition {
            map.insert("Condition".to_string(), condition.clone());
        }
        Value::Object(map)
    }
}

fn one_or_many(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statements: Vec<PolicyStatement>) -> Self {
        Self { statements }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn to_value(&self) -> Value {
        json!({
            "Version": POLICY_VERSION,
            "Statement": self.statements.iter().map(|s| s.to_value()).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_ids_drop_non_alphanumerics() {
        assert_eq!(to_logical_id("dev-HostingBucket"), "devHostingBucket");
        assert_eq!(to_logical_id("prod_Some.Thing-1"), "prodSomeThing1");
        assert!(verify_resource_name("devHostingBucket").is_ok());
    }

    #[test]
    fn resource_names_are_validated() {
        assert!(verify_resource_name("").is_err());
        assert!(verify_resource_name("dev-bucket").is_err());
        assert!(verify_resource_name(&"a".repeat(255)).is_ok());
        let err = verify_resource_name(&"a".repeat(256)).unwrap_err();
        assert!(err.to_string().contains("must be at most 255 characters"));
        let err = verify_resource_name("has space").unwrap_err();
        assert!(err.to_string().contains("Must contain only alphanumeric characters"));
    }

    #[test]
    fn statements_collapse_single_values() {
        let st = PolicyStatement::allow(&["cloudformation:DescribeStacks"], vec![json!("*")]);
        assert_eq!(st.to_value(), json!({
            "Effect": "Allow",
            "Action": "cloudformation:DescribeStacks",
            "Resource": "*",
        }));

        let st = PolicyStatement::allow(&["s3:PutObject", "s3:DeleteObject"], vec![json!("*")]);
        assert_eq!(st.to_value()["Action"], json!(["s3:PutObject", "s3:DeleteObject"]));
    }

    #[test]
    fn statements_carry_principal_and_condition() {
        let st = PolicyStatement::allow(&["sts:AssumeRole"], vec![])
            .with_principal(json!({ "Service": "lambda.amazonaws.com" }))
            .with_condition(json!({ "StringEquals": { "a": "b" } }));
        let val = st.to_value();
        assert_eq!(val["Principal"]["Service"], "lambda.amazonaws.com");
        assert_eq!(val["Condition"]["StringEquals"]["a"], "b");
        assert!(val.get("Resource").is_none());
    }

    #[test]
    fn sub_uses_short_form_without_variables() {
        assert_eq!(sub("arn:aws:s3:::x/*", &[]), json!({ "Fn::Sub": "arn:aws:s3:::x/*" }));
        let val = sub("arn:aws:s3:::${Name}/*", &[("Name", import_value("stack:Name"))]);
        assert_eq!(val["Fn::Sub"][1]["Name"]["Fn::ImportValue"], "stack:Name");
    }

    #[test]
    fn template_omits_empty_sections() {
        let template = SavedTemplate::default();
        let val = serde_json::to_value(&template).unwrap();
        assert_eq!(val["AWSTemplateFormatVersion"], TEMPLATE_FORMAT_VERSION);
        assert!(val.get("Outputs").is_none());
        assert!(val.get("Description").is_none());
    }
}
