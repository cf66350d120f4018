use serde_json::{json, Map, Value};

use super::*;
use crate::stacks::Stack;

pub const ASSUME_ROLE: &str = "sts:AssumeRole";
pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "sts:AssumeRoleWithWebIdentity";

pub struct InlinePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

#[derive(Default)]
pub struct CfnRole {
    pub role_name: Option<String>,
    pub description: Option<String>,
    pub assume_role_policy_document: PolicyDocument,
    pub managed_policy_arns: Vec<Value>,
    pub policies: Vec<InlinePolicy>,
}

impl CfnResource for CfnRole {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "AssumeRolePolicyDocument".to_string(),
            self.assume_role_policy_document.to_value(),
        );
        if let Some(name) = &self.role_name {
            map.insert("RoleName".to_string(), json!(name));
        }
        if let Some(desc) = &self.description {
            map.insert("Description".to_string(), json!(desc));
        }
        if !self.managed_policy_arns.is_empty() {
            map.insert(
                "ManagedPolicyArns".to_string(),
                Value::Array(self.managed_policy_arns.clone()),
            );
        }
        let policies: Vec<Value> = self.policies.iter()
            .filter(|p| !p.policy_document.is_empty())
            .map(|p| json!({
                "PolicyName": p.policy_name,
                "PolicyDocument": p.policy_document.to_value(),
            }))
            .collect();
        if !policies.is_empty() {
            map.insert("Policies".to_string(), Value::Array(policies));
        }
        Value::Object(map)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.assume_role_policy_document.is_empty() {
            return Err("role must have a trust policy".into());
        }
        if let Some(name) = &self.role_name {
            validate_role_name(name)?;
        }
        Ok(())
    }
}

/// Role names: up to 64 characters of `[A-Za-z0-9+=,.@_-]`
pub fn validate_role_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name.len() > 64 {
        return Err(format!("Invalid role name {name:?}\nMust be between 1 and 64 characters"));
    }
    let valid = |c: char| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c);
    if !name.chars().all(valid) {
        return Err(format!(
            "Invalid role name {name:?}\nMay only contain alphanumeric characters and +=,.@_-"
        ));
    }
    Ok(())
}

pub struct CfnOidcProvider {
    pub url: String,
    pub client_id_list: Vec<String>,
    pub thumbprint_list: Vec<String>,
}

impl CfnResource for CfnOidcProvider {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::OIDCProvider"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("Url".to_string(), json!(self.url));
        map.insert("ClientIdList".to_string(), json!(self.client_id_list));
        if !self.thumbprint_list.is_empty() {
            map.insert("ThumbprintList".to_string(), json!(self.thumbprint_list));
        }
        Value::Object(map)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !self.url.starts_with("https://") {
            return Err(format!("OIDC provider url must start with https://, found {:?}", self.url));
        }
        if self.client_id_list.is_empty() {
            return Err("OIDC provider needs at least one client id".into());
        }
        Ok(())
    }
}

/// an OIDC identity provider. `Ref` on the resource returns its ARN.
pub struct OpenIdConnectProvider {
    logical_id: String,
    cfn: CfnOidcProvider,
}

impl OpenIdConnectProvider {
    pub fn new(logical_id: &str, url: &str, client_ids: &[&str]) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            cfn: CfnOidcProvider {
                url: url.to_string(),
                client_id_list: client_ids.iter().map(|c| c.to_string()).collect(),
                thumbprint_list: vec![],
            },
        }
    }

    pub fn arn(&self) -> Value {
        get_ref(&self.logical_id)
    }

    pub fn add_to_stack(self, stack: &mut Stack) -> Result<()> {
        stack.add_resource(&self.logical_id, self.cfn)
    }
}

pub struct ServicePrincipal {
    pub service: String,
}

impl ServicePrincipal {
    pub fn new(service: &str) -> Self {
        Self { service: service.to_string() }
    }

    pub fn assume_role_policy(&self) -> PolicyDocument {
        PolicyDocument::new(vec![
            PolicyStatement::allow(&[ASSUME_ROLE], vec![])
                .with_principal(json!({ "Service": self.service })),
        ])
    }
}

/// a principal that is trusted through an identity federation provider,
/// narrowed down by conditions on the presented token's claims.
pub struct FederatedPrincipal {
    pub federated: Value,
    /// operator -> (condition key -> expected value)
    pub conditions: Value,
    pub assume_role_action: String,
}

impl FederatedPrincipal {
    pub fn new(federated: Value, conditions: Value, assume_role_action: &str) -> Self {
        Self {
            federated,
            conditions,
            assume_role_action: assume_role_action.to_string(),
        }
    }

    pub fn assume_role_policy(&self) -> PolicyDocument {
        PolicyDocument::new(vec![
            PolicyStatement::allow(&[&self.assume_role_action], vec![])
                .with_principal(json!({ "Federated": self.federated }))
                .with_condition(self.conditions.clone()),
        ])
    }
}

/// an IAM role with one inline default policy that permissions are added
/// to. Optionally restricted to a fixed set of actions.
pub struct Role {
    logical_id: String,
    cfn: CfnRole,
    allowed_actions: Option<&'static [&'static str]>,
}

impl Role {
    pub fn new(
        logical_id: &str,
        role_name: Option<&str>,
        assume_role_policy: PolicyDocument,
    ) -> Result<Self> {
        verify_resource_name(logical_id)?;
        if let Some(name) = role_name {
            validate_role_name(name).map_err(|reason| InfraError::ResourceValidation {
                resource: logical_id.to_string(),
                reason,
            })?;
        }
        Ok(Self {
            logical_id: logical_id.to_string(),
            cfn: CfnRole {
                role_name: role_name.map(str::to_string),
                assume_role_policy_document: assume_role_policy,
                policies: vec![InlinePolicy {
                    policy_name: format!("{logical_id}DefaultPolicy"),
                    policy_document: PolicyDocument::default(),
                }],
                ..Default::default()
            },
            allowed_actions: None,
        })
    }

    /// any later `add_to_policy` call naming an action outside of `actions`
    /// fails.
    pub fn restrict_actions_to(mut self, actions: &'static [&'static str]) -> Self {
        self.allowed_actions = Some(actions);
        self
    }

    pub fn arn(&self) -> Value {
        get_att(&self.logical_id, "Arn")
    }

    pub fn role_name(&self) -> Option<&str> {
        self.cfn.role_name.as_deref()
    }

    pub fn add_to_policy(&mut self, statement: PolicyStatement) -> Result<()> {
        if let Some(allowed) = self.allowed_actions {
            let outside = statement.actions.iter().find(|a| !allowed.contains(&a.as_str()));
            if let Some(action) = outside {
                return Err(InfraError::PolicyViolation {
                    role: self.role_name().unwrap_or(&self.logical_id).to_string(),
                    action: action.clone(),
                });
            }
        }
        // invariant: new() always creates the default policy
        if let Some(default_policy) = self.cfn.policies.first_mut() {
            default_policy.policy_document.statements.push(statement);
        }
        Ok(())
    }

    pub fn policy(&self) -> Option<&PolicyDocument> {
        self.cfn.policies.first().map(|p| &p.policy_document)
    }

    pub fn add_to_stack(self, stack: &mut Stack) -> Result<()> {
        stack.add_resource(&self.logical_id, self.cfn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONLY_DESCRIBE: &[&str] = &["cloudformation:DescribeStacks"];

    fn trust() -> PolicyDocument {
        ServicePrincipal::new("lambda.amazonaws.com").assume_role_policy()
    }

    #[test]
    fn role_names_are_validated() {
        assert!(validate_role_name("dev-FrontendDeploymentRole").is_ok());
        assert!(validate_role_name("").is_err());
        assert!(validate_role_name(&"r".repeat(65)).is_err());
        assert!(validate_role_name("has space").is_err());
        assert!(Role::new("r", Some("bad/name"), trust()).is_err());
    }

    #[test]
    fn restricted_role_rejects_other_actions() {
        let mut role = Role::new("r", Some("restricted"), trust())
            .unwrap()
            .restrict_actions_to(ONLY_DESCRIBE);
        role.add_to_policy(PolicyStatement::allow(ONLY_DESCRIBE, vec![json!("*")])).unwrap();
        let err = role
            .add_to_policy(PolicyStatement::allow(
                &["cloudformation:DescribeStacks", "iam:PassRole"],
                vec![json!("*")],
            ))
            .unwrap_err();
        assert_eq!(err.to_string(), "Role 'restricted' may not be granted action 'iam:PassRole'");
        assert_eq!(role.policy().unwrap().statements.len(), 1);
    }

    #[test]
    fn role_renders_inline_default_policy() {
        let mut stack = Stack::new("test").unwrap();
        let mut role = Role::new("deployer", Some("deployer"), trust()).unwrap();
        role.add_to_policy(PolicyStatement::allow(ONLY_DESCRIBE, vec![json!("*")])).unwrap();
        role.add_to_stack(&mut stack).unwrap();
        let template = stack.to_template().unwrap();
        let props = &template.resources["deployer"].properties;
        assert_eq!(props["RoleName"], "deployer");
        assert_eq!(props["Policies"][0]["PolicyName"], "deployerDefaultPolicy");
        let statement = &props["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Action"], "cloudformation:DescribeStacks");
        assert_eq!(props["AssumeRolePolicyDocument"]["Statement"][0]["Action"], ASSUME_ROLE);
    }

    #[test]
    fn role_without_permissions_has_no_policies_key() {
        let role = CfnRole {
            assume_role_policy_document: trust(),
            policies: vec![InlinePolicy {
                policy_name: "empty".into(),
                policy_document: PolicyDocument::default(),
            }],
            ..Default::default()
        };
        assert!(role.properties().get("Policies").is_none());
    }

    #[test]
    fn federated_principal_trust_document() {
        let principal = FederatedPrincipal::new(
            get_ref("Provider"),
            json!({ "StringEquals": { "issuer:aud": "sts.amazonaws.com" } }),
            ASSUME_ROLE_WITH_WEB_IDENTITY,
        );
        let doc = principal.assume_role_policy().to_value();
        let st = &doc["Statement"][0];
        assert_eq!(st["Principal"]["Federated"], get_ref("Provider"));
        assert_eq!(st["Action"], ASSUME_ROLE_WITH_WEB_IDENTITY);
        assert_eq!(st["Condition"]["StringEquals"]["issuer:aud"], "sts.amazonaws.com");
    }

    #[test]
    fn oidc_provider_requires_https() {
        let provider = CfnOidcProvider {
            url: "http://token.example.com".into(),
            client_id_list: vec!["sts.amazonaws.com".into()],
            thumbprint_list: vec![],
        };
        assert!(provider.validate().is_err());
    }
}
