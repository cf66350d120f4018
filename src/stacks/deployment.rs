//! Roles that GitHub Actions workflows assume (through OIDC federation) to
//! publish the frontend and to deploy infrastructure.

use serde_json::{json, Value};

use super::{HostingOutputs, Stack};
use crate::environment::EnvironmentName;
use crate::error::Result;
use crate::resources::*;

pub const GITHUB_OIDC_URL: &str = "https://token.actions.githubusercontent.com";
pub const GITHUB_OIDC_AUDIENCE: &str = "sts.amazonaws.com";
pub const GITHUB_REPOSITORY: &str = "daniel-black/acme";

const SUB_CLAIM: &str = "token.actions.githubusercontent.com:sub";
const AUD_CLAIM: &str = "token.actions.githubusercontent.com:aud";

/// everything the frontend deployment role may ever do
pub const FRONTEND_DEPLOYMENT_ACTIONS: &[&str] = &[
    "s3:PutObject",
    "s3:DeleteObject",
    "cloudfront:CreateInvalidation",
    "cloudformation:DescribeStacks",
];

// Maybe this is too permissive? scoping it down needs a list of the stacks
// the infra workflow deploys, revisit once those exist.
pub const INFRA_DEPLOYMENT_ACTIONS: &[&str] = &[
    // CloudFormation actions
    "cloudformation:CreateStack",
    "cloudformation:UpdateStack",
    "cloudformation:DeleteStack",
    "cloudformation:DescribeStacks",
    // IAM actions (to pass roles)
    "iam:PassRole",
    // S3 actions (for creating/deleting buckets, uploading files, etc.)
    "s3:CreateBucket",
    "s3:DeleteBucket",
    "s3:PutObject",
    "s3:GetObject",
    "s3:ListBucket",
    "s3:DeleteObject",
    // API Gateway actions
    "apigateway:*",
    // Cognito actions (user pools, clients, identity pools)
    "cognito-idp:*",
    "cognito-identity:*",
    // Lambda actions
    "lambda:CreateFunction",
    "lambda:UpdateFunctionCode",
    "lambda:UpdateFunctionConfiguration",
    "lambda:DeleteFunction",
    "lambda:InvokeFunction",
    "lambda:ListFunctions",
    // DynamoDB actions
    "dynamodb:CreateTable",
    "dynamodb:UpdateTable",
    "dynamodb:DeleteTable",
    "dynamodb:DescribeTable",
    "dynamodb:Query",
    "dynamodb:Scan",
    "dynamodb:PutItem",
    "dynamodb:GetItem",
    "dynamodb:DeleteItem",
];

/// the `sub` claim GitHub puts in tokens issued to workflows running on
/// the environment's branch.
pub fn github_subject(environment: EnvironmentName) -> String {
    format!("repo:{GITHUB_REPOSITORY}:ref:{}", environment.branch_ref())
}

/// `StringEquals` conditions on the subject and audience claims.
pub fn github_trust_conditions(environment: EnvironmentName) -> Value {
    json!({
        "StringEquals": {
            SUB_CLAIM: github_subject(environment),
            AUD_CLAIM: GITHUB_OIDC_AUDIENCE,
        }
    })
}

pub struct DeploymentStack {
    pub stack: Stack,
}

impl DeploymentStack {
    pub fn stack_name(environment: EnvironmentName) -> String {
        format!("{environment}-DeploymentStack")
    }

    pub fn new(environment: EnvironmentName, hosting: &HostingOutputs) -> Result<Self> {
        let mut stack = Stack::new(&Self::stack_name(environment))?;
        stack.description = Some(format!("CI deployment roles for the {environment} environment"));
        stack.add_dependency(&hosting.stack_name);

        let provider = OpenIdConnectProvider::new(
            &to_logical_id(&format!("{environment}-GitHubOIDCProvider")),
            GITHUB_OIDC_URL,
            &[GITHUB_OIDC_AUDIENCE],
        );
        let principal = FederatedPrincipal::new(
            provider.arn(),
            github_trust_conditions(environment),
            ASSUME_ROLE_WITH_WEB_IDENTITY,
        );

        let frontend_role_name = format!("{environment}-FrontendDeploymentRole");
        let mut frontend_role = Role::new(
            &to_logical_id(&frontend_role_name),
            Some(&frontend_role_name),
            principal.assume_role_policy(),
        )?
        .restrict_actions_to(FRONTEND_DEPLOYMENT_ACTIONS);

        // sync files to the bucket and delete old ones
        frontend_role.add_to_policy(PolicyStatement::allow(
            &["s3:PutObject", "s3:DeleteObject"],
            vec![sub("arn:aws:s3:::${BucketName}/*", &[("BucketName", hosting.bucket_name())])],
        ))?;
        // invalidate the CloudFront cache
        frontend_role.add_to_policy(PolicyStatement::allow(
            &["cloudfront:CreateInvalidation"],
            vec![sub(
                "arn:aws:cloudfront::${AWS::AccountId}:distribution/${DistributionId}",
                &[("DistributionId", hosting.distribution_id())],
            )],
        ))?;
        // read stack outputs
        frontend_role.add_to_policy(PolicyStatement::allow(
            &["cloudformation:DescribeStacks"],
            vec![json!("*")],
        ))?;

        let infra_role_name = format!("{environment}-InfraDeploymentRole");
        let mut infra_role = Role::new(
            &to_logical_id(&infra_role_name),
            Some(&infra_role_name),
            principal.assume_role_policy(),
        )?;
        infra_role.add_to_policy(PolicyStatement::allow(
            INFRA_DEPLOYMENT_ACTIONS,
            vec![json!("*")],
        ))?;

        let provider_arn = provider.arn();
        let frontend_role_arn = frontend_role.arn();
        let infra_role_arn = infra_role.arn();
        provider.add_to_stack(&mut stack)?;
        frontend_role.add_to_stack(&mut stack)?;
        infra_role.add_to_stack(&mut stack)?;

        stack.add_output(
            &to_logical_id(&format!("{environment}-GitHubOIDCProviderARN")),
            provider_arn,
            None,
        )?;
        stack.add_output(
            &to_logical_id(&format!("{environment}-FrontendDeploymentRoleARN")),
            frontend_role_arn,
            None,
        )?;
        stack.add_output(
            &to_logical_id(&format!("{environment}-InfraDeploymentRoleARN")),
            infra_role_arn,
            None,
        )?;
        Ok(Self { stack })
    }
}
