use serde_json::{json, Map, Value};

use super::*;
use crate::stacks::Stack;

/// buckets carrying this tag with value `true` are emptied by the cleanup
/// function. It must match the key in `AUTO_DELETE_HANDLER`.
pub const AUTO_DELETE_TAG: &str = "acme:auto-delete-objects";

/// s3 buckets in cloudformation cannot be deleted if they contain objects.
/// this function is invoked by a custom resource on stack deletion and empties
/// the bucket first (every object version and delete marker). Buckets that
/// are not tagged with `AUTO_DELETE_TAG` are left alone.
pub const AUTO_DELETE_HANDLER: &str = r#"const {
    S3Client, GetBucketTaggingCommand, ListObjectVersionsCommand, DeleteObjectsCommand,
} = require('@aws-sdk/client-s3');
const response = require('cfn-response');
const s3 = new S3Client({});
const AUTO_DELETE_TAG = 'acme:auto-delete-objects';

async function isTaggedForDeletion(bucketName) {
    try {
        const res = await s3.send(new GetBucketTaggingCommand({ Bucket: bucketName }));
        return (res.TagSet || []).some((t) => t.Key === AUTO_DELETE_TAG && t.Value === 'true');
    } catch (err) {
        if (err.name === 'NoSuchTagSet' || err.name === 'NoSuchBucket') {
            return false;
        }
        throw err;
    }
}

async function emptyBucket(bucketName) {
    let keyMarker;
    let versionIdMarker;
    do {
        const page = await s3.send(new ListObjectVersionsCommand({
            Bucket: bucketName,
            KeyMarker: keyMarker,
            VersionIdMarker: versionIdMarker,
        }));
        const objects = [...(page.Versions || []), ...(page.DeleteMarkers || [])]
            .map((o) => ({ Key: o.Key, VersionId: o.VersionId }));
        if (objects.length > 0) {
            await s3.send(new DeleteObjectsCommand({
                Bucket: bucketName,
                Delete: { Objects: objects, Quiet: true },
            }));
        }
        keyMarker = page.NextKeyMarker;
        versionIdMarker = page.NextVersionIdMarker;
    } while (keyMarker || versionIdMarker);
}

exports.handler = function (event, context) {
    const bucketName = event.ResourceProperties.BucketName;
    const work = event.RequestType === 'Delete'
        ? isTaggedForDeletion(bucketName).then((tagged) => (tagged ? emptyBucket(bucketName) : undefined))
        : Promise.resolve();
    work.then(() => response.send(event, context, response.SUCCESS))
        .catch((err) => {
            console.log(`Error deleting objects from S3 bucket: ${err}`);
            response.send(event, context, response.FAILED);
        });
};
"#;

pub const AUTO_DELETE_RUNTIME: &str = "nodejs20.x";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPublicAccess {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl BlockPublicAccess {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }

    fn to_value(self) -> Value {
        json!({
            "BlockPublicAcls": self.block_public_acls,
            "BlockPublicPolicy": self.block_public_policy,
            "IgnorePublicAcls": self.ignore_public_acls,
            "RestrictPublicBuckets": self.restrict_public_buckets,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteConfiguration {
    pub index_document: String,
    pub error_document: String,
}

impl Default for WebsiteConfiguration {
    fn default() -> Self {
        Self {
            index_document: "index.html".into(),
            error_document: "index.html".into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CfnBucket {
    pub public_access_block_configuration: Option<BlockPublicAccess>,
    pub website_configuration: Option<WebsiteConfiguration>,
    pub removal_policy: Option<RemovalPolicy>,
    pub tags: Vec<(String, String)>,
}

impl CfnResource for CfnBucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        if let Some(block) = self.public_access_block_configuration {
            map.insert("PublicAccessBlockConfiguration".to_string(), block.to_value());
        }
        if let Some(website) = &self.website_configuration {
            map.insert("WebsiteConfiguration".to_string(), json!({
                "IndexDocument": website.index_document,
                "ErrorDocument": website.error_document,
            }));
        }
        if !self.tags.is_empty() {
            let tags: Vec<Value> = self
                .tags
                .iter()
                .map(|(k, v)| json!({ "Key": k, "Value": v }))
                .collect();
            map.insert("Tags".to_string(), Value::Array(tags));
        }
        Value::Object(map)
    }

    fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.removal_policy
    }
}

pub struct CfnBucketPolicy {
    pub bucket: Value,
    pub policy_document: PolicyDocument,
}

impl CfnResource for CfnBucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }

    fn properties(&self) -> Value {
        json!({
            "Bucket": self.bucket,
            "PolicyDocument": self.policy_document.to_value(),
        })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.policy_document.is_empty() {
            return Err("bucket policy must contain at least one statement".into());
        }
        // bucket policies are resource policies: every statement names who it applies to
        if self.policy_document.statements.iter().any(|s| s.principal.is_none()) {
            return Err("every bucket policy statement must have a principal".into());
        }
        Ok(())
    }
}

pub struct CfnFunction {
    pub description: Option<String>,
    pub runtime: String,
    pub handler: String,
    pub role: Value,
    pub zip_file: String,
    pub timeout: u32,
    pub memory_size: u32,
    pub depends_on: Vec<String>,
}

impl CfnResource for CfnFunction {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }

    fn properties(&self) -> Value {
        let mut map = Map::new();
        map.insert("Runtime".to_string(), json!(self.runtime));
        map.insert("Handler".to_string(), json!(self.handler));
        map.insert("Role".to_string(), self.role.clone());
        map.insert("Code".to_string(), json!({ "ZipFile": self.zip_file }));
        map.insert("Timeout".to_string(), json!(self.timeout));
        map.insert("MemorySize".to_string(), json!(self.memory_size));
        if let Some(desc) = &self.description {
            map.insert("Description".to_string(), json!(desc));
        }
        Value::Object(map)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        // inline code is limited to 4096 characters
        if self.zip_file.len() > 4096 {
            return Err(format!(
                "inline function code is {} characters, the limit is 4096",
                self.zip_file.len()
            ));
        }
        if !(1..=900).contains(&self.timeout) {
            return Err(format!(
                "timeout must be between 1 and 900 seconds, found {}",
                self.timeout
            ));
        }
        Ok(())
    }

    fn depends_on(&self) -> Vec<String> {
        self.depends_on.clone()
    }
}

/// custom resource that empties a bucket when the stack is deleted.
pub struct CleanupResource {
    pub lambda_logical_id: String,
    pub bucket_logical_id: String,
    pub depends_on: Vec<String>,
}

impl CfnResource for CleanupResource {
    fn type_string(&self) -> &'static str {
        "Custom::S3AutoDeleteObjects"
    }

    fn properties(&self) -> Value {
        json!({
            "ServiceToken": get_att(&self.lambda_logical_id, "Arn"),
            "BucketName": get_ref(&self.bucket_logical_id),
        })
    }

    fn depends_on(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn removal_policy(&self) -> Option<RemovalPolicy> {
        Some(RemovalPolicy::Delete)
    }
}

#[derive(Debug, Clone)]
pub struct BucketProps {
    pub block_public_access: BlockPublicAccess,
    pub removal_policy: RemovalPolicy,
    /// creates a custom resource (function + role + policy) that deletes
    /// every object in the bucket before the bucket itself is deleted.
    /// Only valid together with `RemovalPolicy::Delete`.
    pub auto_delete_objects: bool,
    pub website: Option<WebsiteConfiguration>,
}

impl Default for BucketProps {
    fn default() -> Self {
        Self {
            block_public_access: BlockPublicAccess::block_all(),
            removal_policy: RemovalPolicy::Retain,
            auto_delete_objects: false,
            website: None,
        }
    }
}

/// a bucket plus its resource policy. Statements can be added until the
/// bucket is added to a stack.
pub struct Bucket {
    logical_id: String,
    props: BucketProps,
    policy_statements: Vec<PolicyStatement>,
}

impl Bucket {
    pub fn new(logical_id: &str, props: BucketProps) -> Result<Self> {
        verify_resource_name(logical_id)?;
        if props.auto_delete_objects && props.removal_policy != RemovalPolicy::Delete {
            return Err(InfraError::ResourceValidation {
                resource: logical_id.to_string(),
                reason: "Cannot use 'auto_delete_objects' property on a bucket without setting removal policy to 'Delete'".into(),
            });
        }
        Ok(Self {
            logical_id: logical_id.to_string(),
            props,
            policy_statements: vec![],
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn bucket_name(&self) -> Value {
        get_ref(&self.logical_id)
    }

    pub fn arn(&self) -> Value {
        get_att(&self.logical_id, "Arn")
    }

    pub fn regional_domain_name(&self) -> Value {
        get_att(&self.logical_id, "RegionalDomainName")
    }

    /// `<bucket arn>/*`
    pub fn arn_for_objects(&self) -> Value {
        json!({ "Fn::Join": ["", [self.arn(), "/*"]] })
    }

    pub fn add_to_resource_policy(&mut self, statement: PolicyStatement) {
        self.policy_statements.push(statement);
    }

    pub fn policy_logical_id(&self) -> String {
        format!("{}Policy", self.logical_id)
    }

    pub fn add_to_stack(mut self, stack: &mut Stack) -> Result<()> {
        let logical_bucket_name = self.logical_id.clone();
        let mut tags = vec![];
        if self.props.auto_delete_objects {
            tags.push((AUTO_DELETE_TAG.to_string(), "true".to_string()));
        }
        let bucket = CfnBucket {
            public_access_block_configuration: Some(self.props.block_public_access),
            website_configuration: self.props.website.clone(),
            removal_policy: Some(self.props.removal_policy),
            tags,
        };
        stack.add_resource(&logical_bucket_name, bucket)?;

        let role_id = format!("{logical_bucket_name}AutoDeleteRole");
        if self.props.auto_delete_objects {
            // the cleanup role gets its permissions from the bucket policy
            let statement = PolicyStatement::allow(
                &["s3:DeleteObject*", "s3:GetBucket*", "s3:List*", "s3:PutBucketPolicy"],
                vec![self.arn(), self.arn_for_objects()],
            )
            .with_principal(json!({ "AWS": get_att(&role_id, "Arn") }));
            self.policy_statements.push(statement);
        }

        let policy_id = self.policy_logical_id();
        let has_policy = !self.policy_statements.is_empty();
        if has_policy {
            let policy = CfnBucketPolicy {
                bucket: self.bucket_name(),
                policy_document: PolicyDocument::new(std::mem::take(&mut self.policy_statements)),
            };
            stack.add_resource(&policy_id, policy)?;
        }

        if !self.props.auto_delete_objects {
            return Ok(());
        }

        let role = CfnRole {
            description: Some(format!("auto generated cleanup role for {logical_bucket_name}")),
            assume_role_policy_document: ServicePrincipal::new("lambda.amazonaws.com")
                .assume_role_policy(),
            managed_policy_arns: vec![sub(
                "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole",
                &[],
            )],
            ..Default::default()
        };
        stack.add_resource(&role_id, role)?;

        let fn_id = format!("{logical_bucket_name}AutoDeleteFunction");
        let function = CfnFunction {
            description: Some(format!(
                "Deletes all objects in {logical_bucket_name} when the stack is deleted"
            )),
            runtime: AUTO_DELETE_RUNTIME.to_string(),
            handler: "index.handler".to_string(),
            role: get_att(&role_id, "Arn"),
            zip_file: AUTO_DELETE_HANDLER.to_string(),
            timeout: 900,
            memory_size: 128,
            depends_on: vec![role_id],
        };
        stack.add_resource(&fn_id, function)?;

        // the custom resource must be deleted before the policy that lets
        // the function empty the bucket.
        let cleanup = CleanupResource {
            lambda_logical_id: fn_id,
            bucket_logical_id: logical_bucket_name.clone(),
            depends_on: if has_policy { vec![policy_id] } else { vec![] },
        };
        stack.add_resource(&format!("{logical_bucket_name}AutoDeleteObjects"), cleanup)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private_website_props() -> BucketProps {
        BucketProps {
            removal_policy: RemovalPolicy::Delete,
            auto_delete_objects: true,
            website: Some(WebsiteConfiguration::default()),
            ..Default::default()
        }
    }

    #[test]
    fn auto_delete_requires_delete_removal_policy() {
        let props = BucketProps {
            auto_delete_objects: true,
            ..Default::default()
        };
        let err = Bucket::new("bucket", props).err().unwrap();
        assert!(err.to_string().contains("removal policy"));
    }

    #[test]
    fn plain_bucket_is_a_single_resource() {
        let mut stack = Stack::new("test").unwrap();
        Bucket::new("bucket", BucketProps::default()).unwrap().add_to_stack(&mut stack).unwrap();
        let template = stack.to_template().unwrap();
        assert_eq!(template.resources.len(), 1);
        let bucket = &template.resources["bucket"];
        assert_eq!(bucket.ty, "AWS::S3::Bucket");
        assert_eq!(bucket.deletion_policy, Some(RemovalPolicy::Retain));
        assert_eq!(bucket.properties["PublicAccessBlockConfiguration"]["BlockPublicPolicy"], true);
    }

    #[test]
    fn auto_delete_adds_cleanup_resources() {
        let mut stack = Stack::new("test").unwrap();
        Bucket::new("site", private_website_props()).unwrap().add_to_stack(&mut stack).unwrap();
        let template = stack.to_template().unwrap();
        let expected = [
            "site",
            "sitePolicy",
            "siteAutoDeleteRole",
            "siteAutoDeleteFunction",
            "siteAutoDeleteObjects",
        ];
        for id in expected {
            assert!(template.resources.contains_key(id), "missing {id}");
        }
        let cleanup = &template.resources["siteAutoDeleteObjects"];
        assert_eq!(cleanup.ty, "Custom::S3AutoDeleteObjects");
        assert_eq!(cleanup.depends_on, vec!["sitePolicy".to_string()]);
        assert_eq!(cleanup.properties["BucketName"], get_ref("site"));

        let policy = &template.resources["sitePolicy"].properties["PolicyDocument"];
        assert_eq!(
            policy["Statement"][0]["Principal"]["AWS"],
            get_att("siteAutoDeleteRole", "Arn")
        );

        let bucket = &template.resources["site"];
        assert_eq!(bucket.deletion_policy, Some(RemovalPolicy::Delete));
        assert_eq!(bucket.properties["WebsiteConfiguration"]["IndexDocument"], "index.html");
        assert_eq!(bucket.properties["WebsiteConfiguration"]["ErrorDocument"], "index.html");
    }

    #[test]
    fn cleanup_handler_fits_inline_code_limit() {
        assert!(AUTO_DELETE_HANDLER.len() <= 4096);
    }

    #[test]
    fn cleanup_handler_only_empties_tagged_buckets() {
        let tag_line = format!("const AUTO_DELETE_TAG = '{AUTO_DELETE_TAG}';");
        assert!(AUTO_DELETE_HANDLER.contains(&tag_line));
        assert!(AUTO_DELETE_HANDLER.contains("GetBucketTaggingCommand"));

        let mut stack = Stack::new("test").unwrap();
        Bucket::new("site", private_website_props()).unwrap().add_to_stack(&mut stack).unwrap();
        let template = stack.to_template().unwrap();
        let tags = &template.resources["site"].properties["Tags"];
        assert_eq!(tags, &json!([{ "Key": AUTO_DELETE_TAG, "Value": "true" }]));

        // the cleanup role may read the tag through the bucket policy
        let policy = &template.resources["sitePolicy"].properties["PolicyDocument"];
        let actions = &policy["Statement"][0]["Action"];
        assert!(actions.as_array().unwrap().contains(&json!("s3:GetBucket*")));
    }

    #[test]
    fn untagged_when_objects_are_kept() {
        let mut stack = Stack::new("test").unwrap();
        Bucket::new("bucket", BucketProps::default()).unwrap().add_to_stack(&mut stack).unwrap();
        let template = stack.to_template().unwrap();
        assert!(template.resources["bucket"].properties.get("Tags").is_none());
    }

    #[test]
    fn bucket_policy_needs_principals() {
        let policy = CfnBucketPolicy {
            bucket: get_ref("b"),
            policy_document: PolicyDocument::new(vec![
                PolicyStatement::allow(&["s3:GetObject"], vec![json!("*")]),
            ]),
        };
        assert!(policy.validate().is_err());
    }
}
