//! Private S3 bucket holding the built frontend, served through CloudFront.

use serde_json::Value;

use super::Stack;
use crate::environment::EnvironmentName;
use crate::error::Result;
use crate::resources::*;

/// the identifiers the deployment stack needs from the hosting stack.
/// Both are cloudformation export names, read with `Fn::ImportValue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingOutputs {
    pub stack_name: String,
    pub bucket_name_export: String,
    pub distribution_id_export: String,
}

impl HostingOutputs {
    pub fn bucket_name(&self) -> Value {
        import_value(&self.bucket_name_export)
    }

    pub fn distribution_id(&self) -> Value {
        import_value(&self.distribution_id_export)
    }
}

pub struct HostingStack {
    pub stack: Stack,
    pub outputs: HostingOutputs,
}

impl HostingStack {
    pub fn stack_name(environment: EnvironmentName) -> String {
        format!("{environment}-HostingStack")
    }

    pub fn new(environment: EnvironmentName) -> Result<Self> {
        let mut stack = Stack::new(&Self::stack_name(environment))?;
        stack.description = Some(format!("Static site hosting for the {environment} environment"));

        let mut bucket = Bucket::new(
            &to_logical_id(&format!("{environment}-HostingBucket")),
            BucketProps {
                block_public_access: BlockPublicAccess::block_all(),
                removal_policy: RemovalPolicy::Delete,
                auto_delete_objects: true,
                website: Some(WebsiteConfiguration::default()),
            },
        )?;

        let distribution = Distribution::with_s3_origin_access_control(
            &to_logical_id(&format!("{environment}-HostingDistribution")),
            &format!("{environment}-HostingDistributionOAC"),
            &mut bucket,
            DistributionProps {
                viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
                ..Default::default()
            },
        )?;

        let bucket_arn = bucket.arn();
        let bucket_name = bucket.bucket_name();
        let domain_name = distribution.domain_name();
        let distribution_id = distribution.distribution_id();
        bucket.add_to_stack(&mut stack)?;
        distribution.add_to_stack(&mut stack)?;

        stack.add_output(
            &to_logical_id(&format!("{environment}-HostingBucketARN")),
            bucket_arn,
            Some("ARN of the bucket the frontend is synced to"),
        )?;
        stack.add_output(
            &to_logical_id(&format!("{environment}-HostingDistributionDomainName")),
            domain_name,
            Some("Domain name of the hosting distribution"),
        )?;
        let bucket_name_export = stack.export_output(
            &to_logical_id(&format!("{environment}-HostingBucketName")),
            bucket_name,
            Some("Name of the hosting bucket (for syncing files)"),
        )?;
        let distribution_id_export = stack.export_output(
            &to_logical_id(&format!("{environment}-HostingDistributionId")),
            distribution_id,
            Some("Id of the hosting distribution (for invalidating the cache)"),
        )?;

        let outputs = HostingOutputs {
            stack_name: stack.stack_name.clone(),
            bucket_name_export,
            distribution_id_export,
        };
        Ok(Self { stack, outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosting_names_are_prefixed_with_environment() {
        for env in EnvironmentName::ALL {
            let hosting = HostingStack::new(env).unwrap();
            assert_eq!(hosting.stack.stack_name, format!("{env}-HostingStack"));
            let template = hosting.stack.to_template().unwrap();
            for id in template.resources.keys().chain(template.outputs.keys()) {
                assert!(id.starts_with(env.as_str()), "{id} is not prefixed with {env}");
            }
        }
    }

    #[test]
    fn bucket_is_private_and_deleted_with_stack() {
        let hosting = HostingStack::new(EnvironmentName::Dev).unwrap();
        let template = hosting.stack.to_template().unwrap();
        let (_, bucket) = template.resources_of_type("AWS::S3::Bucket").next().unwrap();
        let block = &bucket.properties["PublicAccessBlockConfiguration"];
        let keys = [
            "BlockPublicAcls",
            "BlockPublicPolicy",
            "IgnorePublicAcls",
            "RestrictPublicBuckets",
        ];
        for key in keys {
            assert_eq!(block[key], true, "{key}");
        }
        assert_eq!(bucket.deletion_policy, Some(RemovalPolicy::Delete));
        assert_eq!(template.resources_of_type("Custom::S3AutoDeleteObjects").count(), 1);
    }

    #[test]
    fn distribution_redirects_to_https() {
        let hosting = HostingStack::new(EnvironmentName::Prod).unwrap();
        let template = hosting.stack.to_template().unwrap();
        let distributions: Vec<_> = template
            .resources_of_type("AWS::CloudFront::Distribution")
            .collect();
        assert_eq!(distributions.len(), 1);
        let behavior = &distributions[0].1.properties["DistributionConfig"]["DefaultCacheBehavior"];
        assert_eq!(behavior["ViewerProtocolPolicy"], "redirect-to-https");
    }

    #[test]
    fn exposes_bucket_and_distribution_outputs() {
        let hosting = HostingStack::new(EnvironmentName::Dev).unwrap();
        let template = hosting.stack.to_template().unwrap();
        assert_eq!(
            template.outputs["devHostingBucketARN"].value,
            get_att("devHostingBucket", "Arn")
        );
        assert_eq!(
            template.outputs["devHostingDistributionDomainName"].value,
            get_att("devHostingDistribution", "DomainName")
        );
        assert_eq!(
            template.outputs["devHostingDistributionId"].value,
            get_ref("devHostingDistribution")
        );
        assert_eq!(hosting.outputs.bucket_name_export, "dev-HostingStack:devHostingBucketName");
        assert_eq!(
            hosting.outputs.distribution_id_export,
            "dev-HostingStack:devHostingDistributionId"
        );
        assert_eq!(
            hosting.outputs.bucket_name(),
            import_value("dev-HostingStack:devHostingBucketName")
        );
    }
}
