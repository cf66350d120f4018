use serde_json::{json, Map, Value};

use super::*;
use crate::stacks::Stack;

/// managed "CachingOptimized" policy
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerProtocolPolicy {
    AllowAll,
    RedirectToHttps,
}

impl ViewerProtocolPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerProtocolPolicy::AllowAll => "allow-all",
            ViewerProtocolPolicy::RedirectToHttps => "redirect-to-https",
        }
    }
}

pub struct CfnOriginAccessControl {
    pub name: String,
    pub description: Option<String>,
}

impl CfnResource for CfnOriginAccessControl {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::OriginAccessControl"
    }

    fn properties(&self) -> Value {
        let mut config = Map::new();
        config.insert("Name".to_string(), json!(self.name));
        config.insert("OriginAccessControlOriginType".to_string(), json!("s3"));
        config.insert("SigningBehavior".to_string(), json!("always"));
        config.insert("SigningProtocol".to_string(), json!("sigv4"));
        if let Some(desc) = &self.description {
            config.insert("Description".to_string(), json!(desc));
        }
        json!({ "OriginAccessControlConfig": Value::Object(config) })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() || self.name.len() > 64 {
            return Err(format!(
                "origin access control name {:?} must be between 1 and 64 characters",
                self.name
            ));
        }
        Ok(())
    }
}

/// an S3 origin reached through an origin access control.
#[derive(Debug, Clone)]
pub struct S3Origin {
    pub id: String,
    pub domain_name: Value,
    pub origin_access_control_id: Option<Value>,
}

impl S3Origin {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("Id".to_string(), json!(self.id));
        map.insert("DomainName".to_string(), self.domain_name.clone());
        // with OAC the legacy origin access identity must be present, but empty
        map.insert("S3OriginConfig".to_string(), json!({ "OriginAccessIdentity": "" }));
        if let Some(oac) = &self.origin_access_control_id {
            map.insert("OriginAccessControlId".to_string(), oac.clone());
        }
        Value::Object(map)
    }
}

pub struct CfnDistribution {
    pub enabled: bool,
    pub comment: Option<String>,
    pub origins: Vec<S3Origin>,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub cache_policy_id: String,
    pub compress: bool,
    pub http_version: String,
    pub ipv6_enabled: bool,
}

impl CfnResource for CfnDistribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }

    fn properties(&self) -> Value {
        let mut config = Map::new();
        config.insert("Enabled".to_string(), json!(self.enabled));
        config.insert("HttpVersion".to_string(), json!(self.http_version));
        config.insert("IPV6Enabled".to_string(), json!(self.ipv6_enabled));
        if let Some(comment) = &self.comment {
            config.insert("Comment".to_string(), json!(comment));
        }
        let target_origin_id = self.origins.first().map(|o| o.id.clone()).unwrap_or_default();
        config.insert("DefaultCacheBehavior".to_string(), json!({
            "TargetOriginId": target_origin_id,
            "ViewerProtocolPolicy": self.viewer_protocol_policy.as_str(),
            "CachePolicyId": self.cache_policy_id,
            "Compress": self.compress,
        }));
        config.insert(
            "Origins".to_string(),
            Value::Array(self.origins.iter().map(S3Origin::to_value).collect()),
        );
        json!({ "DistributionConfig": Value::Object(config) })
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.origins.is_empty() {
            return Err("Must provide at least one origin to cloudfront distribution".into());
        }
        if self.cache_policy_id.is_empty() {
            return Err("default cache behavior needs a cache policy".into());
        }
        if let Some(comment) = &self.comment {
            if comment.len() > 128 {
                return Err("distribution comment cannot be longer than 128 characters".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DistributionProps {
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub cache_policy_id: String,
    pub comment: Option<String>,
}

impl Default for DistributionProps {
    fn default() -> Self {
        Self {
            viewer_protocol_policy: ViewerProtocolPolicy::AllowAll,
            cache_policy_id: CACHING_OPTIMIZED_POLICY_ID.to_string(),
            comment: None,
        }
    }
}

/// a distribution serving a private bucket through an origin access
/// control, plus the OAC itself.
pub struct Distribution {
    logical_id: String,
    oac_logical_id: String,
    oac: CfnOriginAccessControl,
    cfn: CfnDistribution,
}

impl Distribution {
    /// grants the distribution read access to `bucket` through the bucket's
    /// resource policy, so the bucket can stay fully private.
    pub fn with_s3_origin_access_control(
        logical_id: &str,
        oac_name: &str,
        bucket: &mut Bucket,
        props: DistributionProps,
    ) -> Result<Self> {
        verify_resource_name(logical_id)?;
        let oac_logical_id = format!("{logical_id}OriginAccessControl");
        let origin = S3Origin {
            id: format!("{logical_id}Origin1"),
            domain_name: bucket.regional_domain_name(),
            origin_access_control_id: Some(get_att(&oac_logical_id, "Id")),
        };
        let out = Self {
            logical_id: logical_id.to_string(),
            oac: CfnOriginAccessControl {
                name: oac_name.to_string(),
                description: Some(format!("Origin access control for {}", bucket.logical_id())),
            },
            oac_logical_id,
            cfn: CfnDistribution {
                enabled: true,
                comment: props.comment,
                origins: vec![origin],
                viewer_protocol_policy: props.viewer_protocol_policy,
                cache_policy_id: props.cache_policy_id,
                compress: true,
                http_version: "http2".to_string(),
                ipv6_enabled: true,
            },
        };
        let read_objects = PolicyStatement::allow(&["s3:GetObject"], vec![bucket.arn_for_objects()])
            .with_principal(json!({ "Service": "cloudfront.amazonaws.com" }))
            .with_condition(json!({ "StringEquals": { "AWS:SourceArn": out.arn() } }));
        bucket.add_to_resource_policy(read_objects);
        Ok(out)
    }

    pub fn distribution_id(&self) -> Value {
        get_ref(&self.logical_id)
    }

    pub fn domain_name(&self) -> Value {
        get_att(&self.logical_id, "DomainName")
    }

    pub fn arn(&self) -> Value {
        sub(
            "arn:${AWS::Partition}:cloudfront::${AWS::AccountId}:distribution/${DistributionId}",
            &[("DistributionId", self.distribution_id())],
        )
    }

    pub fn add_to_stack(self, stack: &mut Stack) -> Result<()> {
        stack.add_resource(&self.oac_logical_id, self.oac)?;
        stack.add_resource(&self.logical_id, self.cfn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(props: DistributionProps) -> SavedTemplate {
        let mut stack = Stack::new("test").unwrap();
        let mut bucket = Bucket::new("site", BucketProps::default()).unwrap();
        let distr =
            Distribution::with_s3_origin_access_control("cdn", "test-cdn-oac", &mut bucket, props)
                .unwrap();
        bucket.add_to_stack(&mut stack).unwrap();
        distr.add_to_stack(&mut stack).unwrap();
        stack.to_template().unwrap()
    }

    #[test]
    fn distribution_points_at_bucket_through_oac() {
        let template = build(DistributionProps {
            viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
            ..Default::default()
        });
        let config = &template.resources["cdn"].properties["DistributionConfig"];
        assert_eq!(config["Enabled"], true);
        assert_eq!(config["DefaultCacheBehavior"]["ViewerProtocolPolicy"], "redirect-to-https");
        assert_eq!(config["DefaultCacheBehavior"]["CachePolicyId"], CACHING_OPTIMIZED_POLICY_ID);
        assert_eq!(config["DefaultCacheBehavior"]["TargetOriginId"], "cdnOrigin1");
        assert_eq!(config["Origins"][0]["DomainName"], get_att("site", "RegionalDomainName"));
        assert_eq!(
            config["Origins"][0]["OriginAccessControlId"],
            get_att("cdnOriginAccessControl", "Id")
        );

        let oac = &template.resources["cdnOriginAccessControl"];
        assert_eq!(oac.ty, "AWS::CloudFront::OriginAccessControl");
        assert_eq!(oac.properties["OriginAccessControlConfig"]["SigningProtocol"], "sigv4");
    }

    #[test]
    fn bucket_policy_only_lets_the_distribution_read() {
        let template = build(DistributionProps::default());
        let policy = &template.resources["sitePolicy"].properties["PolicyDocument"];
        let statements = &policy["Statement"];
        assert_eq!(statements.as_array().unwrap().len(), 1);
        let st = &statements[0];
        assert_eq!(st["Action"], "s3:GetObject");
        assert_eq!(st["Principal"]["Service"], "cloudfront.amazonaws.com");
        assert!(st["Condition"]["StringEquals"]["AWS:SourceArn"]["Fn::Sub"].is_array());
    }

    #[test]
    fn long_comments_fail_validation() {
        let mut stack = Stack::new("test").unwrap();
        let mut bucket = Bucket::new("site", BucketProps::default()).unwrap();
        let props = DistributionProps {
            comment: Some("c".repeat(129)),
            ..Default::default()
        };
        let distr =
            Distribution::with_s3_origin_access_control("cdn", "oac", &mut bucket, props).unwrap();
        distr.add_to_stack(&mut stack).unwrap();
        assert!(stack.to_template().is_err());
    }
}
