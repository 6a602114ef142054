use serde::Serialize;
use serde_json::Value;

use super::{get_att, get_ref, join, CACHING_OPTIMIZED_POLICY_ID};
use crate::error::Result;
use crate::stack::CfnResource;

/// the only viewer protocol policy a distribution built here may use.
pub const VIEWER_PROTOCOL_POLICY: &str = "redirect-to-https";
pub const MINIMUM_PROTOCOL_VERSION: &str = "TLSv1.2_2021";
pub const SSL_SUPPORT_METHOD: &str = "sni-only";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OriginAccessIdentityConfig {
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OriginAccessIdentity {
    pub cloud_front_origin_access_identity_config: OriginAccessIdentityConfig,
}

impl OriginAccessIdentity {
    pub fn new(comment: &str) -> Self {
        Self {
            cloud_front_origin_access_identity_config: OriginAccessIdentityConfig { comment: comment.to_string() },
        }
    }
}

impl CfnResource for OriginAccessIdentity {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::CloudFrontOriginAccessIdentity"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// `origin-access-identity/cloudfront/<oai id>`, the form S3 origins expect.
pub fn origin_access_identity_path(oai_logical_id: &str) -> Value {
    join("", vec![Value::String("origin-access-identity/cloudfront/".to_string()), get_ref(oai_logical_id)])
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3OriginConfig {
    pub origin_access_identity: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    pub id: String,
    pub domain_name: Value,
    pub s3_origin_config: S3OriginConfig,
}

impl Origin {
    /// an origin reading from `bucket_logical_id` through the identity.
    pub fn s3_bucket(id: &str, bucket_logical_id: &str, oai_logical_id: &str) -> Self {
        Self {
            id: id.to_string(),
            domain_name: get_att(bucket_logical_id, "RegionalDomainName"),
            s3_origin_config: S3OriginConfig { origin_access_identity: origin_access_identity_path(oai_logical_id) },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultCacheBehavior {
    pub target_origin_id: String,
    pub viewer_protocol_policy: String,
    pub cache_policy_id: String,
    pub compress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers_policy_id: Option<Value>,
}

impl DefaultCacheBehavior {
    pub fn new(target_origin_id: &str) -> Self {
        Self {
            target_origin_id: target_origin_id.to_string(),
            viewer_protocol_policy: VIEWER_PROTOCOL_POLICY.to_string(),
            cache_policy_id: CACHING_OPTIMIZED_POLICY_ID.to_string(),
            compress: true,
            response_headers_policy_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewerCertificate {
    pub acm_certificate_arn: Value,
    pub minimum_protocol_version: String,
    pub ssl_support_method: String,
}

impl ViewerCertificate {
    pub fn acm(acm_certificate_arn: Value) -> Self {
        Self {
            acm_certificate_arn,
            minimum_protocol_version: MINIMUM_PROTOCOL_VERSION.to_string(),
            ssl_support_method: SSL_SUPPORT_METHOD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub aliases: Vec<String>,
    pub default_root_object: String,
    pub enabled: bool,
    pub http_version: String,
    #[serde(rename = "IPV6Enabled")]
    pub ipv6_enabled: bool,
    pub origins: Vec<Origin>,
    pub default_cache_behavior: DefaultCacheBehavior,
    pub viewer_certificate: ViewerCertificate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Distribution {
    pub distribution_config: DistributionConfig,
}

impl CfnResource for Distribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        let conf = &self.distribution_config;
        let behavior = &conf.default_cache_behavior;
        if behavior.viewer_protocol_policy != VIEWER_PROTOCOL_POLICY {
            return Err(format!(
                "viewer protocol policy must be {VIEWER_PROTOCOL_POLICY}, found {}",
                behavior.viewer_protocol_policy
            ));
        }
        if conf.origins.is_empty() {
            return Err("Must provide at least one origin to cloudfront distribution".to_string());
        }
        if !conf.origins.iter().any(|o| o.id == behavior.target_origin_id) {
            return Err(format!("default cache behavior targets unknown origin {}", behavior.target_origin_id));
        }
        if conf.default_root_object.is_empty() || conf.default_root_object.starts_with('/') {
            return Err(format!("invalid default root object {:?}", conf.default_root_object));
        }
        for alias in conf.aliases.iter() {
            super::acm_cert::verify_domain_name(alias)?;
        }
        Ok(())
    }
}
