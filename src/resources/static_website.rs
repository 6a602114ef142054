use serde_json::Value;
use tracing::info;

use super::acm_cert::add_dns_validated_certificate;
use super::cloudfront::{DefaultCacheBehavior, Distribution, DistributionConfig, Origin, OriginAccessIdentity, ViewerCertificate};
use super::headers_policy::ResponseHeadersPolicy;
use super::route53::RecordSet;
use super::s3_bucket::{add_site_bucket, SiteBucket};
use super::{get_att, get_ref, join};
use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::lookup::HostedZone;
use crate::stack::{Resource, StackInput};

pub const BUCKET_ID: &str = "FrontEndBucket";
pub const OAI_ID: &str = "CloudFrontOriginAccessIdentity";
pub const CERTIFICATE_ID: &str = "SiteCertificate";
pub const HEADERS_POLICY_ID: &str = "SecurityHeadersResponseHeaderPolicy";
pub const DISTRIBUTION_ID: &str = "CloudFrontDistribution";
pub const ALIAS_RECORD_ID: &str = "SiteAliasRecord";

const ORIGIN_ID: &str = "default-origin";

/// Builds every resource of the site into a fresh `StackInput`: the
/// bucket behind an origin access identity, a certificate for the apex and
/// wildcard domain, the security headers policy, the distribution and the
/// alias record in `zone`.
pub fn build_static_website(config: &StackConfig, zone: &HostedZone) -> Result<StackInput> {
    config.validate()?;
    if !zone.matches(&config.domain_name) {
        return Err(Error::Config(format!(
            "hosted zone {} ({}) does not serve {}",
            zone.id, zone.name, config.domain_name
        )));
    }
    let site_domain = config.site_domain();
    let mut stackinp = StackInput::new(&config.stack_name);
    stackinp.description = Some(format!("static website for {site_domain}"));

    stackinp.push(Resource::new(OAI_ID, OriginAccessIdentity::new(&format!("OAI for {site_domain}"))));

    let bucket_id = add_site_bucket(
        &SiteBucket {
            logical_id: BUCKET_ID.to_string(),
            bucket_name: config.bucket_name.clone(),
            versioned: true,
            auto_delete_objects: true,
        },
        OAI_ID,
        &mut stackinp,
    );

    let cert_id = add_dns_validated_certificate(
        CERTIFICATE_ID,
        &config.domain_name,
        vec![config.wildcard_domain()],
        &zone.id,
        &mut stackinp,
    );

    stackinp.push(Resource::new(HEADERS_POLICY_ID, ResponseHeadersPolicy::security_headers(&config.stack_name)));

    let mut behavior = DefaultCacheBehavior::new(ORIGIN_ID);
    behavior.response_headers_policy_id = Some(get_ref(HEADERS_POLICY_ID));
    let distribution = Distribution {
        distribution_config: DistributionConfig {
            comment: Some(site_domain.clone()),
            aliases: vec![site_domain.clone()],
            default_root_object: config.default_root_object.clone(),
            enabled: true,
            http_version: "http2".to_string(),
            ipv6_enabled: true,
            origins: vec![Origin::s3_bucket(ORIGIN_ID, &bucket_id, OAI_ID)],
            default_cache_behavior: behavior,
            viewer_certificate: ViewerCertificate::acm(get_att(&cert_id, "Arn")),
        },
    };
    stackinp.push(Resource::new(DISTRIBUTION_ID, distribution));

    stackinp.push(Resource::new(ALIAS_RECORD_ID, RecordSet::cloudfront_alias(&zone.id, &site_domain, DISTRIBUTION_ID)));

    stackinp.add_output("BucketName", "bucket holding the site assets", get_ref(&bucket_id));
    stackinp.add_output("DistributionId", "CloudFront distribution id", get_ref(DISTRIBUTION_ID));
    stackinp.add_output("DistributionDomainName", "CloudFront domain name", get_att(DISTRIBUTION_ID, "DomainName"));
    stackinp.add_output("CertificateArn", "ACM certificate in us-east-1", get_att(&cert_id, "Arn"));
    stackinp.add_output(
        "SiteUrl",
        "address the site is served on",
        join("", vec![Value::String("https://".to_string()), get_ref(ALIAS_RECORD_ID)]),
    );

    info!(site = %site_domain, zone = %zone.id, resources = stackinp.resources.len(), "built static website");
    Ok(stackinp)
}
