use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::stack::CfnResource;

/// 2 years, the minimum the HSTS preload list accepts.
pub const HSTS_MAX_AGE_SECONDS: u32 = 63_072_000;
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'";
pub const REFERRER_POLICY: &str = "strict-origin-when-cross-origin";
pub const FRAME_OPTION: &str = "DENY";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentSecurityPolicy {
    pub content_security_policy: String,
    pub r#override: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StrictTransportSecurity {
    pub access_control_max_age_sec: u32,
    pub include_subdomains: bool,
    pub preload: bool,
    pub r#override: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContentTypeOptions {
    pub r#override: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReferrerPolicy {
    pub referrer_policy: String,
    pub r#override: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XssProtection {
    pub protection: bool,
    pub mode_block: bool,
    pub r#override: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrameOptions {
    pub frame_option: String,
    pub r#override: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityHeadersConfig {
    pub content_security_policy: ContentSecurityPolicy,
    pub strict_transport_security: StrictTransportSecurity,
    pub content_type_options: ContentTypeOptions,
    pub referrer_policy: ReferrerPolicy,
    #[serde(rename = "XSSProtection")]
    pub xss_protection: XssProtection,
    pub frame_options: FrameOptions,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            content_security_policy: ContentSecurityPolicy {
                content_security_policy: CONTENT_SECURITY_POLICY.to_string(),
                r#override: true,
            },
            strict_transport_security: StrictTransportSecurity {
                access_control_max_age_sec: HSTS_MAX_AGE_SECONDS,
                include_subdomains: true,
                preload: true,
                r#override: true,
            },
            content_type_options: ContentTypeOptions { r#override: true },
            referrer_policy: ReferrerPolicy {
                referrer_policy: REFERRER_POLICY.to_string(),
                r#override: true,
            },
            xss_protection: XssProtection { protection: true, mode_block: true, r#override: true },
            frame_options: FrameOptions { frame_option: FRAME_OPTION.to_string(), r#override: true },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseHeadersPolicyConfig {
    pub name: String,
    pub comment: String,
    pub security_headers_config: SecurityHeadersConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseHeadersPolicy {
    pub response_headers_policy_config: ResponseHeadersPolicyConfig,
}

impl ResponseHeadersPolicy {
    pub fn security_headers(stack_name: &str) -> Self {
        Self {
            response_headers_policy_config: ResponseHeadersPolicyConfig {
                name: policy_name(stack_name),
                comment: "Security headers response header policy".to_string(),
                security_headers_config: SecurityHeadersConfig::default(),
            },
        }
    }
}

/// Policy names are account wide, so the stack name is folded in and a
/// checksum keeps names distinct after truncation.
pub fn policy_name(stack_name: &str) -> String {
    let mut base: String = stack_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let suffix = format!("-security-headers-{:08x}", adler::adler32_slice(stack_name.as_bytes()));
    base.truncate(128 - suffix.len());
    base.push_str(&suffix);
    base
}

pub fn verify_policy_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name.len() > 128 {
        return Err(format!("response headers policy name {name:?} must be 1 to 128 characters"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(format!("response headers policy name {name:?} may only contain [A-Za-z0-9_-]"));
    }
    Ok(())
}

impl CfnResource for ResponseHeadersPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::ResponseHeadersPolicy"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        verify_policy_name(&self.response_headers_policy_config.name)
    }
}
