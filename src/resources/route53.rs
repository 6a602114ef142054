use serde::Serialize;
use serde_json::Value;

use super::{get_att, CLOUDFRONT_HOSTED_ZONE_ID};
use crate::error::Result;
use crate::stack::CfnResource;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AliasTarget {
    #[serde(rename = "DNSName")]
    pub dns_name: Value,
    pub hosted_zone_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordSet {
    pub hosted_zone_id: String,
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub alias_target: AliasTarget,
}

impl RecordSet {
    /// an `A` alias from `name` to a distribution in this stack.
    pub fn cloudfront_alias(hosted_zone_id: &str, name: &str, distribution_logical_id: &str) -> Self {
        Self {
            hosted_zone_id: hosted_zone_id.to_string(),
            name: name.to_string(),
            record_type: "A".to_string(),
            comment: Some(name.to_string()),
            alias_target: AliasTarget {
                dns_name: get_att(distribution_logical_id, "DomainName"),
                hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.to_string(),
            },
        }
    }
}

impl CfnResource for RecordSet {
    fn type_string(&self) -> &'static str {
        "AWS::Route53::RecordSet"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("Route53 record must have a name. Example mysubdomain.mywebsite.com".to_string());
        }
        if self.hosted_zone_id.is_empty() {
            return Err(format!("Route53 record {} must have a hosted zone id", self.name));
        }
        if !matches!(self.record_type.as_str(), "A" | "AAAA") {
            return Err(format!("alias records must be A or AAAA, found {}", self.record_type));
        }
        Ok(())
    }
}
