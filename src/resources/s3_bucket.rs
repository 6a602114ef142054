use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::lambda::{CustomResource, Function, Role};
use super::{bucket_objects_arn, get_att, get_ref, PolicyStatement};
use crate::error::Result;
use crate::stack::{CfnResource, DeletionPolicy, Resource, StackInput};

/// Empties every object version and delete marker from the bucket named
/// in the resource properties when the custom resource is deleted, and from
/// the previous bucket when an update replaces it with a new name. A
/// versioned bucket that still holds anything cannot be deleted by
/// CloudFormation.
pub const CLEANUP_HANDLER_SOURCE: &str = r#"const { S3Client, ListObjectVersionsCommand, DeleteObjectsCommand } = require('@aws-sdk/client-s3');
const response = require('cfn-response');
const s3 = new S3Client({});
async function emptyBucket(Bucket) {
  let KeyMarker, VersionIdMarker;
  for (;;) {
    const page = await s3.send(new ListObjectVersionsCommand({ Bucket, KeyMarker, VersionIdMarker }));
    const Objects = [...(page.Versions || []), ...(page.DeleteMarkers || [])]
      .map((o) => ({ Key: o.Key, VersionId: o.VersionId }));
    if (Objects.length) {
      await s3.send(new DeleteObjectsCommand({ Bucket, Delete: { Objects, Quiet: true } }));
    }
    if (!page.IsTruncated) return;
    KeyMarker = page.NextKeyMarker;
    VersionIdMarker = page.NextVersionIdMarker;
  }
}
function staleBucket(event) {
  if (event.RequestType === 'Delete') return event.ResourceProperties.BucketName;
  const old = event.OldResourceProperties;
  if (event.RequestType === 'Update' && old && old.BucketName !== event.ResourceProperties.BucketName) return old.BucketName;
}
exports.handler = async function (event, context) {
  let status = response.SUCCESS;
  const bucket = staleBucket(event);
  if (bucket) {
    try {
      await emptyBucket(bucket);
    } catch (err) {
      console.log(err);
      if (err.name !== 'NoSuchBucket') status = response.FAILED;
    }
  }
  await response.send(event, context, status, {}, event.PhysicalResourceId || context.logStreamName);
};
"#;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersioningConfiguration {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlockConfiguration {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockConfiguration {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning_configuration: Option<VersioningConfiguration>,
    pub public_access_block_configuration: PublicAccessBlockConfiguration,
}

impl CfnResource for Bucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(name) = &self.bucket_name {
            verify_bucket_name(name)?;
        }
        if self.public_access_block_configuration != PublicAccessBlockConfiguration::block_all() {
            return Err("site buckets must block all public access".to_string());
        }
        Ok(())
    }
}

pub fn verify_bucket_name(bucket_name: &str) -> std::result::Result<(), String> {
    if bucket_name.len() > 63 || bucket_name.len() < 3 {
        return Err(format!("Invalid bucket name {:?}\nMust be between 3 and 63 characters", bucket_name));
    }
    let valid_char_check = |c: char| -> bool { c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' };
    if !bucket_name.chars().all(valid_char_check) {
        return Err(format!("Invalid bucket name {:?}\nMay only contain lowercase letters, numbers, dots, and dashes", bucket_name));
    }
    let first_ok = bucket_name.chars().next().map_or(false, |c| c.is_ascii_alphanumeric());
    let last_ok = bucket_name.chars().last().map_or(false, |c| c.is_ascii_alphanumeric());
    if !first_ok || !last_ok {
        return Err(format!("Invalid bucket name {:?}\nFirst and last character mut be either lowercase letter, or number", bucket_name));
    }
    if bucket_name.contains("..") {
        return Err(format!("Invalid bucket name {:?}\nMay not contain two consecutive dots", bucket_name));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    pub bucket: Value,
    pub policy_document: Value,
}

fn is_public_principal(principal: &Value) -> bool {
    match principal {
        Value::String(s) => s == "*",
        Value::Object(map) => map.get("AWS").map_or(false, |v| v == "*"),
        _ => false,
    }
}

impl CfnResource for BucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        let statements = self.policy_document["Statement"].as_array().ok_or("bucket policy has no statements")?;
        if statements.iter().any(|s| is_public_principal(&s["Principal"])) {
            return Err("bucket policy must not grant access to a public principal".to_string());
        }
        Ok(())
    }
}

pub struct SiteBucket {
    pub logical_id: String,
    pub bucket_name: String,
    pub versioned: bool,
    /// empty the bucket when the stack is deleted, instead of leaving the
    /// delete to fail on a non-empty bucket.
    pub auto_delete_objects: bool,
}

/// Adds the private bucket, its OAI-only read policy and (optionally)
/// the cleanup resources. Returns the logical id of the bucket.
pub fn add_site_bucket(conf: &SiteBucket, oai_logical_id: &str, stackinp: &mut StackInput) -> String {
    let logical_bucket_name = conf.logical_id.clone();
    let bucket = Bucket {
        bucket_name: Some(conf.bucket_name.clone()),
        versioning_configuration: conf.versioned.then(|| VersioningConfiguration { status: "Enabled".to_string() }),
        public_access_block_configuration: PublicAccessBlockConfiguration::block_all(),
    };
    stackinp.push(Resource::new(&logical_bucket_name, bucket).deletion_policy(DeletionPolicy::Delete));

    let read_statement = PolicyStatement::allow(&["s3:GetObject"], vec![bucket_objects_arn(&logical_bucket_name)])
        .with_principal(json!({ "CanonicalUser": get_att(oai_logical_id, "S3CanonicalUserId") }));
    let bucket_policy = BucketPolicy {
        bucket: get_ref(&logical_bucket_name),
        policy_document: super::create_policy_doc(&[read_statement]),
    };
    let logical_policy_name = format!("{logical_bucket_name}Policy");
    stackinp.push(Resource::new(&logical_policy_name, bucket_policy));

    if conf.auto_delete_objects {
        add_cleanup_resources(&logical_bucket_name, stackinp);
    }
    debug!(bucket = %conf.bucket_name, logical_id = %logical_bucket_name, "added site bucket");
    logical_bucket_name
}

fn add_cleanup_resources(logical_bucket_name: &str, stackinp: &mut StackInput) {
    let logical_role_name = format!("{logical_bucket_name}AutoDeleteObjectsRole");
    let logical_fn_name = format!("{logical_bucket_name}AutoDeleteObjectsHandler");
    let logical_cleanup_name = format!("{logical_bucket_name}AutoDeleteObjects");

    let role = Role::for_lambda(
        &format!("empties {logical_bucket_name} before the stack deletes it"),
        "auto-delete-objects",
        &[
            PolicyStatement::allow(&["s3:ListBucket", "s3:ListBucketVersions"], vec![get_att(logical_bucket_name, "Arn")]),
            PolicyStatement::allow(&["s3:DeleteObject", "s3:DeleteObjectVersion"], vec![bucket_objects_arn(logical_bucket_name)]),
        ],
    );
    let function = Function::inline_node(
        &format!("deletes all objects in {logical_bucket_name} on stack teardown"),
        CLEANUP_HANDLER_SOURCE,
        &logical_role_name,
        900,
    );
    let mut properties = serde_json::Map::new();
    properties.insert("BucketName".to_string(), get_ref(logical_bucket_name));
    let cleanup = CustomResource {
        type_name: "Custom::S3AutoDeleteObjects",
        function_logical_id: logical_fn_name.clone(),
        properties,
    };

    stackinp.push(Resource::new(&logical_role_name, role));
    stackinp.push(Resource::new(&logical_fn_name, function));
    // deleted before the bucket policy, so the bucket is already empty by
    // the time CloudFormation gets to the bucket
    stackinp.push(Resource::new(&logical_cleanup_name, cleanup).depends_on(&format!("{logical_bucket_name}Policy")));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stack::StackInput;

    fn site_bucket(auto_delete_objects: bool) -> SiteBucket {
        SiteBucket {
            logical_id: "FrontEndBucket".to_string(),
            bucket_name: "aws-icon-frontend-bucket".to_string(),
            versioned: true,
            auto_delete_objects,
        }
    }

    #[test]
    fn bucket_names() {
        assert!(verify_bucket_name("aws-icon-frontend-bucket").is_ok());
        assert!(verify_bucket_name("ab").unwrap_err().contains("Must be between 3 and 63 characters"));
        assert!(verify_bucket_name("Upper-case").unwrap_err().contains("lowercase"));
        assert!(verify_bucket_name("-dash-first").unwrap_err().contains("First and last"));
        assert!(verify_bucket_name("something..exact").unwrap_err().contains("May not contain two consecutive dots"));
    }

    #[test]
    fn bucket_is_private_versioned_and_deleted_with_stack() {
        let mut stackinp = StackInput::new("test");
        add_site_bucket(&site_bucket(false), "OAI", &mut stackinp);
        let stack = stackinp.synthesize().unwrap();
        let bucket = &stack.template.resources["FrontEndBucket"];
        assert_eq!(bucket.ty, "AWS::S3::Bucket");
        assert_eq!(bucket.deletion_policy, Some(DeletionPolicy::Delete));
        assert_eq!(bucket.properties["BucketName"], "aws-icon-frontend-bucket");
        assert_eq!(bucket.properties["VersioningConfiguration"]["Status"], "Enabled");
        for flag in ["BlockPublicAcls", "BlockPublicPolicy", "IgnorePublicAcls", "RestrictPublicBuckets"] {
            assert_eq!(bucket.properties["PublicAccessBlockConfiguration"][flag], true, "{flag}");
        }
        assert!(bucket.properties.get("WebsiteConfiguration").is_none());
        assert!(bucket.properties.get("AccessControl").is_none());
        // no cleanup requested
        assert_eq!(stack.template.resources.len(), 2);
    }

    #[test]
    fn cleanup_resources_are_wired_to_the_bucket() {
        let mut stackinp = StackInput::new("test");
        add_site_bucket(&site_bucket(true), "OAI", &mut stackinp);
        let stack = stackinp.synthesize().unwrap();
        let resources = &stack.template.resources;
        let cleanup = &resources["FrontEndBucketAutoDeleteObjects"];
        assert_eq!(cleanup.ty, "Custom::S3AutoDeleteObjects");
        assert_eq!(cleanup.properties["BucketName"]["Ref"], "FrontEndBucket");
        assert_eq!(cleanup.properties["ServiceToken"]["Fn::GetAtt"][0], "FrontEndBucketAutoDeleteObjectsHandler");
        assert_eq!(cleanup.depends_on, vec!["FrontEndBucketPolicy".to_string()]);
        let handler = &resources["FrontEndBucketAutoDeleteObjectsHandler"];
        assert_eq!(handler.properties["Role"]["Fn::GetAtt"][0], "FrontEndBucketAutoDeleteObjectsRole");
        let statements = &resources["FrontEndBucketAutoDeleteObjectsRole"].properties["Policies"][0]["PolicyDocument"]["Statement"];
        assert_eq!(statements[1]["Action"], json!(["s3:DeleteObject", "s3:DeleteObjectVersion"]));
    }

    #[test]
    fn public_principals_are_rejected() {
        let policy = BucketPolicy {
            bucket: get_ref("B"),
            policy_document: super::super::create_policy_doc(&[
                PolicyStatement::allow(&["s3:GetObject"], vec![json!("*")]).with_principal(json!("*")),
            ]),
        };
        assert!(policy.validate().is_err());

        let policy = BucketPolicy {
            bucket: get_ref("B"),
            policy_document: super::super::create_policy_doc(&[
                PolicyStatement::allow(&["s3:GetObject"], vec![json!("*")]).with_principal(json!({ "AWS": "*" })),
            ]),
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn cleanup_handler_fits_inline_limit() {
        assert!(CLEANUP_HANDLER_SOURCE.chars().count() <= super::super::lambda::ZIP_FILE_LIMIT);
    }

    const S3_STUB: &str = r#"class Command { constructor(input) { this.input = input; } }
class ListObjectVersionsCommand extends Command {}
class DeleteObjectsCommand extends Command {}
class S3Client {
  async send(cmd) {
    if (cmd instanceof ListObjectVersionsCommand) {
      return { Versions: [{ Key: 'index.html', VersionId: 'v1' }], DeleteMarkers: [{ Key: 'old.html', VersionId: 'v2' }], IsTruncated: false };
    }
    console.log(`DELETE ${cmd.input.Bucket} ${cmd.input.Delete.Objects.length}`);
    return {};
  }
}
module.exports = { S3Client, ListObjectVersionsCommand, DeleteObjectsCommand };
"#;

    fn run_cleanup(event: serde_json::Value) -> Option<String> {
        crate::resources::lambda::run_inline_handler(CLEANUP_HANDLER_SOURCE, &[("@aws-sdk/client-s3", S3_STUB)], &event, 800_000)
    }

    #[test]
    fn cleanup_empties_bucket_on_delete() {
        let event = serde_json::json!({
            "RequestType": "Delete",
            "PhysicalResourceId": "cleanup-1",
            "ResourceProperties": { "BucketName": "site-bucket" },
        });
        let Some(out) = run_cleanup(event) else { return };
        assert!(out.contains("DELETE site-bucket 2"), "{out}");
        assert!(out.contains("RESPONSE SUCCESS cleanup-1"), "{out}");
    }

    #[test]
    fn cleanup_empties_replaced_bucket_on_rename() {
        let event = serde_json::json!({
            "RequestType": "Update",
            "PhysicalResourceId": "cleanup-1",
            "ResourceProperties": { "BucketName": "new-bucket" },
            "OldResourceProperties": { "BucketName": "old-bucket" },
        });
        let Some(out) = run_cleanup(event) else { return };
        assert!(out.contains("DELETE old-bucket 2"), "{out}");
        assert!(!out.contains("DELETE new-bucket"), "{out}");
        assert!(out.contains("RESPONSE SUCCESS cleanup-1"), "{out}");
    }

    #[test]
    fn cleanup_keeps_objects_when_bucket_is_unchanged() {
        for request_type in ["Create", "Update"] {
            let event = serde_json::json!({
                "RequestType": request_type,
                "ResourceProperties": { "BucketName": "site-bucket" },
                "OldResourceProperties": { "BucketName": "site-bucket" },
            });
            let Some(out) = run_cleanup(event) else { return };
            assert!(!out.contains("DELETE"), "{out}");
            assert!(out.contains("RESPONSE SUCCESS log-stream"), "{out}");
        }
    }
}

