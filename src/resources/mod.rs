use serde_json::{json, Value};

pub mod acm_cert;
pub mod cloudfront;
pub mod headers_policy;
pub mod lambda;
pub mod route53;
pub mod s3_bucket;

// higher level resources:
pub mod static_website;

/// Every CloudFront alias target lives in this hosted zone. See
/// https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-properties-route53-aliastarget.html#cfn-route53-aliastarget-hostedzoneid
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// caching optimized:
/// https://docs.aws.amazon.com/AmazonCloudFront/latest/DeveloperGuide/using-managed-cache-policies.html#managed-cache-caching-optimized
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `<bucket arn>/*`
pub fn bucket_objects_arn(bucket_logical_id: &str) -> Value {
    join("", vec![get_att(bucket_logical_id, "Arn"), Value::String("/*".to_string())])
}

/// One IAM statement. `principal` is left out of identity policies and set
/// on resource policies.
#[derive(Debug, Clone)]
pub struct PolicyStatement {
    pub effect: String,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub principal: Option<Value>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<Value>) -> Self {
        Self {
            effect: "Allow".to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut statement = serde_json::Map::new();
        statement.insert("Effect".to_string(), Value::String(self.effect.clone()));
        statement.insert("Action".to_string(), single_or_list(self.actions.iter().map(|a| Value::String(a.clone())).collect()));
        if let Some(principal) = &self.principal {
            statement.insert("Principal".to_string(), principal.clone());
        }
        statement.insert("Resource".to_string(), single_or_list(self.resources.clone()));
        Value::Object(statement)
    }
}

fn single_or_list(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

pub fn create_policy_doc(statements: &[PolicyStatement]) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": statements.iter().map(PolicyStatement::to_value).collect::<Vec<_>>(),
    })
}

pub fn create_assume_role_policy_doc(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}
