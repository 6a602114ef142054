use serde::Serialize;
use serde_json::{json, Value};

use super::{create_assume_role_policy_doc, create_policy_doc, PolicyStatement};
use crate::error::Result;
use crate::stack::CfnResource;

/// CloudFormation rejects inline `ZipFile` sources longer than this.
pub const ZIP_FILE_LIMIT: usize = 4096;

pub const NODE_RUNTIME: &str = "nodejs18.x";

pub fn basic_execution_policy_arn() -> Value {
    json!({ "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole" })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InlinePolicy {
    pub policy_name: String,
    pub policy_document: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub assume_role_policy_document: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<InlinePolicy>,
}

impl Role {
    /// an execution role for a lambda function with the basic logging
    /// policy plus `statements`.
    pub fn for_lambda(description: &str, policy_name: &str, statements: &[PolicyStatement]) -> Self {
        Self {
            description: Some(description.to_string()),
            assume_role_policy_document: create_assume_role_policy_doc("lambda.amazonaws.com"),
            managed_policy_arns: vec![basic_execution_policy_arn()],
            policies: vec![InlinePolicy {
                policy_name: policy_name.to_string(),
                policy_document: create_policy_doc(statements),
            }],
        }
    }
}

impl CfnResource for Role {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Code {
    pub zip_file: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Function {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub runtime: String,
    pub handler: String,
    pub role: Value,
    pub timeout: u32,
    pub memory_size: u32,
    pub code: Code,
}

impl Function {
    /// a node function whose whole source is inlined into the template.
    pub fn inline_node(description: &str, source: &str, role_logical_id: &str, timeout: u32) -> Self {
        Self {
            description: Some(description.to_string()),
            runtime: NODE_RUNTIME.to_string(),
            handler: "index.handler".to_string(),
            role: super::get_att(role_logical_id, "Arn"),
            timeout,
            memory_size: 128,
            code: Code { zip_file: source.to_string() },
        }
    }
}

impl CfnResource for Function {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }
    fn properties(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
    fn validate(&self) -> std::result::Result<(), String> {
        let len = self.code.zip_file.chars().count();
        if len == 0 {
            return Err("inline function code is empty".to_string());
        }
        if len > ZIP_FILE_LIMIT {
            return Err(format!("inline function code is {len} characters, limit is {ZIP_FILE_LIMIT}"));
        }
        if self.timeout == 0 || self.timeout > 900 {
            return Err(format!("function timeout {} must be between 1 and 900 seconds", self.timeout));
        }
        if !(128..=10240).contains(&self.memory_size) {
            return Err(format!("function memory size {} must be between 128 and 10240 MB", self.memory_size));
        }
        Ok(())
    }
}

/// A `Custom::*` resource backed by a lambda function.
pub struct CustomResource {
    pub type_name: &'static str,
    pub function_logical_id: String,
    pub properties: serde_json::Map<String, Value>,
}

impl CfnResource for CustomResource {
    fn type_string(&self) -> &'static str {
        self.type_name
    }
    fn properties(&self) -> Result<Value> {
        let mut map = serde_json::Map::new();
        map.insert("ServiceToken".to_string(), super::get_att(&self.function_logical_id, "Arn"));
        for (key, val) in self.properties.iter() {
            map.insert(key.clone(), val.clone());
        }
        Ok(Value::Object(map))
    }
    fn validate(&self) -> std::result::Result<(), String> {
        if !self.type_name.starts_with("Custom::") {
            return Err(format!("custom resource type {} must start with Custom::", self.type_name));
        }
        if self.properties.contains_key("ServiceToken") {
            return Err("ServiceToken is set from function_logical_id, do not pass it as a property".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn function_code_limit() {
        let mut f = Function::inline_node("test", "exports.handler = async () => {}", "Role", 30);
        assert!(f.validate().is_ok());
        f.code.zip_file = "x".repeat(ZIP_FILE_LIMIT + 1);
        assert!(f.validate().unwrap_err().contains("limit is 4096"));
        f.code.zip_file = String::new();
        assert!(f.validate().is_err());
    }

    #[test]
    fn function_properties() {
        let f = Function::inline_node("test", "code", "MyRole", 900);
        let props = f.properties().unwrap();
        assert_eq!(props["Runtime"], NODE_RUNTIME);
        assert_eq!(props["Role"]["Fn::GetAtt"], json!(["MyRole", "Arn"]));
        assert_eq!(props["Code"]["ZipFile"], "code");
        assert_eq!(props["Timeout"], 900);
    }

    #[test]
    fn role_has_basic_execution_and_inline_policy() {
        let role = Role::for_lambda("desc", "p", &[PolicyStatement::allow(&["s3:ListBucket"], vec![json!("*")])]);
        let props = role.properties().unwrap();
        assert_eq!(props["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"], "lambda.amazonaws.com");
        assert_eq!(props["Policies"][0]["PolicyName"], "p");
        assert_eq!(props["ManagedPolicyArns"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn custom_resource_injects_service_token() {
        let mut properties = serde_json::Map::new();
        properties.insert("BucketName".to_string(), json!("b"));
        let custom = CustomResource { type_name: "Custom::Thing", function_logical_id: "Fn".to_string(), properties };
        assert!(custom.validate().is_ok());
        let props = custom.properties().unwrap();
        assert_eq!(props["ServiceToken"]["Fn::GetAtt"], json!(["Fn", "Arn"]));
        assert_eq!(props["BucketName"], "b");

        let bad = CustomResource { type_name: "AWS::Thing", function_logical_id: "Fn".to_string(), properties: Default::default() };
        assert!(bad.validate().is_err());
    }
}

/// Runs an inline handler under `node` with stub `require` modules next to
/// it. Every `cfn-response` send prints `RESPONSE <status>` and timers fire
/// immediately. Returns `None` when node is not installed.
#[cfg(test)]
pub(crate) fn run_inline_handler(
    source: &str,
    stubs: &[(&str, &str)],
    event: &Value,
    remaining_ms: u64,
) -> Option<String> {
    const CFN_RESPONSE_STUB: &str = r#"module.exports = {
  SUCCESS: 'SUCCESS',
  FAILED: 'FAILED',
  send: async (event, context, status, data, id) => console.log(`RESPONSE ${status} ${id}`),
};
"#;
    const DRIVER: &str = r#"global.setTimeout = (fn) => setImmediate(fn);
const event = JSON.parse(process.argv[2]);
const remaining = Number(process.argv[3]);
const context = { logStreamName: 'log-stream', getRemainingTimeInMillis: () => remaining };
require('./index.js').handler(event, context).then(() => console.log('DONE'));
"#;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.js"), source).unwrap();
    std::fs::write(dir.path().join("driver.js"), DRIVER).unwrap();
    let modules = stubs.iter().copied().chain([("cfn-response", CFN_RESPONSE_STUB)]);
    for (name, stub) in modules {
        let module_dir = dir.path().join("node_modules").join(name);
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join("index.js"), stub).unwrap();
    }
    let output = std::process::Command::new("node")
        .arg("driver.js")
        .arg(event.to_string())
        .arg(remaining_ms.to_string())
        .current_dir(dir.path())
        .output();
    match output {
        Ok(out) => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => panic!("failed to run node: {e}"),
    }
}
