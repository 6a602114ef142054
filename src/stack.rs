use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A typed CloudFormation resource. Implementors serialize their own
/// `Properties` block and may reject invalid settings before anything is
/// sent to CloudFormation.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> Result<Value>;
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Every resource this stack creates is removed with it; the bucket is
/// emptied first by its cleanup resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
}

pub struct Resource {
    pub name: String,
    pub properties: Box<dyn CfnResource>,
    /// explicit ordering on top of whatever Ref/GetAtt already imply.
    pub depends_on: Vec<String>,
    /// applied as both DeletionPolicy and UpdateReplacePolicy.
    pub deletion_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new<R: CfnResource + 'static>(name: &str, properties: R) -> Self {
        Self {
            name: name.to_string(),
            properties: Box::new(properties) as _,
            depends_on: vec![],
            deletion_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        self.depends_on.push(logical_id.to_string());
        self
    }

    pub fn deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: "2010-09-09".to_string(),
            description: None,
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TemplateFormat {
    #[default]
    Json,
    Yaml,
}

/// a validated template together with the name of the stack it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub stack_name: String,
    pub template: SavedTemplate,
}

impl SynthesizedStack {
    pub fn render(&self, format: TemplateFormat) -> Result<String> {
        Ok(match format {
            // pretty so it reads well in the CloudFormation console too
            TemplateFormat::Json => serde_json::to_string_pretty(&self.template)?,
            TemplateFormat::Yaml => serde_yaml::to_string(&self.template)?,
        })
    }
}

/// the builder every resource module pushes into.
#[derive(Default)]
pub struct StackInput {
    /// if left empty, `synthesize` fails on stack name validation.
    pub stack_name: String,
    pub description: Option<String>,
    pub resources: Vec<Resource>,
    pub outputs: Vec<(String, ResourceOutput)>,
}

impl StackInput {
    pub fn new(stack_name: &str) -> Self {
        Self { stack_name: stack_name.to_string(), ..Default::default() }
    }

    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn add_output(&mut self, name: &str, description: &str, value: Value) {
        self.outputs.push((name.to_string(), ResourceOutput { description: description.to_string(), value }));
    }

    pub fn synthesize(self) -> Result<SynthesizedStack> {
        let stack_name = validate_stack_name(&self.stack_name)?;
        let mut template = validate_resources_to_template(&self.resources)?;
        template.description = self.description;
        for (name, output) in self.outputs {
            verify_logical_id(&name).map_err(|e| Error::validation(&name, e))?;
            template.outputs.insert(name, output);
        }
        Ok(SynthesizedStack { stack_name, template })
    }
}

pub fn verify_logical_id(resource_name: &str) -> std::result::Result<(), String> {
    if resource_name.len() > 255 {
        return Err(format!("Invalid resource name {:?}\nmust be less than 255 characters", resource_name));
    }
    if resource_name.is_empty() {
        return Err(format!("Invalid resource name {:?}\nMust contain at least 1 character", resource_name));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]", resource_name));
    }
    Ok(())
}

pub fn validate_resources_to_template(resources: &[Resource]) -> Result<SavedTemplate> {
    let mut out_template = SavedTemplate::default();
    for resource in resources.iter() {
        verify_logical_id(&resource.name).map_err(|e| Error::validation(&resource.name, e))?;
        resource.properties.validate().map_err(|e| Error::validation(&resource.name, e))?;
        if out_template.resources.contains_key(&resource.name) {
            return Err(Error::DuplicateResource(resource.name.clone()));
        }
        let saved_resource = SavedResource {
            ty: resource.properties.type_string().to_string(),
            properties: resource.properties.properties()?,
            depends_on: resource.depends_on.clone(),
            deletion_policy: resource.deletion_policy,
            update_replace_policy: resource.deletion_policy,
        };
        out_template.resources.insert(resource.name.clone(), saved_resource);
    }
    Ok(out_template)
}

pub fn validate_stack_name(stack_name: &str) -> Result<String> {
    // A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
    // It must start with an alphabetical character and can't be longer than 128 characters.
    let restriction = "Must only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.";
    let invalid = || Error::Config(format!("Invalid stack name {:?}\n{}", stack_name, restriction));
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    Ok(stack_name.to_string())
}
