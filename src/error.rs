use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("validation failed on resource '{resource}'\n{reason}")]
    Validation { resource: String, reason: String },

    #[error("duplicate logical id '{0}' in stack")]
    DuplicateResource(String),

    #[error("no public hosted zone found for domain '{0}'")]
    ZoneNotFound(String),

    #[error("found {count} public hosted zones named '{domain}', expected exactly one")]
    AmbiguousZone { domain: String, count: usize },

    #[error("hosted zone for '{0}' is not in the context file and lookups are disabled")]
    LookupDisabled(String),

    #[error("'{from}' references '{to}' which is not a resource in this stack")]
    UnresolvedReference { from: String, to: String },

    #[error("dependency cycle between resources: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("stack {stack} failed: {reason}")]
    StackFailed { stack: String, reason: String },

    #[error("aws request failed: {0}")]
    Aws(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn validation(resource: &str, reason: impl Into<String>) -> Self {
        Error::Validation { resource: resource.to_string(), reason: reason.into() }
    }
}
