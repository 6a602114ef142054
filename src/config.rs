use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::regions::verify_region;
use crate::resources::acm_cert::{verify_domain_label, verify_domain_name};
use crate::resources::s3_bucket::verify_bucket_name;
use crate::stack::validate_stack_name;

pub const ENV_DOMAIN: &str = "STATIC_SITE_DOMAIN";
pub const ENV_SUBDOMAIN: &str = "STATIC_SITE_SUBDOMAIN";
pub const ENV_BUCKET: &str = "STATIC_SITE_BUCKET";
pub const ENV_STACK_NAME: &str = "STATIC_SITE_STACK_NAME";
pub const ENV_REGION: &str = "STATIC_SITE_REGION";

/// Everything the stack is parameterized on. The defaults are the values
/// the site was first deployed with, so an empty config file (or no
/// config file at all) synthesizes the same template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// name of the CloudFormation stack.
    pub stack_name: String,
    /// region the stack itself is deployed to. The certificate always
    /// lives in us-east-1 no matter what this is set to.
    pub region: String,
    /// apex domain. A public hosted zone with this exact name must
    /// already exist in the account.
    pub domain_name: String,
    /// label prepended to `domain_name` for the site address.
    pub subdomain: String,
    /// physical bucket name. Must be globally unique.
    pub bucket_name: String,
    pub default_root_object: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "AwsCdkCloudformationStack".to_string(),
            region: "us-east-1".to_string(),
            domain_name: "acuitylabs.us".to_string(),
            subdomain: "icon".to_string(),
            bucket_name: "aws-icon-frontend-bucket".to_string(),
            default_root_object: "index.html".to_string(),
        }
    }
}

impl StackConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loaded stack config");
        Self::from_toml_str(&contents)
    }

    /// defaults, then the optional config file, then `STATIC_SITE_*`
    /// environment variables. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<I: IntoIterator<Item = (String, String)>>(&mut self, vars: I) {
        for (key, value) in vars {
            if value.is_empty() {
                continue;
            }
            let field = match key.as_str() {
                ENV_DOMAIN => &mut self.domain_name,
                ENV_SUBDOMAIN => &mut self.subdomain,
                ENV_BUCKET => &mut self.bucket_name,
                ENV_STACK_NAME => &mut self.stack_name,
                ENV_REGION => &mut self.region,
                _ => continue,
            };
            debug!(%key, %value, "config override from environment");
            *field = value;
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_stack_name(&self.stack_name)?;
        verify_bucket_name(&self.bucket_name).map_err(Error::Config)?;
        if let Some(e) = verify_region(&self.region) {
            return Err(Error::Config(e));
        }
        if self.domain_name.contains('*') {
            return Err(Error::Config(format!("domain_name {} must not contain a wildcard", self.domain_name)));
        }
        verify_domain_name(&self.domain_name).map_err(Error::Config)?;
        verify_domain_label(&self.subdomain).map_err(|e| Error::Config(format!("Invalid subdomain: {e}")))?;
        if self.default_root_object.is_empty() || self.default_root_object.starts_with('/') {
            return Err(Error::Config(format!(
                "default_root_object {:?} must be a non-empty object key without a leading '/'",
                self.default_root_object
            )));
        }
        Ok(())
    }

    /// the address the site is served on, eg: icon.acuitylabs.us
    pub fn site_domain(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain_name)
    }

    pub fn wildcard_domain(&self) -> String {
        format!("*.{}", self.domain_name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_deployed_site() {
        let config = StackConfig::default();
        assert_eq!(config.site_domain(), "icon.acuitylabs.us");
        assert_eq!(config.wildcard_domain(), "*.acuitylabs.us");
        assert_eq!(config.bucket_name, "aws-icon-frontend-bucket");
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(StackConfig::from_toml_str("").unwrap(), StackConfig::default());
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let config = StackConfig::from_toml_str("domain_name = \"example.com\"\nsubdomain = \"www\"\n").unwrap();
        assert_eq!(config.site_domain(), "www.example.com");
        assert_eq!(config.bucket_name, "aws-icon-frontend-bucket");
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        assert!(StackConfig::from_toml_str("domian_name = \"example.com\"").is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = StackConfig::default();
        config.apply_env(vec![
            (ENV_DOMAIN.to_string(), "example.com".to_string()),
            (ENV_REGION.to_string(), "eu-west-1".to_string()),
            (ENV_BUCKET.to_string(), "".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);
        assert_eq!(config.domain_name, "example.com");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.bucket_name, "aws-icon-frontend-bucket");
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"stack_name = \"my-site\"\n").unwrap();
        let config = StackConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stack_name, "my-site");
    }

    #[test]
    fn validation_errors() {
        let mut config = StackConfig::default();
        config.region = "nowhere-1".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = StackConfig::default();
        config.domain_name = "*.example.com".into();
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.domain_name = "example.com.".into();
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.domain_name = "Example.com".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = StackConfig::default();
        config.subdomain = "Icon".into();
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.subdomain = "-icon".into();
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.default_root_object = "/index.html".into();
        assert!(config.validate().is_err());

        let mut config = StackConfig::default();
        config.bucket_name = "Has_Upper".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = StackConfig::default();
        config.stack_name = "1stack".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
