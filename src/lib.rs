//! Synthesizes and deploys the CloudFormation stack for a static website
//! served from a private S3 bucket through CloudFront, on a subdomain of a
//! Route 53 hosted zone, with a DNS validated ACM certificate.

pub mod config;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod lookup;
pub mod regions;
pub mod resources;
pub mod stack;

pub use config::StackConfig;
pub use error::{Error, Result};
pub use lookup::HostedZone;
pub use stack::{SynthesizedStack, TemplateFormat};

use resources::static_website::build_static_website;

/// Builds and validates the whole template. Fails on invalid
/// configuration, invalid resources and dangling references.
pub fn synthesize(config: &StackConfig, zone: &HostedZone) -> Result<SynthesizedStack> {
    let stack = build_static_website(config, zone)?.synthesize()?;
    graph::check(&stack.template)?;
    Ok(stack)
}

/// one line per creation wave: `<n>: <logical id> (<type>), ...`
pub fn render_plan(stack: &SynthesizedStack) -> Result<String> {
    let waves = graph::creation_waves(&stack.template)?;
    let mut out = format!("stack {}\n", stack.stack_name);
    for (i, wave) in waves.iter().enumerate() {
        let entries: Vec<String> = wave
            .iter()
            .map(|id| format!("{id} ({})", stack.template.resources[id].ty))
            .collect();
        out.push_str(&format!("{}: {}\n", i + 1, entries.join(", ")));
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plan_lists_every_resource_once() {
        let config = StackConfig { domain_name: "example.com".to_string(), ..Default::default() };
        let zone = HostedZone { id: "Z1".to_string(), name: "example.com".to_string() };
        let stack = synthesize(&config, &zone).unwrap();
        let plan = render_plan(&stack).unwrap();
        assert!(plan.starts_with("stack AwsCdkCloudformationStack\n1: "));
        for id in stack.template.resources.keys() {
            assert_eq!(plan.matches(&format!("{id} (")).count(), 1, "{id} should appear once");
        }
    }

    #[test]
    fn invalid_config_does_not_synthesize() {
        let config = StackConfig { bucket_name: "Not_A_Bucket".to_string(), ..Default::default() };
        let zone = HostedZone { id: "Z1".to_string(), name: "acuitylabs.us".to_string() };
        assert!(synthesize(&config, &zone).is_err());
    }
}
