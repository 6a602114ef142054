use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A public Route 53 zone. `id` never carries the `/hostedzone/` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostedZone {
    pub id: String,
    pub name: String,
}

impl HostedZone {
    pub fn matches(&self, domain_name: &str) -> bool {
        normalize_zone_name(&self.name) == normalize_zone_name(domain_name)
    }
}

/// what a zone listing tells us about each zone.
#[derive(Debug, Clone)]
pub struct ZoneSummary {
    pub id: String,
    pub name: String,
    pub private_zone: bool,
}

pub fn normalize_zone_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

pub fn strip_zone_prefix(id: &str) -> &str {
    id.strip_prefix("/hostedzone/").unwrap_or(id)
}

/// Picks the single public zone named exactly `domain_name`.
pub fn select_zone(domain_name: &str, zones: &[ZoneSummary]) -> Result<HostedZone> {
    let wanted = normalize_zone_name(domain_name);
    let found: Vec<&ZoneSummary> = zones
        .iter()
        .filter(|z| !z.private_zone && normalize_zone_name(&z.name) == wanted)
        .collect();
    match found.as_slice() {
        [] => Err(Error::ZoneNotFound(domain_name.to_string())),
        [zone] => Ok(HostedZone {
            id: strip_zone_prefix(&zone.id).to_string(),
            name: normalize_zone_name(&zone.name),
        }),
        many => Err(Error::AmbiguousZone { domain: domain_name.to_string(), count: many.len() }),
    }
}

pub fn context_key(domain_name: &str) -> String {
    format!("hosted-zone:domainName={}", normalize_zone_name(domain_name))
}

/// Lookup answers saved between runs, so synthesizing twice yields the
/// same template and works offline. Unknown keys are kept as they are.
#[derive(Debug, Default)]
pub struct ContextStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, Value>,
}

impl ContextStore {
    /// a missing file is an empty store.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = values.len(), "loaded context");
        Ok(Self { path: Some(path), values })
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let mut contents = serde_json::to_string_pretty(&self.values)?;
            contents.push('\n');
            std::fs::write(path, contents)?;
            debug!(path = %path.display(), "saved context");
        }
        Ok(())
    }

    pub fn hosted_zone(&self, domain_name: &str) -> Result<Option<HostedZone>> {
        match self.values.get(&context_key(domain_name)) {
            Some(val) => Ok(Some(serde_json::from_value(val.clone())?)),
            None => Ok(None),
        }
    }

    pub fn set_hosted_zone(&mut self, domain_name: &str, zone: &HostedZone) -> Result<()> {
        self.values.insert(context_key(domain_name), serde_json::to_value(zone)?);
        Ok(())
    }
}

/// One ListHostedZonesByName response.
#[derive(Debug, Clone, Default)]
pub struct ZonePage {
    pub zones: Vec<ZoneSummary>,
    pub is_truncated: bool,
    pub next_dns_name: Option<String>,
    pub next_hosted_zone_id: Option<String>,
}

/// Lists zones starting at `domain_name`, following truncated pages for as
/// long as they are still about `domain_name`, then picks the public zone.
/// `fetch` is called with the DNS name and zone id to continue from.
pub async fn find_zone<F, Fut>(domain_name: &str, mut fetch: F) -> Result<HostedZone>
where
    F: FnMut(String, Option<String>) -> Fut,
    Fut: Future<Output = Result<ZonePage>>,
{
    let wanted = normalize_zone_name(domain_name);
    let mut zones = vec![];
    let mut next = Some((wanted.clone(), None));
    while let Some((dns_name, zone_id)) = next.take() {
        let page = fetch(dns_name, zone_id).await?;
        zones.extend(page.zones);
        if page.is_truncated {
            if let Some(next_name) = page.next_dns_name {
                if normalize_zone_name(&next_name) == wanted {
                    next = Some((next_name, page.next_hosted_zone_id));
                }
            }
        }
    }
    debug!(domain = %wanted, listed = zones.len(), "listed hosted zones");
    select_zone(domain_name, &zones)
}

async fn list_zone_page(
    client: &aws_sdk_route53::Client,
    dns_name: String,
    zone_id: Option<String>,
) -> Result<ZonePage> {
    let out = client
        .list_hosted_zones_by_name()
        .dns_name(dns_name)
        .set_hosted_zone_id(zone_id)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("{}", aws_sdk_route53::error::DisplayErrorContext(&e))))?;
    Ok(ZonePage {
        zones: out
            .hosted_zones()
            .iter()
            .map(|zone| ZoneSummary {
                id: zone.id().to_string(),
                name: zone.name().to_string(),
                private_zone: zone.config().map(|c| c.private_zone()).unwrap_or(false),
            })
            .collect(),
        is_truncated: out.is_truncated(),
        next_dns_name: out.next_dns_name().map(String::from),
        next_hosted_zone_id: out.next_hosted_zone_id().map(String::from),
    })
}

pub async fn lookup_hosted_zone(client: &aws_sdk_route53::Client, domain_name: &str) -> Result<HostedZone> {
    find_zone(domain_name, |dns_name, zone_id| list_zone_page(client, dns_name, zone_id)).await
}

/// Answers from the context store when possible. Otherwise asks Route 53,
/// unless `client` is `None`, and records the answer in the store.
pub async fn resolve_hosted_zone(
    domain_name: &str,
    store: &mut ContextStore,
    client: Option<&aws_sdk_route53::Client>,
) -> Result<HostedZone> {
    if let Some(zone) = store.hosted_zone(domain_name)? {
        debug!(domain = domain_name, zone = %zone.id, "hosted zone from context");
        return Ok(zone);
    }
    let client = client.ok_or_else(|| Error::LookupDisabled(domain_name.to_string()))?;
    let zone = lookup_hosted_zone(client, domain_name).await?;
    info!(domain = domain_name, zone = %zone.id, "resolved hosted zone");
    store.set_hosted_zone(domain_name, &zone)?;
    store.save()?;
    Ok(zone)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn zone(id: &str, name: &str, private_zone: bool) -> ZoneSummary {
        ZoneSummary { id: id.to_string(), name: name.to_string(), private_zone }
    }

    #[test]
    fn selects_exact_public_zone() {
        let zones = vec![
            zone("/hostedzone/ZPRIVATE", "example.com.", true),
            zone("/hostedzone/ZPUBLIC", "example.com.", false),
            zone("/hostedzone/ZSUB", "sub.example.com.", false),
        ];
        let found = select_zone("example.com", &zones).unwrap();
        assert_eq!(found, HostedZone { id: "ZPUBLIC".to_string(), name: "example.com".to_string() });
        assert!(found.matches("example.com."));
    }

    #[test]
    fn missing_and_ambiguous_zones() {
        let zones = vec![zone("Z1", "example.org.", false)];
        assert!(matches!(select_zone("example.com", &zones), Err(Error::ZoneNotFound(d)) if d == "example.com"));
        assert!(matches!(select_zone("example.com", &[zone("Z1", "example.com.", true)]), Err(Error::ZoneNotFound(_))));

        let zones = vec![zone("Z1", "example.com.", false), zone("Z2", "Example.com", false)];
        assert!(matches!(select_zone("example.com", &zones), Err(Error::AmbiguousZone { count: 2, .. })));
    }

    #[test]
    fn context_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.context.json");
        let mut store = ContextStore::load(&path).unwrap();
        assert_eq!(store.hosted_zone("example.com").unwrap(), None);
        let zone = HostedZone { id: "Z1".to_string(), name: "example.com".to_string() };
        store.set_hosted_zone("example.com.", &zone).unwrap();
        store.save().unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["hosted-zone:domainName=example.com"]["Id"], "Z1");
        let reloaded = ContextStore::load(&path).unwrap();
        assert_eq!(reloaded.hosted_zone("example.com").unwrap(), Some(zone));
    }

    #[test]
    fn unknown_context_keys_survive() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"other:key": [1, 2]}}"#).unwrap();
        let mut store = ContextStore::load(file.path()).unwrap();
        store
            .set_hosted_zone("example.com", &HostedZone { id: "Z1".to_string(), name: "example.com".to_string() })
            .unwrap();
        store.save().unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(raw["other:key"], serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn cached_zone_needs_no_client() {
        let mut store = ContextStore::in_memory();
        let zone = HostedZone { id: "Z1".to_string(), name: "example.com".to_string() };
        store.set_hosted_zone("example.com", &zone).unwrap();
        assert_eq!(resolve_hosted_zone("example.com", &mut store, None).await.unwrap(), zone);
    }

    #[tokio::test]
    async fn no_lookups_without_cache_fails() {
        let mut store = ContextStore::in_memory();
        let err = resolve_hosted_zone("example.com", &mut store, None).await.unwrap_err();
        assert!(matches!(err, Error::LookupDisabled(d) if d == "example.com"));
    }

    fn page(zones: Vec<ZoneSummary>, next: Option<(&str, &str)>) -> ZonePage {
        ZonePage {
            zones,
            is_truncated: next.is_some(),
            next_dns_name: next.map(|(name, _)| name.to_string()),
            next_hosted_zone_id: next.map(|(_, id)| id.to_string()),
        }
    }

    #[tokio::test]
    async fn follows_truncated_pages_for_the_domain() {
        let mut pages = vec![
            page(vec![zone("/hostedzone/Z1", "example.com.", true)], Some(("example.com.", "Z2"))),
            page(vec![zone("/hostedzone/Z2", "example.com.", false), zone("/hostedzone/Z3", "example.net.", false)], None),
        ];
        let mut calls = vec![];
        let found = find_zone("Example.com.", |name, id| {
            calls.push((name, id));
            let next = pages.remove(0);
            async move { Ok(next) }
        })
        .await
        .unwrap();
        assert_eq!(found, HostedZone { id: "Z2".to_string(), name: "example.com".to_string() });
        assert_eq!(
            calls,
            vec![("example.com".to_string(), None), ("example.com.".to_string(), Some("Z2".to_string()))]
        );
    }

    #[tokio::test]
    async fn stops_when_listing_moves_past_the_domain() {
        let mut calls = 0;
        let err = find_zone("example.com", |_, _| {
            calls += 1;
            async { Ok(page(vec![zone("/hostedzone/Z1", "example.com.", true)], Some(("example.net.", "Z9")))) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ZoneNotFound(d) if d == "example.com"));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn listing_errors_propagate() {
        let err = find_zone("example.com", |_, _| async { Err(Error::Aws("throttled".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Aws(m) if m == "throttled"));
    }
}
