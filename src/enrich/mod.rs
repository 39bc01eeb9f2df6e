//! Cached enrichment of IOCs against third-party lookup services.

pub mod abuseipdb;
pub mod ipinfo;
pub mod virustotal;

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{AppConfig, ProviderConfig};
use crate::core::error::IocError;
use crate::core::store::Store;
use crate::core::types::{DomainEnrichment, IocKind, IpEnrichment, ResolvedIp};

/// A third-party lookup service. `Ok(None)` means the service has nothing
/// for this value.
#[async_trait]
pub trait EnrichmentApi: Send + Sync {
    fn name(&self) -> &str;
    async fn lookup(&self, kind: IocKind, value: &str) -> Result<Option<Value>, IocError>;
}

/// Combines threat-feed membership with per-provider lookups, reading and
/// writing the enrichment cache in the store.
pub struct Enricher<'a> {
    store: &'a Store,
    primary: Option<Box<dyn EnrichmentApi>>,
    secondary: Vec<Box<dyn EnrichmentApi>>,
    max_age_hours: u64,
    cascade_limit: usize,
}

impl<'a> Enricher<'a> {
    /// `primary` is the relationship-aware provider consulted for domains;
    /// `secondary` providers only ever see IPs.
    pub fn new(
        store: &'a Store,
        primary: Option<Box<dyn EnrichmentApi>>,
        secondary: Vec<Box<dyn EnrichmentApi>>,
    ) -> Self {
        Self {
            store,
            primary,
            secondary,
            max_age_hours: 24,
            cascade_limit: 3,
        }
    }

    pub fn with_max_age_hours(mut self, hours: u64) -> Self {
        self.max_age_hours = hours;
        self
    }

    pub fn with_cascade_limit(mut self, limit: usize) -> Self {
        self.cascade_limit = limit;
        self
    }

    pub async fn enrich_ip(&self, ip: &str) -> Result<IpEnrichment, IocError> {
        let feed_match = self.store.lookup_ip(ip)?;

        let mut providers = BTreeMap::new();
        for api in self.primary.iter().chain(self.secondary.iter()) {
            let result = self.cached_or_fetch(api.as_ref(), IocKind::Ip, ip).await?;
            providers.insert(api.name().to_string(), result);
        }

        Ok(IpEnrichment {
            ioc_value: ip.to_string(),
            ioc_type: IocKind::Ip,
            in_threat_feed: feed_match.is_some(),
            first_seen: feed_match.map(|m| m.first_seen),
            providers,
        })
    }

    pub async fn enrich_domain(&self, domain: &str) -> Result<DomainEnrichment, IocError> {
        let feed_match = self.store.lookup_domain_or_url(domain)?;

        let mut providers = BTreeMap::new();
        let mut resolved = Vec::new();
        match &self.primary {
            Some(api) => {
                let result = self
                    .cached_or_fetch(api.as_ref(), IocKind::Domain, domain)
                    .await?;
                if let Some(data) = &result {
                    resolved = resolved_ips(data, self.cascade_limit);
                }
                providers.insert(api.name().to_string(), result);
            }
            // The primary slot is always part of the domain shape.
            None => {
                providers.insert(virustotal::NAME.to_string(), None);
            }
        }

        let mut resolved_ips = Vec::with_capacity(resolved.len());
        for ip in resolved {
            let mut ip_providers = BTreeMap::new();
            for api in &self.secondary {
                let result = self.cached_or_fetch(api.as_ref(), IocKind::Ip, &ip).await?;
                ip_providers.insert(api.name().to_string(), result);
            }
            resolved_ips.push(ResolvedIp {
                ip,
                providers: ip_providers,
            });
        }

        Ok(DomainEnrichment {
            ioc_value: domain.to_string(),
            ioc_type: IocKind::Domain,
            in_threat_feed: feed_match.is_some(),
            first_seen: feed_match.map(|m| m.first_seen),
            providers,
            resolved_ips,
        })
    }

    /// Cache read, then provider call on miss. Provider failures and empty
    /// answers yield `None` and are not cached; store failures propagate.
    async fn cached_or_fetch(
        &self,
        api: &dyn EnrichmentApi,
        kind: IocKind,
        value: &str,
    ) -> Result<Option<Value>, IocError> {
        if let Some(hit) = self
            .store
            .get_cached_result(value, api.name(), self.max_age_hours)?
        {
            return Ok(Some(hit));
        }

        match api.lookup(kind, value).await {
            Ok(Some(data)) if !is_empty(&data) => {
                self.store.put_cached_result(value, kind, api.name(), &data)?;
                Ok(Some(data))
            }
            Ok(_) => {
                debug!(provider = api.name(), value, "provider returned nothing");
                Ok(None)
            }
            Err(err) => {
                warn!(provider = api.name(), value, error = %err, "provider lookup failed");
                Ok(None)
            }
        }
    }
}

/// Distinct `resolutions[*].ip_address` values in order of appearance, capped at `limit`.
pub fn resolved_ips(data: &Value, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    data.get("resolutions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|r| r.get("ip_address").and_then(Value::as_str))
        .filter(|ip| seen.insert(ip.to_string()))
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Builds the enabled provider clients: `virustotal` as primary, the rest as secondary.
pub fn build_providers(
    config: &AppConfig,
) -> Result<(Option<Box<dyn EnrichmentApi>>, Vec<Box<dyn EnrichmentApi>>), IocError> {
    let client = reqwest::Client::builder()
        .user_agent(config.fetch.user_agent.clone())
        .timeout(Duration::from_millis(config.fetch.timeout_ms))
        .build()
        .map_err(IocError::from)?;

    let mut primary: Option<Box<dyn EnrichmentApi>> = None;
    let mut secondary: Vec<Box<dyn EnrichmentApi>> = Vec::new();
    for provider in config.providers.iter().filter(|p| p.enabled) {
        match provider.name.to_lowercase().as_str() {
            virustotal::NAME => {
                primary = Some(Box::new(virustotal::VirusTotal::new(client.clone(), provider)));
            }
            ipinfo::NAME => secondary.push(Box::new(ipinfo::IpInfo::new(client.clone(), provider))),
            abuseipdb::NAME => {
                secondary.push(Box::new(abuseipdb::AbuseIpDb::new(client.clone(), provider)))
            }
            other => {
                return Err(IocError::Config(format!("unknown provider: {}", other)));
            }
        }
    }
    Ok((primary, secondary))
}

fn min_interval(provider: &ProviderConfig) -> Duration {
    Duration::from_millis(provider.min_interval_ms)
}

fn trim_base(provider: &ProviderConfig) -> String {
    provider.base_url.trim_end_matches('/').to_string()
}
