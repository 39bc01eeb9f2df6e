use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of indicator of compromise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum IocKind {
    Ip,
    Domain,
    Url,
}

impl IocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IocKind::Ip => "ip",
            IocKind::Domain => "domain",
            IocKind::Url => "url",
        }
    }
}

impl fmt::Display for IocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IocKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ip" => Ok(IocKind::Ip),
            "domain" => Ok(IocKind::Domain),
            "url" => Ok(IocKind::Url),
            other => Err(format!("unknown ioc type: {}", other)),
        }
    }
}

/// Outcome of the most recent ingestion attempt for a source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceStatus {
    Ok,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Ok => "OK",
            SourceStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(SourceStatus::Ok),
            "FAILED" => Ok(SourceStatus::Failed),
            other => Err(format!("unknown source status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRecord {
    pub id: i64,
    pub source_url: String,
    pub first_seen: DateTime<Utc>,
    pub last_ingested: Option<DateTime<Utc>>,
    pub last_status: Option<SourceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpIoc {
    pub id: i64,
    pub ip_address: String,
    pub first_seen: DateTime<Utc>,
    pub source_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainIoc {
    pub id: i64,
    pub domain_or_url: String,
    pub ioc_type: IocKind,
    pub first_seen: DateTime<Utc>,
    pub source_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub ioc_value: String,
    pub ioc_type: IocKind,
    pub api_source: String,
    pub result: Value,
    pub enriched_at: DateTime<Utc>,
}

/// Raw candidate strings as extracted from a document; may contain duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawIndicators {
    pub urls: Vec<String>,
    pub domains: Vec<String>,
    pub ips: Vec<String>,
}

/// Canonical, deduplicated indicators ready for storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Indicators {
    pub urls: BTreeSet<String>,
    pub domains: BTreeSet<String>,
    pub ips: BTreeSet<String>,
}

impl Indicators {
    pub fn len(&self) -> usize {
        self.urls.len() + self.domains.len() + self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rows newly inserted by one `store_indicators` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreOutcome {
    pub urls_added: usize,
    pub domains_added: usize,
    pub ips_added: usize,
}

/// Combined enrichment for an IP. Provider fields are flattened by name and
/// always present; `first_seen` is omitted when the IP is not in the feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpEnrichment {
    pub ioc_value: String,
    pub ioc_type: IocKind,
    pub in_threat_feed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub providers: BTreeMap<String, Option<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedIp {
    pub ip: String,
    #[serde(flatten)]
    pub providers: BTreeMap<String, Option<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainEnrichment {
    pub ioc_value: String,
    pub ioc_type: IocKind,
    pub in_threat_feed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub providers: BTreeMap<String, Option<Value>>,
    pub resolved_ips: Vec<ResolvedIp>,
}
