use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::core::error::IocError;
use crate::core::types::IocKind;
use crate::enrich::{min_interval, trim_base, EnrichmentApi};
use crate::sources::rate_limiter::RateLimiter;

pub const NAME: &str = "virustotal";

const RELATIONSHIP_LIMIT: usize = 10;

/// VirusTotal v3 client. Reports carry the object's attributes plus the
/// relationships used downstream (`resolutions` feeds the domain cascade).
pub struct VirusTotal {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl VirusTotal {
    pub fn new(client: Client, provider: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: trim_base(provider),
            api_key: provider.api_key(),
            limiter: RateLimiter::new(min_interval(provider)),
        }
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, IocError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| IocError::Provider("virustotal api key not configured".into()))?;
        self.limiter.acquire().await;
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .header("x-apikey", key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.error_for_status()?.json().await?;
        Ok(Some(body))
    }

    async fn report(&self, collection: &str, value: &str) -> Result<Option<Value>, IocError> {
        let Some(body) = self.get(&format!("{}/{}", collection, value)).await? else {
            return Ok(None);
        };
        let attributes = body
            .pointer("/data/attributes")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let mut report = Map::new();
        report.insert(
            "id".to_string(),
            body.pointer("/data/id").cloned().unwrap_or(Value::Null),
        );
        report.insert("attributes".to_string(), attributes);
        Ok(Some(Value::Object(report)))
    }

    /// Relationship items flattened to `{id, ...attributes}`. Failures degrade to `[]`.
    async fn relationship(&self, collection: &str, value: &str, name: &str) -> Value {
        let path = format!(
            "{}/{}/{}?limit={}",
            collection, value, name, RELATIONSHIP_LIMIT
        );
        match self.get(&path).await {
            Ok(Some(body)) => Value::Array(flatten_items(&body)),
            Ok(None) => Value::Array(vec![]),
            Err(err) => {
                debug!(value, relationship = name, error = %err, "relationship lookup failed");
                Value::Array(vec![])
            }
        }
    }
}

#[async_trait]
impl EnrichmentApi for VirusTotal {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, kind: IocKind, value: &str) -> Result<Option<Value>, IocError> {
        let (collection, relationships): (&str, &[&str]) = match kind {
            IocKind::Ip => ("ip_addresses", &["resolutions", "communicating_files"][..]),
            IocKind::Domain => (
                "domains",
                &["resolutions", "subdomains", "communicating_files"][..],
            ),
            IocKind::Url => return Ok(None),
        };

        let Some(mut report) = self.report(collection, value).await? else {
            return Ok(None);
        };
        for name in relationships {
            let items = self.relationship(collection, value, name).await;
            if let Some(map) = report.as_object_mut() {
                map.insert(name.to_string(), items);
            }
        }
        Ok(Some(report))
    }
}

fn flatten_items(body: &Value) -> Vec<Value> {
    body.get("data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|item| {
            let mut flat = Map::new();
            if let Some(id) = item.get("id") {
                flat.insert("id".to_string(), id.clone());
            }
            if let Some(attrs) = item.get("attributes").and_then(Value::as_object) {
                for (k, v) in attrs {
                    flat.insert(k.clone(), v.clone());
                }
            }
            Value::Object(flat)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_relationship_items() {
        let body = json!({
            "data": [
                {"id": "1.2.3.4evil.com", "type": "resolution",
                 "attributes": {"ip_address": "1.2.3.4", "host_name": "evil.com"}}
            ]
        });
        let items = flatten_items(&body);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["ip_address"], "1.2.3.4");
        assert_eq!(items[0]["id"], "1.2.3.4evil.com");
    }
}
