use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::core::error::IocError;
use crate::core::types::IocKind;
use crate::enrich::{min_interval, trim_base, EnrichmentApi};
use crate::sources::rate_limiter::RateLimiter;

pub const NAME: &str = "ipinfo";

/// IPInfo geolocation/ASN lookup. The token is optional.
pub struct IpInfo {
    client: Client,
    base_url: String,
    token: Option<String>,
    limiter: RateLimiter,
}

impl IpInfo {
    pub fn new(client: Client, provider: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: trim_base(provider),
            token: provider.api_key(),
            limiter: RateLimiter::new(min_interval(provider)),
        }
    }
}

#[async_trait]
impl EnrichmentApi for IpInfo {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, kind: IocKind, value: &str) -> Result<Option<Value>, IocError> {
        if kind != IocKind::Ip {
            return Ok(None);
        }
        self.limiter.acquire().await;
        let mut request = self.client.get(format!("{}/{}/json", self.base_url, value));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token.as_str())]);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.error_for_status()?.json().await?;
        if body.get("bogon").and_then(Value::as_bool) == Some(true) {
            return Ok(None);
        }
        Ok(Some(body))
    }
}
