use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::core::error::IocError;
use crate::core::types::IocKind;
use crate::enrich::{min_interval, trim_base, EnrichmentApi};
use crate::sources::rate_limiter::RateLimiter;

pub const NAME: &str = "abuseipdb";

const MAX_AGE_DAYS: &str = "90";

pub struct AbuseIpDb {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl AbuseIpDb {
    pub fn new(client: Client, provider: &ProviderConfig) -> Self {
        Self {
            client,
            base_url: trim_base(provider),
            api_key: provider.api_key(),
            limiter: RateLimiter::new(min_interval(provider)),
        }
    }
}

#[async_trait]
impl EnrichmentApi for AbuseIpDb {
    fn name(&self) -> &str {
        NAME
    }

    async fn lookup(&self, kind: IocKind, value: &str) -> Result<Option<Value>, IocError> {
        if kind != IocKind::Ip {
            return Ok(None);
        }
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| IocError::Provider("abuseipdb api key not configured".into()))?;
        self.limiter.acquire().await;
        let body: Value = self
            .client
            .get(format!("{}/check", self.base_url))
            .query(&[("ipAddress", value), ("maxAgeInDays", MAX_AGE_DAYS)])
            .header("Key", key)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.get("data").cloned())
    }
}
