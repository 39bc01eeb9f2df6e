use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use iocwatch::core::error::IocError;
use iocwatch::core::store::{Store, StoreConfig};
use iocwatch::core::types::{Indicators, IocKind};
use iocwatch::enrich::{EnrichmentApi, Enricher};
use serde_json::{json, Value};

/// Canned provider that counts how often it is called.
struct StubApi {
    name: &'static str,
    answers: HashMap<String, Value>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl StubApi {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            answers: HashMap::new(),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn answer(mut self, value: &str, data: Value) -> Self {
        self.answers.insert(value.to_string(), data);
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl EnrichmentApi for StubApi {
    fn name(&self) -> &str {
        self.name
    }

    async fn lookup(&self, _kind: IocKind, value: &str) -> Result<Option<Value>, IocError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(IocError::Provider("quota exceeded".into()));
        }
        Ok(self.answers.get(value).cloned())
    }
}

fn temp_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(StoreConfig::new(dir.path().join("iocs.db"))).unwrap();
    (dir, store)
}

fn resolutions(ips: &[&str]) -> Value {
    let items: Vec<Value> = ips
        .iter()
        .map(|ip| json!({"ip_address": ip, "host_name": "evil.com"}))
        .collect();
    json!({"id": "evil.com", "attributes": {"reputation": -20}, "resolutions": items})
}

#[tokio::test]
async fn ip_enrichment_writes_through_cache() {
    let (_dir, store) = temp_store();
    let vt = StubApi::new("virustotal").answer("8.8.8.8", json!({"attributes": {"asn": 15169}}));
    let ipinfo = StubApi::new("ipinfo").answer("8.8.8.8", json!({"country": "US"}));
    let vt_calls = vt.counter();
    let ipinfo_calls = ipinfo.counter();
    let enricher = Enricher::new(&store, Some(Box::new(vt)), vec![Box::new(ipinfo)]);

    let first = enricher.enrich_ip("8.8.8.8").await.unwrap();
    let second = enricher.enrich_ip("8.8.8.8").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(vt_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ipinfo_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.providers["ipinfo"], Some(json!({"country": "US"})));
    assert_eq!(
        store.get_cached_result("8.8.8.8", "ipinfo", 24).unwrap(),
        Some(json!({"country": "US"}))
    );
}

#[tokio::test]
async fn failed_or_empty_calls_are_null_and_retried() {
    let (_dir, store) = temp_store();
    let vt = StubApi::new("virustotal").failing();
    let abuse = StubApi::new("abuseipdb").answer("5.5.5.5", json!({}));
    let ipinfo = StubApi::new("ipinfo").answer("5.5.5.5", json!({"org": "AS1"}));
    let vt_calls = vt.counter();
    let abuse_calls = abuse.counter();
    let enricher = Enricher::new(
        &store,
        Some(Box::new(vt)),
        vec![Box::new(abuse), Box::new(ipinfo)],
    );

    let result = enricher.enrich_ip("5.5.5.5").await.unwrap();
    assert_eq!(result.providers["virustotal"], None);
    assert_eq!(result.providers["abuseipdb"], None);
    assert_eq!(result.providers["ipinfo"], Some(json!({"org": "AS1"})));
    assert_eq!(store.get_cached_result("5.5.5.5", "virustotal", 24).unwrap(), None);
    assert_eq!(store.get_cached_result("5.5.5.5", "abuseipdb", 24).unwrap(), None);

    enricher.enrich_ip("5.5.5.5").await.unwrap();
    assert_eq!(vt_calls.load(Ordering::SeqCst), 2);
    assert_eq!(abuse_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn threat_feed_membership_sets_first_seen() {
    let (_dir, store) = temp_store();
    let source_id = store.upsert_source("feed").unwrap();
    let seen = Utc::now() - Duration::days(2);
    let indicators = Indicators {
        ips: ["1.2.3.4".to_string()].into_iter().collect(),
        ..Default::default()
    };
    store.store_indicators_at(&indicators, source_id, seen).unwrap();

    let enricher = Enricher::new(&store, None, vec![Box::new(StubApi::new("ipinfo"))]);
    let listed = enricher.enrich_ip("1.2.3.4").await.unwrap();
    assert!(listed.in_threat_feed);
    assert_eq!(listed.first_seen, Some(seen));

    let unlisted = enricher.enrich_ip("4.3.2.1").await.unwrap();
    assert!(!unlisted.in_threat_feed);
    let json = serde_json::to_value(&unlisted).unwrap();
    assert!(json.get("first_seen").is_none());
    assert_eq!(json["ipinfo"], Value::Null);
    assert_eq!(json["ioc_type"], "ip");
}

#[tokio::test]
async fn domain_cascade_enriches_at_most_three_ips() {
    let (_dir, store) = temp_store();
    let ips = ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"];
    let vt = StubApi::new("virustotal").answer("evil.com", resolutions(&ips));
    let vt_calls = vt.counter();
    let mut ipinfo = StubApi::new("ipinfo");
    for ip in ips {
        ipinfo = ipinfo.answer(ip, json!({"ip": ip}));
    }
    let ipinfo_calls = ipinfo.counter();
    let enricher = Enricher::new(&store, Some(Box::new(vt)), vec![Box::new(ipinfo)]);

    let result = enricher.enrich_domain("evil.com").await.unwrap();

    assert_eq!(vt_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ipinfo_calls.load(Ordering::SeqCst), 3);
    let enriched: Vec<&str> = result.resolved_ips.iter().map(|r| r.ip.as_str()).collect();
    assert_eq!(enriched, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    assert!(!result.resolved_ips[0].providers.contains_key("virustotal"));
    assert_eq!(
        result.resolved_ips[2].providers["ipinfo"],
        Some(json!({"ip": "10.0.0.3"}))
    );
}

#[tokio::test]
async fn cascade_survives_per_ip_failures() {
    let (_dir, store) = temp_store();
    let vt = StubApi::new("virustotal").answer("evil.com", resolutions(&["1.1.1.1", "2.2.2.2"]));
    let abuse = StubApi::new("abuseipdb").failing();
    let ipinfo = StubApi::new("ipinfo").answer("2.2.2.2", json!({"city": "X"}));
    let enricher = Enricher::new(
        &store,
        Some(Box::new(vt)),
        vec![Box::new(abuse), Box::new(ipinfo)],
    );

    let result = enricher.enrich_domain("evil.com").await.unwrap();
    assert_eq!(result.resolved_ips.len(), 2);
    assert_eq!(result.resolved_ips[0].providers["ipinfo"], None);
    assert_eq!(result.resolved_ips[0].providers["abuseipdb"], None);
    assert_eq!(
        result.resolved_ips[1].providers["ipinfo"],
        Some(json!({"city": "X"}))
    );
}

#[tokio::test]
async fn cached_domain_result_drives_cascade_without_calling_out() {
    let (_dir, store) = temp_store();
    store
        .put_cached_result(
            "evil.com",
            IocKind::Domain,
            "virustotal",
            &resolutions(&["9.9.9.9"]),
        )
        .unwrap();
    let vt = StubApi::new("virustotal");
    let vt_calls = vt.counter();
    let enricher = Enricher::new(
        &store,
        Some(Box::new(vt)),
        vec![Box::new(StubApi::new("ipinfo").answer("9.9.9.9", json!({"asn": "AS9"})))],
    );

    let result = enricher.enrich_domain("evil.com").await.unwrap();
    assert_eq!(vt_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.resolved_ips[0].ip, "9.9.9.9");

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["ioc_type"], "domain");
    assert_eq!(json["in_threat_feed"], false);
    assert!(json["virustotal"]["resolutions"].is_array());
    assert_eq!(json["resolved_ips"][0]["ipinfo"]["asn"], "AS9");
}

#[tokio::test]
async fn stale_cache_triggers_refresh() {
    let (_dir, store) = temp_store();
    store
        .put_cached_result_at(
            "7.7.7.7",
            IocKind::Ip,
            "ipinfo",
            &json!({"old": true}),
            Utc::now() - Duration::hours(25),
        )
        .unwrap();
    let ipinfo = StubApi::new("ipinfo").answer("7.7.7.7", json!({"old": false}));
    let calls = ipinfo.counter();
    let enricher = Enricher::new(&store, None, vec![Box::new(ipinfo)]).with_max_age_hours(24);

    let result = enricher.enrich_ip("7.7.7.7").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.providers["ipinfo"], Some(json!({"old": false})));
}

#[tokio::test]
async fn corrupt_cache_row_is_refetched() {
    let (dir, store) = temp_store();
    let conn = rusqlite::Connection::open(dir.path().join("iocs.db")).unwrap();
    conn.execute(
        "INSERT INTO enrichment_results (ioc_value, ioc_type, api_source, result_json, enriched_at)
         VALUES ('x', 'domain', 'virustotal', 'not-json', ?1)",
        [Utc::now().to_rfc3339()],
    )
    .unwrap();

    let vt = StubApi::new("virustotal").answer("x", json!({"id": "x"}));
    let calls = vt.counter();
    let enricher = Enricher::new(&store, Some(Box::new(vt)), vec![]);

    let result = enricher.enrich_domain("x").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.providers["virustotal"], Some(json!({"id": "x"})));
    assert!(result.resolved_ips.is_empty());
}

#[tokio::test]
async fn domain_result_keeps_null_primary_slot_without_primary() {
    let (_dir, store) = temp_store();
    let ipinfo = StubApi::new("ipinfo");
    let calls = ipinfo.counter();
    let enricher = Enricher::new(&store, None, vec![Box::new(ipinfo)]);

    let result = enricher.enrich_domain("evil.com").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.providers["virustotal"], None);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json.get("virustotal"), Some(&Value::Null));
    assert_eq!(json["resolved_ips"], json!([]));
}
