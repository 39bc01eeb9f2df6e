use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::error::IocError;
use crate::core::time::{format_timestamp, hours, now_utc, parse_timestamp};
use crate::core::types::{
    CacheEntry, DomainIoc, Indicators, IocKind, IpIoc, SourceRecord, SourceStatus, StoreOutcome,
};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// SQLite-backed store for sources, IOCs and the enrichment cache.
///
/// Every operation opens its own connection and releases it on return.
pub struct Store {
    config: StoreConfig,
}

impl Store {
    pub fn open(config: StoreConfig) -> Result<Self, IocError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { config };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn connect(&self) -> Result<Connection, IocError> {
        let conn = Connection::open(&self.config.path)?;
        conn.busy_timeout(self.config.busy_timeout)?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), IocError> {
        let conn = self.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sources (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              source_url TEXT NOT NULL UNIQUE,
              first_seen TEXT NOT NULL,
              last_ingested TEXT,
              last_status TEXT
            );

            CREATE TABLE IF NOT EXISTS ip_iocs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              ip_address TEXT NOT NULL UNIQUE,
              first_seen TEXT NOT NULL,
              source_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS domain_iocs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              domain_or_url TEXT NOT NULL UNIQUE,
              ioc_type TEXT NOT NULL CHECK (ioc_type IN ('domain', 'url')),
              first_seen TEXT NOT NULL,
              source_id INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_domain_iocs_type ON domain_iocs(ioc_type);

            CREATE TABLE IF NOT EXISTS enrichment_results (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              ioc_value TEXT NOT NULL,
              ioc_type TEXT NOT NULL,
              api_source TEXT NOT NULL,
              result_json TEXT NOT NULL,
              enriched_at TEXT NOT NULL,
              UNIQUE (ioc_value, api_source)
            );
            ",
        )?;
        Ok(())
    }

    pub fn upsert_source(&self, source_url: &str) -> Result<i64, IocError> {
        self.upsert_source_at(source_url, now_utc())
    }

    /// Returns the id of `source_url`, creating the row with status `OK` if absent.
    pub fn upsert_source_at(&self, source_url: &str, now: DateTime<Utc>) -> Result<i64, IocError> {
        let conn = self.connect()?;
        let ts = format_timestamp(now);
        conn.execute(
            "INSERT INTO sources (source_url, first_seen, last_ingested, last_status)
             VALUES (?1, ?2, ?2, ?3)
             ON CONFLICT(source_url) DO NOTHING",
            params![source_url, ts, SourceStatus::Ok.as_str()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM sources WHERE source_url = ?1",
            params![source_url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn record_source_outcome(
        &self,
        source_url: &str,
        status: SourceStatus,
    ) -> Result<(), IocError> {
        self.record_source_outcome_at(source_url, status, now_utc())
    }

    pub fn record_source_outcome_at(
        &self,
        source_url: &str,
        status: SourceStatus,
        now: DateTime<Utc>,
    ) -> Result<(), IocError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO sources (source_url, first_seen, last_ingested, last_status)
             VALUES (?1, ?2, ?2, ?3)
             ON CONFLICT(source_url) DO UPDATE SET
               last_ingested = excluded.last_ingested,
               last_status = excluded.last_status",
            params![source_url, format_timestamp(now), status.as_str()],
        )?;
        Ok(())
    }

    pub fn get_source(&self, source_url: &str) -> Result<Option<SourceRecord>, IocError> {
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                "SELECT id, source_url, first_seen, last_ingested, last_status
                 FROM sources WHERE source_url = ?1",
                params![source_url],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, source_url, first_seen, last_ingested, last_status)) = raw else {
            return Ok(None);
        };
        let last_status = match last_status {
            Some(s) => Some(SourceStatus::from_str(&s).map_err(IocError::Db)?),
            None => None,
        };
        Ok(Some(SourceRecord {
            id,
            source_url,
            first_seen: required_timestamp(&first_seen)?,
            last_ingested: last_ingested.as_deref().and_then(parse_timestamp),
            last_status,
        }))
    }

    pub fn should_ingest(&self, source_url: &str, cooldown_hours: u64) -> Result<bool, IocError> {
        self.should_ingest_at(source_url, cooldown_hours, now_utc())
    }

    /// True when the source was never ingested or its cooldown has elapsed.
    pub fn should_ingest_at(
        &self,
        source_url: &str,
        cooldown_hours: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, IocError> {
        let conn = self.connect()?;
        let last: Option<Option<String>> = conn
            .query_row(
                "SELECT last_ingested FROM sources WHERE source_url = ?1",
                params![source_url],
                |row| row.get(0),
            )
            .optional()?;

        let Some(last_ingested) = last.flatten().as_deref().and_then(parse_timestamp) else {
            return Ok(true);
        };
        Ok(now - last_ingested > hours(cooldown_hours))
    }

    pub fn store_indicators(
        &self,
        indicators: &Indicators,
        source_id: i64,
    ) -> Result<StoreOutcome, IocError> {
        self.store_indicators_at(indicators, source_id, now_utc())
    }

    /// Inserts every canonical value not already present. Existing rows keep
    /// their `first_seen` and `source_id`.
    pub fn store_indicators_at(
        &self,
        indicators: &Indicators,
        source_id: i64,
        now: DateTime<Utc>,
    ) -> Result<StoreOutcome, IocError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let ts = format_timestamp(now);
        let mut outcome = StoreOutcome::default();

        for ip in &indicators.ips {
            outcome.ips_added += tx.execute(
                "INSERT INTO ip_iocs (ip_address, first_seen, source_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(ip_address) DO NOTHING",
                params![ip, ts, source_id],
            )?;
        }
        for (values, kind) in [
            (&indicators.domains, IocKind::Domain),
            (&indicators.urls, IocKind::Url),
        ] {
            for value in values {
                let added = tx.execute(
                    "INSERT INTO domain_iocs (domain_or_url, ioc_type, first_seen, source_id)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(domain_or_url) DO NOTHING",
                    params![value, kind.as_str(), ts, source_id],
                )?;
                match kind {
                    IocKind::Domain => outcome.domains_added += added,
                    _ => outcome.urls_added += added,
                }
            }
        }

        tx.commit()?;
        debug!(
            source_id,
            ips = outcome.ips_added,
            domains = outcome.domains_added,
            urls = outcome.urls_added,
            "stored indicators"
        );
        Ok(outcome)
    }

    pub fn lookup_ip(&self, ip_address: &str) -> Result<Option<IpIoc>, IocError> {
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                "SELECT id, ip_address, first_seen, source_id FROM ip_iocs WHERE ip_address = ?1",
                params![ip_address],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;
        match raw {
            Some((id, ip_address, first_seen, source_id)) => Ok(Some(IpIoc {
                id,
                ip_address,
                first_seen: required_timestamp(&first_seen)?,
                source_id,
            })),
            None => Ok(None),
        }
    }

    pub fn lookup_domain_or_url(&self, value: &str) -> Result<Option<DomainIoc>, IocError> {
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                "SELECT id, domain_or_url, ioc_type, first_seen, source_id
                 FROM domain_iocs WHERE domain_or_url = ?1",
                params![value],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, domain_or_url, ioc_type, first_seen, source_id)) = raw else {
            return Ok(None);
        };
        Ok(Some(DomainIoc {
            id,
            domain_or_url,
            ioc_type: IocKind::from_str(&ioc_type).map_err(IocError::Db)?,
            first_seen: required_timestamp(&first_seen)?,
            source_id,
        }))
    }

    pub fn get_cached_result(
        &self,
        ioc_value: &str,
        api_source: &str,
        max_age_hours: u64,
    ) -> Result<Option<Value>, IocError> {
        self.get_cached_result_at(ioc_value, api_source, max_age_hours, now_utc())
    }

    pub fn get_cached_result_at(
        &self,
        ioc_value: &str,
        api_source: &str,
        max_age_hours: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Value>, IocError> {
        Ok(self
            .get_cached_entry_at(ioc_value, api_source, max_age_hours, now)?
            .map(|entry| entry.result))
    }

    /// Reads a fresh cache entry. Stale rows, unparsable payloads and
    /// unparsable timestamps all read as a miss.
    pub fn get_cached_entry_at(
        &self,
        ioc_value: &str,
        api_source: &str,
        max_age_hours: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, IocError> {
        let conn = self.connect()?;
        let raw = conn
            .query_row(
                "SELECT ioc_type, result_json, enriched_at FROM enrichment_results
                 WHERE ioc_value = ?1 AND api_source = ?2",
                params![ioc_value, api_source],
                cache_row,
            )
            .optional()?;

        let Some((ioc_type, result_json, enriched_at)) = raw else {
            debug!(ioc_value, api_source, "cache miss");
            return Ok(None);
        };

        let Some(enriched_at) = parse_timestamp(&enriched_at) else {
            warn!(ioc_value, api_source, "cache entry has unreadable timestamp");
            return Ok(None);
        };
        if now - enriched_at > hours(max_age_hours) {
            debug!(ioc_value, api_source, %enriched_at, "cache entry stale");
            return Ok(None);
        }
        let result: Value = match serde_json::from_str(&result_json) {
            Ok(value) => value,
            Err(err) => {
                warn!(ioc_value, api_source, error = %err, "cache entry payload is corrupt");
                return Ok(None);
            }
        };
        let Ok(ioc_type) = IocKind::from_str(&ioc_type) else {
            warn!(ioc_value, api_source, ioc_type = %ioc_type, "cache entry has unknown ioc type");
            return Ok(None);
        };

        debug!(ioc_value, api_source, "cache hit");
        Ok(Some(CacheEntry {
            ioc_value: ioc_value.to_string(),
            ioc_type,
            api_source: api_source.to_string(),
            result,
            enriched_at,
        }))
    }

    pub fn put_cached_result(
        &self,
        ioc_value: &str,
        ioc_type: IocKind,
        api_source: &str,
        result: &Value,
    ) -> Result<(), IocError> {
        self.put_cached_result_at(ioc_value, ioc_type, api_source, result, now_utc())
    }

    /// Replaces any previous payload for `(ioc_value, api_source)` and refreshes `enriched_at`.
    pub fn put_cached_result_at(
        &self,
        ioc_value: &str,
        ioc_type: IocKind,
        api_source: &str,
        result: &Value,
        enriched_at: DateTime<Utc>,
    ) -> Result<(), IocError> {
        let result_json = serde_json::to_string(result)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO enrichment_results (ioc_value, ioc_type, api_source, result_json, enriched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(ioc_value, api_source) DO UPDATE SET
               ioc_type = excluded.ioc_type,
               result_json = excluded.result_json,
               enriched_at = excluded.enriched_at",
            params![
                ioc_value,
                ioc_type.as_str(),
                api_source,
                result_json,
                format_timestamp(enriched_at)
            ],
        )?;
        Ok(())
    }

    pub fn count_iocs(&self) -> Result<(i64, i64), IocError> {
        let conn = self.connect()?;
        let ips = conn.query_row("SELECT COUNT(*) FROM ip_iocs", [], |row| row.get(0))?;
        let domains = conn.query_row("SELECT COUNT(*) FROM domain_iocs", [], |row| row.get(0))?;
        Ok((ips, domains))
    }
}

fn cache_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn required_timestamp(value: &str) -> Result<DateTime<Utc>, IocError> {
    parse_timestamp(value).ok_or_else(|| IocError::Db(format!("invalid timestamp: {}", value)))
}
