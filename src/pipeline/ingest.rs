use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::IocError;
use crate::core::store::Store;
use crate::core::types::{SourceStatus, StoreOutcome};
use crate::pipeline::detector::{detect_content_type, ContentKind};
use crate::pipeline::extractor::extract_indicators;
use crate::pipeline::normalizer::{normalize_indicators, EmptyValuePolicy};
use crate::sources::fetcher::Fetcher;

/// Stages of one ingestion run. Only `Fetching` can lead to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestStage {
    Fetching,
    Detecting,
    Extracting,
    Normalizing,
    Storing,
    Done,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source_url: String,
    pub source_id: i64,
    pub status_code: Option<u16>,
    pub content_kind: ContentKind,
    pub urls: usize,
    pub domains: usize,
    pub ips: usize,
    pub added: StoreOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub enum IngestOutcome {
    Stored(IngestReport),
    FetchFailed { source_url: String, error: String },
}

impl IngestOutcome {
    pub fn summary(&self) -> String {
        match self {
            IngestOutcome::Stored(r) => format!(
                "{}: stored ({}) urls={} domains={} ips={} new={}",
                r.source_url,
                r.content_kind,
                r.urls,
                r.domains,
                r.ips,
                r.added.urls_added + r.added.domains_added + r.added.ips_added
            ),
            IngestOutcome::FetchFailed { source_url, error } => {
                format!("{}: fetch failed: {}", source_url, error)
            }
        }
    }
}

/// Drives fetch → detect → extract → normalize → store for one source.
///
/// Cooldown gating is left to the caller; see [`Store::should_ingest`].
pub struct Ingestor<'a, F: Fetcher> {
    store: &'a Store,
    fetcher: F,
    empty_values: EmptyValuePolicy,
}

impl<'a, F: Fetcher> Ingestor<'a, F> {
    pub fn new(store: &'a Store, fetcher: F, empty_values: EmptyValuePolicy) -> Self {
        Self {
            store,
            fetcher,
            empty_values,
        }
    }

    pub async fn ingest(&self, source_url: &str) -> Result<IngestOutcome, IocError> {
        enter(source_url, IngestStage::Fetching);
        let document = match self.fetcher.fetch(source_url).await {
            Ok(doc) => doc,
            Err(err) => {
                enter(source_url, IngestStage::Failed);
                warn!(source_url, error = %err, "fetch failed");
                self.store
                    .record_source_outcome(source_url, SourceStatus::Failed)?;
                return Ok(IngestOutcome::FetchFailed {
                    source_url: source_url.to_string(),
                    error: err.to_string(),
                });
            }
        };

        enter(source_url, IngestStage::Detecting);
        let content_kind = detect_content_type(document.content_type.as_deref(), &document.body);
        debug!(source_url, %content_kind, "detected content type");

        enter(source_url, IngestStage::Extracting);
        let raw = extract_indicators(&document.body);

        enter(source_url, IngestStage::Normalizing);
        let indicators = normalize_indicators(&raw, self.empty_values);

        enter(source_url, IngestStage::Storing);
        let source_id = self.store.upsert_source(source_url)?;
        let added = match self.store.store_indicators(&indicators, source_id) {
            Ok(added) => added,
            Err(err) => {
                warn!(source_url, error = %err, "storing indicators failed");
                if let Err(record_err) = self
                    .store
                    .record_source_outcome(source_url, SourceStatus::Failed)
                {
                    warn!(source_url, error = %record_err, "could not record failed outcome");
                }
                return Err(err);
            }
        };
        self.store
            .record_source_outcome(source_url, SourceStatus::Ok)?;

        enter(source_url, IngestStage::Done);
        let report = IngestReport {
            source_url: source_url.to_string(),
            source_id,
            status_code: document.status_code,
            content_kind,
            urls: indicators.urls.len(),
            domains: indicators.domains.len(),
            ips: indicators.ips.len(),
            added,
        };
        info!(
            source_url,
            urls = report.urls,
            domains = report.domains,
            ips = report.ips,
            "ingested source"
        );
        Ok(IngestOutcome::Stored(report))
    }
}

fn enter(source_url: &str, stage: IngestStage) {
    debug!(source_url, %stage, "ingest stage");
}
