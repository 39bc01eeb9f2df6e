use anyhow::Result;
use tracing::{debug, info};

use crate::cli::config::{resolve_config, resolve_target};
use crate::cli::flags::{Cli, Command, KindArg};
use crate::config::AppConfig;
use crate::core::store::{Store, StoreConfig};
use crate::core::types::IocKind;
use crate::enrich::{build_providers, Enricher};
use crate::pipeline::ingest::Ingestor;
use crate::sources::fetcher::HttpFetcher;

pub async fn run(cli: Cli) -> Result<()> {
    let cfg = resolve_config(&cli)?;
    let store = Store::open(StoreConfig::new(&cfg.db_path))?;
    debug!(path = %store.path().display(), "opened store");

    match cli.command {
        Command::Ingest { sources, force, .. } => run_ingest(&cfg, &store, &sources, force).await,
        Command::Enrich { value, kind, .. } => run_enrich(&cfg, &store, &value, kind).await,
    }
}

async fn run_ingest(cfg: &AppConfig, store: &Store, sources: &[String], force: bool) -> Result<()> {
    let fetcher = HttpFetcher::new(&cfg.fetch)?;
    let ingestor = Ingestor::new(store, fetcher, cfg.empty_values);

    for source in sources {
        if !force && !store.should_ingest(source, cfg.cooldown_hours)? {
            info!(source = %source, cooldown_hours = cfg.cooldown_hours, "skipping source in cooldown");
            println!("{}: skipped (ingested within {}h)", source, cfg.cooldown_hours);
            continue;
        }
        let outcome = ingestor.ingest(source).await?;
        println!("{}", outcome.summary());
    }
    Ok(())
}

async fn run_enrich(cfg: &AppConfig, store: &Store, value: &str, kind: KindArg) -> Result<()> {
    let (primary, secondary) = build_providers(cfg)?;
    let enricher = Enricher::new(store, primary, secondary)
        .with_max_age_hours(cfg.cache_max_age_hours)
        .with_cascade_limit(cfg.cascade_limit);

    let (kind, value) = resolve_target(kind, value)?;
    let json = match kind {
        IocKind::Ip => serde_json::to_string_pretty(&enricher.enrich_ip(&value).await?)?,
        _ => serde_json::to_string_pretty(&enricher.enrich_domain(&value).await?)?,
    };
    println!("{json}");
    Ok(())
}
