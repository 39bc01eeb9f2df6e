use std::net::IpAddr;

use anyhow::{bail, Result};

use crate::cli::flags::{Cli, Command, KindArg};
use crate::config::{apply_provider_filter, load_config, AppConfig};
use crate::core::types::IocKind;
use crate::pipeline::normalizer::normalize;

/// Loads the config file and layers command-line overrides on top.
pub fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut cfg = load_config(cli.config.as_deref())?;
    cfg = apply_provider_filter(cfg, cli.providers.as_deref());
    if let Some(path) = &cli.db_path {
        cfg.db_path = path.to_string_lossy().to_string();
    }
    match &cli.command {
        Command::Ingest {
            cooldown_hours: Some(hours),
            ..
        } => cfg.cooldown_hours = *hours,
        Command::Enrich {
            max_age_hours: Some(hours),
            ..
        } => cfg.cache_max_age_hours = *hours,
        _ => {}
    }
    Ok(cfg)
}

pub fn resolve_kind(kind: KindArg, value: &str) -> IocKind {
    match kind {
        KindArg::Ip => IocKind::Ip,
        KindArg::Domain => IocKind::Domain,
        KindArg::Auto => {
            let value = value.trim();
            if value.parse::<IpAddr>().is_ok() {
                IocKind::Ip
            } else if value.contains("://") {
                IocKind::Url
            } else {
                IocKind::Domain
            }
        }
    }
}

/// Resolves the kind of an `enrich` argument and returns its canonical form.
/// URLs are not enrichable.
pub fn resolve_target(kind: KindArg, value: &str) -> Result<(IocKind, String)> {
    let kind = resolve_kind(kind, value);
    let canonical = normalize(kind, value);
    if kind == IocKind::Url || canonical.contains("://") {
        bail!("cannot enrich URL {canonical:?}; pass its domain instead");
    }
    Ok((kind, canonical))
}
