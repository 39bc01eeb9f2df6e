use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "iocwatch",
    version,
    about = "Threat-feed IOC ingestion and cached enrichment"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (TOML). Default: config/iocwatch.toml
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// SQLite database path (overrides config)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Comma-separated provider names to enable (case-insensitive)
    #[arg(long, global = true, value_delimiter = ',')]
    pub providers: Option<Vec<String>>,

    /// Increase verbosity (info, debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log file path
    #[arg(long, global = true, default_value = "data/iocwatch.log")]
    pub log_file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest one or more feeds (URLs or local text files)
    Ingest {
        /// Feed URLs or file paths
        #[arg(required = true)]
        sources: Vec<String>,
        /// Ingest even if the source is still cooling down
        #[arg(long)]
        force: bool,
        /// Minimum hours between ingestions of the same source
        #[arg(long)]
        cooldown_hours: Option<u64>,
    },
    /// Enrich an IP or domain and print the combined JSON
    Enrich {
        value: String,
        /// Indicator kind; auto treats anything parsing as an IP address as an IP
        #[arg(long, value_enum, default_value = "auto")]
        kind: KindArg,
        /// Maximum age of cached provider results
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Auto,
    Ip,
    Domain,
}
