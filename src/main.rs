use clap::Parser;

use iocwatch::cli::{commands::run, flags::Cli};
use iocwatch::core::logger::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, &cli.log_file)?;
    run(cli).await
}
