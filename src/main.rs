mod cli;
mod config;
mod error;
mod inventory;
mod links;
mod output;
mod registry;
mod results;
mod schedule;
mod scm;
mod sync;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting tttt - Test metadata tracker");
    cli.execute().await?;

    Ok(())
}
