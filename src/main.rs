use std::io;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use hashchain::{Config, cli};

fn main() -> anyhow::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::parse();
    config
        .init_thread_pool()
        .context("failed to start the mining thread pool")?;

    log::debug!("starting with {config:?}");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    cli::run(stdin.lock(), &mut stdout, &config.chain_config(), config.json)?;
    Ok(())
}
