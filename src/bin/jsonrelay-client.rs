use anyhow::Result;
use clap::Parser;

use jsonrelay::client;
use jsonrelay::config::{self, ClientConfig};

#[tokio::main]
async fn main() -> Result<()> {
    config::init_logging();

    let config = ClientConfig::parse();

    client::run(config).await
}
