use anyhow::Result;
use clap::Parser;

use jsonrelay::config::{self, ServerConfig};
use jsonrelay::server;

#[tokio::main]
async fn main() -> Result<()> {
    config::init_logging();

    let config = ServerConfig::parse();

    server::run(config).await
}
