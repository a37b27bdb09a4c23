// src/main.rs

//! The main entry point for the sylved cluster backup daemon.

use anyhow::Result;
use std::env;
use sylved::config::Config;
use sylved::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("sylved version {VERSION}");
        return Ok(());
    }

    if args.len() != 2 {
        eprintln!("Usage: sylved /path/to/sylved.toml");
        std::process::exit(1);
    }

    let config = Config::from_file(&args[1])?;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = VERSION, node = %config.node.name, "starting sylved");
    server::run(config).await
}
