use std::env;
use std::io;

use clap::Parser;
use tracetree::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "tracetree=info";

fn main() -> anyhow::Result<()> {
    let directives = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .init();

    cli::run(Cli::parse())
}
