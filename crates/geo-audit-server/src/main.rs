use anyhow::Result;
use clap::Parser;
use geo_audit_server::config;
use geo_audit_server::server::Server;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address; overrides GEO_BIND.
    #[arg(long)]
    bind: Option<String>,

    /// YAML segment rules; overrides GEO_SEGMENT_RULES.
    #[arg(long)]
    segment_rules: Option<PathBuf>,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = config::ServerConfig::from_env();
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }
    if let Some(path) = args.segment_rules {
        cfg.segment_rules = Some(path);
    }

    init_logging(&cfg.log_level);

    tracing::info!(event = "server_start", config = ?cfg);

    Server::run(cfg).await
}
