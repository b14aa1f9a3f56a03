use anyhow::Context;
use clap::Parser;
use pulsewatch::{agent::AgentRuntime, config::AgentConfig};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file; `PULSE_HUB_URL` and `PULSE_API_KEY` override its values
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("pulsewatch", LevelFilter::DEBUG),
        ("pulse_agent", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = AgentConfig::load(args.file.as_deref())?;
    info!("reporting to {}", config.hub_url);

    let handle = AgentRuntime::spawn(config)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    handle.shutdown().await;
    Ok(())
}
