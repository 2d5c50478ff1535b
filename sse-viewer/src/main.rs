use anyhow::Result;
use clap::Parser;
use colored::*;
use std::time::Duration;

mod backoff;
mod viewer;

use viewer::Viewer;

#[derive(Parser)]
#[command(name = "sse-viewer")]
#[command(about = "Follow the broadcast panel's live event stream")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long, default_value = "http://localhost:4000")]
    base_url: String,

    /// Resume after this event id instead of replaying everything buffered
    #[arg(long)]
    last_event_id: Option<u64>,

    /// Drop and reopen the connection after this many seconds without data
    #[arg(long, default_value_t = 25)]
    watchdog_secs: u64,

    /// Upper bound for the reconnect delay
    #[arg(long, default_value_t = 30)]
    max_backoff_secs: u64,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{} Following {}/api/events", "→".blue(), cli.base_url);

    let mut viewer = Viewer::new(
        &cli.base_url,
        cli.last_event_id,
        Duration::from_secs(cli.watchdog_secs.max(1)),
        Duration::from_secs(cli.max_backoff_secs.max(1)),
    );

    tokio::select! {
        result = viewer.run() => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}", "Stopped.".bright_white().bold());
            Ok(())
        }
    }
}
