//! wificond - nl80211 event monitor and scan utility
//!
//! Decodes nl80211 kernel events and drives one-shot scans through an
//! interface session.

mod monitor;
mod output;
mod scan;

use clap::{Parser, Subcommand};
use wificond::Result;

#[derive(Parser)]
#[command(name = "wificond")]
#[command(about = "nl80211 event monitor and scan utility", long_about = None)]
#[command(version)]
struct Cli {
    /// Output JSON
    #[arg(short, long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print decoded nl80211 events
    #[command(visible_alias = "m", visible_alias = "mon")]
    Monitor(monitor::MonitorArgs),

    /// Run a one-shot scan and print the results
    Scan(scan::ScanArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let result = match cli.command {
        Command::Monitor(args) => monitor::run(args, cli.json).await,
        Command::Scan(args) => scan::run(args, cli.json).await,
    };
    if let Err(e) = &result {
        if e.is_permission_denied() {
            eprintln!("hint: nl80211 scan commands require CAP_NET_ADMIN");
        }
    }
    result
}
