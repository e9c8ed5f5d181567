//! CLI client for the producer's AutoTask Supervisor (SPEC_FULL §4.7,
//! §6a). Ambient demo tooling — toggles synthetic task generation against
//! a running producer over its internal HTTP surface.

use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Toggle the producer's autotask supervisor", long_about = None)]
struct Args {
    #[arg(long, default_value = "http://localhost:8080")]
    producer_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start periodic synthetic task generation.
    Start {
        #[arg(long, default_value = "5000")]
        interval_ms: u64,
    },
    /// Stop synthetic task generation.
    Stop,
    /// Report whether the supervisor is running and how many ticks fired.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let http = reqwest::Client::new();
    let response = match args.command {
        Command::Start { interval_ms } => {
            http.post(format!("{}/internal/autosend/start", args.producer_url))
                .json(&serde_json::json!({ "interval_ms": interval_ms }))
                .send()
                .await?
        }
        Command::Stop => {
            http.post(format!("{}/internal/autosend/stop", args.producer_url))
                .send()
                .await?
        }
        Command::Status => {
            http.get(format!("{}/internal/autosend/status", args.producer_url))
                .send()
                .await?
        }
    };

    let body: serde_json::Value = response.json().await?;
    info!(?body, "autosend supervisor status");
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}
