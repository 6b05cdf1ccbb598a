//! Cascade replay binary
//!
//! Replays a recorded instance history and prints per-address totals.
//!
//! Usage: `cascade-replay <history.json>`

use cascade_ledger::{replay, ReplayInput};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cascade_replay=info,cascade_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: cascade-replay <history.json>")?;

    let raw = std::fs::read_to_string(&path)?;
    let input: ReplayInput = serde_json::from_str(&raw)?;
    tracing::info!(
        path = %path,
        contributions = input.contributions.len(),
        transfers = input.transfers.len(),
        "replaying history"
    );

    let report = replay(&input)?;
    tracing::info!(
        senders = report.sent.len(),
        recipients = report.received.len(),
        undistributed = report.undistributed,
        "replay complete"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
