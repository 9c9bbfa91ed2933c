//! `schc-gateway` binary.
//!
//! Reads TTN uplink envelopes line by line from standard input, reassembles
//! SCHC fragments and writes downlink publications to standard output. Logs
//! go to standard error.

mod cli;

use std::sync::Arc;

use clap::Parser;
use schc_gateway::{
    AckMode,
    Fragmenter,
    GatewayEvent,
    ReassemblyEvent,
    event_channel,
    link::Link,
    ttn::JsonLinesLink,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

impl From<cli::AckModeArg> for AckMode {
    fn from(arg: cli::AckModeArg) -> Self {
        match arg {
            cli::AckModeArg::EndOfWindow => AckMode::EndOfWindow,
            cli::AckModeArg::EndOfSession => AckMode::EndOfSession,
            cli::AckModeArg::Compound => AckMode::Compound,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let link = Arc::new(JsonLinesLink::new(cli.username, std::io::stdout()));
    link.initialize().await?;

    let (sink, mut events) = event_channel();
    let fragmenter = Fragmenter::builder(link)
        .ack_mode(cli.ack_mode.into())
        .pool_size(cli.pool_size)
        .event_sink(sink)
        .build()?;

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Reassembly {
                    device,
                    event: ReassemblyEvent::Completed { payload },
                } => info!(%device, len = payload.len(), "message reassembled"),
                GatewayEvent::Reassembly { device, event } => {
                    info!(%device, ?event, "reassembly event");
                }
                GatewayEvent::SessionReleased { device, slot, exit } => {
                    info!(%device, slot, exit = exit.as_str(), "session released");
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = fragmenter.listen_message(line.as_bytes()) {
                    warn!(error = %e, "uplink rejected");
                }
            }
        }
    }

    fragmenter.shutdown().await;
    drop(fragmenter);
    reporter.await?;
    Ok(())
}
