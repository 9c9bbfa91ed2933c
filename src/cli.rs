//! Command line interface for the `schc-gateway` binary.
//!
//! Shared with `build.rs`, which renders the man page from these definitions,
//! so this module must not depend on the library.

use clap::{Parser, ValueEnum};

/// Acknowledgement policy selectable on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AckModeArg {
    /// Acknowledge every window once its last tile arrives.
    #[default]
    EndOfWindow,
    /// Acknowledge one window at a time after the All-1 fragment.
    EndOfSession,
    /// Acknowledge every incomplete window in one compound ACK.
    Compound,
}

/// Command line arguments for the `schc-gateway` binary.
///
/// Reads TTN v3 uplink envelopes, one JSON object per line, from standard
/// input and writes downlink publications, one per line, to standard output.
#[derive(Debug, Parser)]
#[command(
    name = "schc-gateway",
    version,
    about = "SCHC Ack-on-Error reassembly gateway for LoRaWAN uplinks"
)]
pub struct Cli {
    /// TTN application user used in downlink topics.
    #[arg(short, long)]
    pub username: String,

    /// Acknowledgement policy.
    #[arg(short, long, value_enum, default_value_t = AckModeArg::EndOfWindow)]
    pub ack_mode: AckModeArg,

    /// Number of concurrent reassembly sessions.
    #[arg(short, long, default_value_t = 10)]
    pub pool_size: usize,
}
