//! Error types raised while decoding fragments and encoding acknowledgements.

use thiserror::Error;

use super::RuleId;

/// Reasons a fragment is rejected or an ACK cannot be encoded.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer held no header byte.
    #[error("empty fragment")]
    Empty,
    /// The rule id belongs to neither direction of the profile.
    #[error("unknown rule id {rule_id}")]
    UnknownRule {
        /// Rule id received with the fragment.
        rule_id: RuleId,
    },
    /// The fragment is shorter than its kind requires.
    #[error("fragment truncated: expected at least {expected} bytes, found {found}")]
    Truncated {
        /// Minimum length for the fragment kind.
        expected: usize,
        /// Length actually received.
        found: usize,
    },
    /// A regular payload does not divide into whole tiles.
    #[error("payload of {payload_len} bytes is not a whole number of {tile_size}-byte tiles")]
    PartialTile {
        /// Payload length in bytes.
        payload_len: usize,
        /// Configured tile size in bytes.
        tile_size: usize,
    },
    /// The All-1 fragment carries more than one tile.
    #[error("last tile of {len} bytes exceeds the {tile_size}-byte tile size")]
    OversizedLastTile {
        /// Payload length in bytes.
        len: usize,
        /// Configured tile size in bytes.
        tile_size: usize,
    },
    /// A regular fragment names a position outside its window.
    #[error("fcn {fcn} outside a window of {window_size} tiles")]
    FcnOutOfWindow {
        /// FCN carried by the fragment.
        fcn: u8,
        /// Configured tiles per window.
        window_size: usize,
    },
    /// The fragment's tiles run past the last tile of the session.
    #[error("tiles {first_tile}..{end} exceed the {total_tiles} tiles of a session", end = .first_tile + .tile_count)]
    TilesOutOfRange {
        /// Global index of the first tile.
        first_tile: usize,
        /// Number of tiles carried.
        tile_count: usize,
        /// Tiles available in a session.
        total_tiles: usize,
    },
    /// A header-only uplink frame that is neither an ACK request nor an abort.
    #[error("header-only fragment with fcn {fcn}")]
    UnexpectedHeaderOnly {
        /// FCN carried by the fragment.
        fcn: u8,
    },
    /// A downlink-rule fragment other than a receiver abort.
    #[error("unsupported downlink fragment with fcn {fcn}")]
    UnsupportedDownlink {
        /// FCN carried by the fragment.
        fcn: u8,
    },
    /// The encoded ACK did not end on a byte boundary.
    #[error("encoded ack is {bits} bits, not a whole number of bytes")]
    Misaligned {
        /// Number of bits written.
        bits: usize,
    },
}

impl CodecError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CodecError::Empty => "empty",
            CodecError::UnknownRule { .. } => "unknown_rule",
            CodecError::Truncated { .. } => "truncated",
            CodecError::PartialTile { .. } => "partial_tile",
            CodecError::OversizedLastTile { .. } => "oversized_last_tile",
            CodecError::FcnOutOfWindow { .. } => "fcn_out_of_window",
            CodecError::TilesOutOfRange { .. } => "tiles_out_of_range",
            CodecError::UnexpectedHeaderOnly { .. } => "unexpected_header_only",
            CodecError::UnsupportedDownlink { .. } => "unsupported_downlink",
            CodecError::Misaligned { .. } => "misaligned",
        }
    }
}
