//! Decoded fragment representation and the consuming decoder.

use bytes::{Buf, Bytes};

use super::{CodecError, FragmentKind, RuleId, classify};
use crate::config::FragmentationProfile;

/// Bytes occupied by the RCS in an All-1 fragment.
pub const RCS_LEN: usize = 4;

const ALL1_HEADER_LEN: usize = 1 + RCS_LEN;

/// A decoded SCHC fragment.
///
/// Payloads are zero-copy slices of the buffer handed to [`decode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    /// One or more whole tiles.
    Regular {
        /// Window the first tile belongs to.
        window: u8,
        /// FCN of the first tile.
        fcn: u8,
        /// Concatenated tiles.
        payload: Bytes,
    },
    /// Final fragment carrying the last tile and the RCS.
    All1 {
        /// Window of the last tile.
        window: u8,
        /// FCN field, always all-ones.
        fcn: u8,
        /// Reassembly check sequence computed by the sender.
        rcs: u32,
        /// Last tile, possibly shorter than a full tile.
        payload: Bytes,
    },
    /// Request for the bitmap of `window`.
    AckRequest {
        /// Window the sender is asking about.
        window: u8,
    },
    /// Sender-initiated abort.
    SenderAbort {
        /// Window field of the abort header.
        window: u8,
    },
    /// Receiver-initiated abort.
    ReceiverAbort,
}

impl Fragment {
    #[must_use]
    pub fn kind(&self) -> FragmentKind {
        match self {
            Fragment::Regular { .. } => FragmentKind::Regular,
            Fragment::All1 { .. } => FragmentKind::All1,
            Fragment::AckRequest { .. } => FragmentKind::AckRequest,
            Fragment::SenderAbort { .. } => FragmentKind::SenderAbort,
            Fragment::ReceiverAbort => FragmentKind::ReceiverAbort,
        }
    }

    /// Window field of the header, if the kind carries one.
    #[must_use]
    pub fn window(&self) -> Option<u8> {
        match self {
            Fragment::Regular { window, .. }
            | Fragment::All1 { window, .. }
            | Fragment::AckRequest { window }
            | Fragment::SenderAbort { window } => Some(*window),
            Fragment::ReceiverAbort => None,
        }
    }

    /// Payload length in bits.
    #[must_use]
    pub fn payload_bits(&self) -> usize {
        match self {
            Fragment::Regular { payload, .. } | Fragment::All1 { payload, .. } => payload.len() * 8,
            _ => 0,
        }
    }
}

/// Decode a fragment, consuming `buffer`.
///
/// Byte 0 holds the window and FCN fields. An All-1 fragment carries the RCS
/// big-endian in bytes 1 to 4 followed by the last tile; a regular fragment
/// carries whole tiles from byte 1.
///
/// # Errors
///
/// Returns a [`CodecError`] for any malformed fragment: see [`classify`] and
/// the length and range checks described on each variant.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use schc_gateway::{
///     codec::{Fragment, RuleId, decode},
///     config::FragmentationProfile,
/// };
///
/// let profile = FragmentationProfile::lorawan_uplink();
/// let mut frame = vec![62_u8];
/// frame.extend_from_slice(&[7; 10]);
/// let fragment = decode(&profile, RuleId::new(20), Bytes::from(frame)).expect("valid fragment");
/// assert!(matches!(fragment, Fragment::Regular { window: 0, fcn: 62, .. }));
/// ```
pub fn decode(
    profile: &FragmentationProfile,
    rule_id: RuleId,
    mut buffer: Bytes,
) -> Result<Fragment, CodecError> {
    let len = buffer.len();
    let Some(&header) = buffer.first() else {
        return Err(CodecError::Empty);
    };
    let (window, fcn) = profile.split_header(header);
    let kind = classify(profile, rule_id, len, fcn)?;
    buffer.advance(1);

    match kind {
        FragmentKind::AckRequest => Ok(Fragment::AckRequest { window }),
        FragmentKind::SenderAbort => Ok(Fragment::SenderAbort { window }),
        FragmentKind::ReceiverAbort => Ok(Fragment::ReceiverAbort),
        FragmentKind::All1 => {
            if len < ALL1_HEADER_LEN {
                return Err(CodecError::Truncated {
                    expected: ALL1_HEADER_LEN,
                    found: len,
                });
            }
            let rcs = buffer.get_u32();
            if buffer.len() > profile.tile_size() {
                return Err(CodecError::OversizedLastTile {
                    len: buffer.len(),
                    tile_size: profile.tile_size(),
                });
            }
            Ok(Fragment::All1 {
                window,
                fcn,
                rcs,
                payload: buffer,
            })
        }
        FragmentKind::Regular => {
            let tile_size = profile.tile_size();
            if buffer.len() % tile_size != 0 {
                return Err(CodecError::PartialTile {
                    payload_len: buffer.len(),
                    tile_size,
                });
            }
            if usize::from(fcn) >= profile.window_size() {
                return Err(CodecError::FcnOutOfWindow {
                    fcn,
                    window_size: profile.window_size(),
                });
            }
            let first_tile = profile.tile_index(window, fcn);
            let tile_count = buffer.len() / tile_size;
            if first_tile + tile_count > profile.total_tiles() {
                return Err(CodecError::TilesOutOfRange {
                    first_tile,
                    tile_count,
                    total_tiles: profile.total_tiles(),
                });
            }
            Ok(Fragment::Regular {
                window,
                fcn,
                payload: buffer,
            })
        }
    }
}
