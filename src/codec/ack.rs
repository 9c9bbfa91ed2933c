//! SCHC ACK encoding.
//!
//! An ACK starts with the window field and the `c` (integrity) bit. A complete
//! ACK stops there. An incomplete ACK appends the window bitmap, either
//! compressed (trailing ones dropped and restored by padding) or in full, and a
//! compound ACK appends one `(window, bitmap)` pair per incomplete window.

use bytes::Bytes;

use super::{Bitmap, BitWriter, CodecError, RuleId};
use crate::config::FragmentationProfile;

/// Encoded ACK ready for downlink transmission.
///
/// The rule id is not part of the bytes; LoRaWAN carries it as the `FPort`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckFrame {
    rule_id: RuleId,
    window: u8,
    complete: bool,
    bytes: Bytes,
}

impl AckFrame {
    #[must_use]
    pub const fn rule_id(&self) -> RuleId { self.rule_id }

    /// Window named in the header.
    #[must_use]
    pub const fn window(&self) -> u8 { self.window }

    /// State of the `c` bit.
    #[must_use]
    pub const fn is_complete(&self) -> bool { self.complete }

    #[must_use]
    pub fn bytes(&self) -> &Bytes { &self.bytes }

    #[must_use]
    pub fn into_bytes(self) -> Bytes { self.bytes }
}

fn header(writer: &mut BitWriter, profile: &FragmentationProfile, window: u8, complete: bool) {
    writer.push_bits(window, profile.window_bits());
    writer.push_bit(complete);
}

/// Encode an ACK for a single window.
///
/// With `compress`, the bitmap is cut after its last zero bit and padded with
/// ones to the byte boundary; otherwise the full bitmap is sent zero padded.
///
/// # Errors
///
/// Returns [`CodecError::Misaligned`] if the frame does not end on a byte
/// boundary.
///
/// # Examples
///
/// ```
/// use schc_gateway::{
///     codec::{Bitmap, RuleId, encode_ack},
///     config::FragmentationProfile,
/// };
///
/// let profile = FragmentationProfile::lorawan_uplink();
/// let bitmap = Bitmap::new(63);
/// let ack = encode_ack(&profile, RuleId::new(20), 2, true, &bitmap, true).expect("encodes");
/// assert_eq!(ack.bytes().as_ref(), &[0b1010_0000]);
/// ```
pub fn encode_ack(
    profile: &FragmentationProfile,
    rule_id: RuleId,
    window: u8,
    complete: bool,
    bitmap: &Bitmap,
    compress: bool,
) -> Result<AckFrame, CodecError> {
    let mut writer = BitWriter::new();
    header(&mut writer, profile, window, complete);
    if complete {
        writer.pad(false);
    } else if compress {
        let bits = bitmap.as_slice();
        let kept = bits.iter().rposition(|bit| !*bit).map_or(0, |pos| pos + 1);
        writer.extend(&bits[..kept]);
        writer.pad(true);
    } else {
        writer.extend(bitmap.as_slice());
        writer.pad(false);
    }
    Ok(AckFrame {
        rule_id,
        window,
        complete,
        bytes: writer.finish()?,
    })
}

/// Encode a compound ACK listing every window in `incomplete`.
///
/// `bitmaps` is indexed by window number. An empty list yields a complete ACK
/// for `last_window`.
///
/// # Errors
///
/// Returns [`CodecError::Misaligned`] if the frame does not end on a byte
/// boundary.
pub fn encode_compound_ack(
    profile: &FragmentationProfile,
    rule_id: RuleId,
    last_window: u8,
    incomplete: &[u8],
    bitmaps: &[Bitmap],
) -> Result<AckFrame, CodecError> {
    let Some((&first, rest)) = incomplete.split_first() else {
        let mut writer = BitWriter::new();
        header(&mut writer, profile, last_window, true);
        writer.pad(false);
        return Ok(AckFrame {
            rule_id,
            window: last_window,
            complete: true,
            bytes: writer.finish()?,
        });
    };

    let empty = Bitmap::new(profile.window_size());
    let bitmap_of = |window: u8| bitmaps.get(usize::from(window)).unwrap_or(&empty);

    let mut writer = BitWriter::new();
    header(&mut writer, profile, first, false);
    writer.extend(bitmap_of(first).as_slice());
    for &window in rest {
        writer.push_bits(window, profile.window_bits());
        writer.extend(bitmap_of(window).as_slice());
    }
    writer.pad(false);
    Ok(AckFrame {
        rule_id,
        window: first,
        complete: false,
        bytes: writer.finish()?,
    })
}
