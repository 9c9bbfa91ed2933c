//! Fragment classification.

use std::fmt;

use super::{CodecError, RuleId};
use crate::config::{Direction, FragmentationProfile};

/// Kind of a SCHC fragment, derived from its rule id, length and FCN.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    /// Tiles of an intermediate window.
    Regular,
    /// Final fragment carrying the last tile and the RCS.
    All1,
    /// Header-only request for the receiver's bitmap.
    AckRequest,
    /// Sender-initiated abort.
    SenderAbort,
    /// Receiver-initiated abort.
    ReceiverAbort,
}

impl FragmentKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FragmentKind::Regular => "regular",
            FragmentKind::All1 => "all1",
            FragmentKind::AckRequest => "ack_request",
            FragmentKind::SenderAbort => "sender_abort",
            FragmentKind::ReceiverAbort => "receiver_abort",
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Classify a fragment from its rule id, total length in bytes and FCN.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for zero-length frames,
/// [`CodecError::UnknownRule`] for rules outside the profile, and an error
/// for header-only or downlink frames whose FCN matches no fragment kind.
///
/// # Examples
///
/// ```
/// use schc_gateway::{
///     codec::{FragmentKind, RuleId, classify},
///     config::FragmentationProfile,
/// };
///
/// let profile = FragmentationProfile::lorawan_uplink();
/// let rule = RuleId::new(20);
/// assert_eq!(classify(&profile, rule, 1, 0), Ok(FragmentKind::AckRequest));
/// assert_eq!(classify(&profile, rule, 11, 62), Ok(FragmentKind::Regular));
/// assert_eq!(classify(&profile, rule, 8, 63), Ok(FragmentKind::All1));
/// ```
pub fn classify(
    profile: &FragmentationProfile,
    rule_id: RuleId,
    len: usize,
    fcn: u8,
) -> Result<FragmentKind, CodecError> {
    if len == 0 {
        return Err(CodecError::Empty);
    }
    let all_ones = fcn == profile.all_ones_fcn();
    match profile.direction_of(rule_id) {
        Some(Direction::Uplink) => match (len, all_ones) {
            (1, true) => Ok(FragmentKind::SenderAbort),
            (1, false) if fcn == 0 => Ok(FragmentKind::AckRequest),
            (1, false) => Err(CodecError::UnexpectedHeaderOnly { fcn }),
            (_, true) => Ok(FragmentKind::All1),
            (_, false) => Ok(FragmentKind::Regular),
        },
        Some(Direction::Downlink) if all_ones => Ok(FragmentKind::ReceiverAbort),
        Some(Direction::Downlink) => Err(CodecError::UnsupportedDownlink { fcn }),
        None => Err(CodecError::UnknownRule { rule_id }),
    }
}
