//! Fragmentation profile and acknowledgement policy configuration.
//!
//! A [`FragmentationProfile`] fixes the static SCHC parameters shared by every
//! session: tile size, header field widths, window size and the rule ids that
//! carry fragments and acknowledgements. [`AckMode`] selects how the receiver
//! reports missing tiles back to the sender.

use std::{fmt, num::NonZeroUsize, time::Duration};

use thiserror::Error;

use crate::codec::RuleId;

/// Link direction a session reassembles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Fragments sent by the device towards the gateway.
    Uplink,
    /// Fragments sent by the gateway towards the device.
    Downlink,
}

impl Direction {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Uplink => "uplink",
            Direction::Downlink => "downlink",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Acknowledgement policy applied by the receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AckMode {
    /// Acknowledge every window once its last tile has been seen.
    #[default]
    EndOfWindow,
    /// Acknowledge only after the All-1 fragment, one window per ACK.
    EndOfSession,
    /// Acknowledge after the All-1 fragment, listing every incomplete window
    /// in a single compound ACK.
    Compound,
}

impl AckMode {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AckMode::EndOfWindow => "end-of-window",
            AckMode::EndOfSession => "end-of-session",
            AckMode::Compound => "compound",
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Errors raised when a profile cannot describe a one-byte SCHC header.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProfileError {
    /// The window and FCN fields must fill exactly one header byte.
    #[error("header widths must sum to 8 bits; window={window_bits}, fcn={fcn_bits}")]
    HeaderWidth {
        /// Configured width of the window field.
        window_bits: u8,
        /// Configured width of the FCN field.
        fcn_bits: u8,
    },
    /// The window must leave the all-ones FCN free for the All-1 fragment.
    #[error("window size {window_size} does not fit below the all-ones FCN {all_ones}")]
    WindowSize {
        /// Configured number of tiles per window.
        window_size: u8,
        /// FCN value reserved for All-1 fragments.
        all_ones: u8,
    },
    /// The uplink and downlink rules must differ.
    #[error("uplink and downlink rules must differ; both are {0}")]
    SharedRule(RuleId),
}

/// Static SCHC fragmentation parameters.
///
/// # Examples
///
/// ```
/// use schc_gateway::config::FragmentationProfile;
///
/// let profile = FragmentationProfile::lorawan_uplink();
/// assert_eq!(profile.window_size(), 63);
/// assert_eq!(profile.total_tiles(), 252);
/// assert_eq!(profile.all_ones_fcn(), 63);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentationProfile {
    tile_size: NonZeroUsize,
    window_bits: u8,
    fcn_bits: u8,
    window_size: u8,
    max_ack_requests: u8,
    retransmission_timer: Duration,
    inactivity_timer: Duration,
    uplink_rule: RuleId,
    downlink_rule: RuleId,
}

const LORAWAN_TIMER: Duration = Duration::from_secs(12 * 60 * 60);

impl FragmentationProfile {
    /// Uplink profile for LoRaWAN (RFC 9011): 10-byte tiles, a 2-bit window
    /// and a 6-bit FCN with 63 tiles per window.
    #[must_use]
    pub const fn lorawan_uplink() -> Self {
        Self {
            tile_size: NonZeroUsize::MIN.saturating_add(9),
            window_bits: 2,
            fcn_bits: 6,
            window_size: 63,
            max_ack_requests: 8,
            retransmission_timer: LORAWAN_TIMER,
            inactivity_timer: LORAWAN_TIMER,
            uplink_rule: RuleId::new(20),
            downlink_rule: RuleId::new(21),
        }
    }

    /// Build a custom profile, validating the header layout.
    ///
    /// Timers and the ACK-request budget are taken from
    /// [`lorawan_uplink`](Self::lorawan_uplink) and can be changed with the
    /// `with_*` methods.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] if the window and FCN fields do not fill one
    /// byte, if the window would overlap the All-1 FCN, or if both rules are
    /// equal.
    pub fn new(
        tile_size: NonZeroUsize,
        window_bits: u8,
        fcn_bits: u8,
        window_size: u8,
        uplink_rule: RuleId,
        downlink_rule: RuleId,
    ) -> Result<Self, ProfileError> {
        if window_bits.checked_add(fcn_bits) != Some(8) {
            return Err(ProfileError::HeaderWidth {
                window_bits,
                fcn_bits,
            });
        }
        let all_ones = fcn_mask(fcn_bits);
        if window_size == 0 || window_size > all_ones {
            return Err(ProfileError::WindowSize {
                window_size,
                all_ones,
            });
        }
        if uplink_rule == downlink_rule {
            return Err(ProfileError::SharedRule(uplink_rule));
        }
        Ok(Self {
            tile_size,
            window_bits,
            fcn_bits,
            window_size,
            uplink_rule,
            downlink_rule,
            ..Self::lorawan_uplink()
        })
    }

    /// Override the number of ACK requests the sender may issue.
    #[must_use]
    pub const fn with_max_ack_requests(mut self, attempts: u8) -> Self {
        self.max_ack_requests = attempts;
        self
    }

    /// Override the retransmission and inactivity timers.
    #[must_use]
    pub const fn with_timers(mut self, retransmission: Duration, inactivity: Duration) -> Self {
        self.retransmission_timer = retransmission;
        self.inactivity_timer = inactivity;
        self
    }

    #[must_use]
    pub const fn tile_size(&self) -> usize { self.tile_size.get() }

    #[must_use]
    pub const fn window_bits(&self) -> u8 { self.window_bits }

    #[must_use]
    pub const fn fcn_bits(&self) -> u8 { self.fcn_bits }

    /// Number of tiles in one window.
    #[must_use]
    pub const fn window_size(&self) -> usize { self.window_size as usize }

    /// Number of windows addressable by the window field.
    #[must_use]
    pub const fn max_windows(&self) -> usize { 1 << self.window_bits }

    /// Number of tile slots a session allocates.
    #[must_use]
    pub const fn total_tiles(&self) -> usize { self.window_size() * self.max_windows() }

    /// Largest message a session can reassemble, in bytes.
    #[must_use]
    pub const fn max_message_size(&self) -> usize { self.total_tiles() * self.tile_size() }

    /// FCN value marking All-1 and abort fragments.
    #[must_use]
    pub const fn all_ones_fcn(&self) -> u8 { fcn_mask(self.fcn_bits) }

    #[must_use]
    pub const fn max_ack_requests(&self) -> u8 { self.max_ack_requests }

    #[must_use]
    pub const fn retransmission_timer(&self) -> Duration { self.retransmission_timer }

    #[must_use]
    pub const fn inactivity_timer(&self) -> Duration { self.inactivity_timer }

    /// Rule id (LoRaWAN `FPort`) carrying uplink fragments and ACKs.
    #[must_use]
    pub const fn uplink_rule(&self) -> RuleId { self.uplink_rule }

    /// Rule id reserved for downlink fragmentation.
    #[must_use]
    pub const fn downlink_rule(&self) -> RuleId { self.downlink_rule }

    /// Direction carried by `rule_id`, or `None` for a foreign rule.
    #[must_use]
    pub fn direction_of(&self, rule_id: RuleId) -> Option<Direction> {
        if rule_id == self.uplink_rule {
            Some(Direction::Uplink)
        } else if rule_id == self.downlink_rule {
            Some(Direction::Downlink)
        } else {
            None
        }
    }

    /// Split a header byte into its window and FCN fields.
    #[must_use]
    pub const fn split_header(&self, header: u8) -> (u8, u8) {
        let fcn = header & fcn_mask(self.fcn_bits);
        let window = if self.fcn_bits >= 8 {
            0
        } else {
            header >> self.fcn_bits
        };
        (window, fcn)
    }

    /// Global index of the tile at `fcn` within `window`.
    ///
    /// `fcn` must be below the window size.
    #[must_use]
    pub const fn tile_index(&self, window: u8, fcn: u8) -> usize {
        window as usize * self.window_size() + (self.window_size() - 1 - fcn as usize)
    }
}

impl Default for FragmentationProfile {
    fn default() -> Self { Self::lorawan_uplink() }
}

const fn fcn_mask(bits: u8) -> u8 {
    if bits >= 8 {
        u8::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Default number of concurrent sessions per direction.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default depth of each session's fragment queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
