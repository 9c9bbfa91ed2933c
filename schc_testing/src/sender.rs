//! Sender-side fragmentation used to feed the gateway in tests.

use bytes::Bytes;
use schc_gateway::{codec::checksum, config::FragmentationProfile};

/// Splits a message into tiles and builds the frames a conformant sender
/// would transmit.
///
/// Every tile but the last travels in a regular fragment; the last tile and
/// the RCS travel in the All-1 fragment.
#[derive(Clone, Debug)]
pub struct SchcSender {
    profile: FragmentationProfile,
    message: Bytes,
    regular: usize,
}

impl SchcSender {
    /// Prepare `message` for transmission.
    ///
    /// # Panics
    ///
    /// Panics if `message` is empty or larger than the profile allows.
    pub fn new(profile: FragmentationProfile, message: impl Into<Bytes>) -> Self {
        let message = message.into();
        assert!(!message.is_empty(), "message must not be empty");
        assert!(
            message.len() <= profile.max_message_size(),
            "message of {} bytes exceeds the profile",
            message.len()
        );
        let regular = message.len().div_ceil(profile.tile_size()) - 1;
        Self {
            profile,
            message,
            regular,
        }
    }

    /// The message being sent.
    #[must_use]
    pub fn message(&self) -> &Bytes { &self.message }

    /// Number of tiles sent in regular fragments.
    #[must_use]
    pub fn regular_tiles(&self) -> usize { self.regular }

    /// Window and FCN of the tile at `index`.
    #[must_use]
    pub fn position(&self, index: usize) -> (u8, u8) {
        let size = self.profile.window_size();
        let window = u8::try_from(index / size).expect("window index fits in a byte");
        let fcn = u8::try_from(size - 1 - index % size).expect("fcn fits in a byte");
        (window, fcn)
    }

    fn header(&self, window: u8, fcn: u8) -> u8 { (window << self.profile.fcn_bits()) | fcn }

    /// Regular fragment carrying `count` tiles starting at `first`.
    ///
    /// # Panics
    ///
    /// Panics if the range reaches the last tile.
    #[must_use]
    pub fn tiles(&self, first: usize, count: usize) -> Bytes {
        assert!(first + count <= self.regular, "range overlaps the last tile");
        let tile = self.profile.tile_size();
        let (window, fcn) = self.position(first);
        let mut frame = vec![self.header(window, fcn)];
        frame.extend_from_slice(&self.message[first * tile..(first + count) * tile]);
        Bytes::from(frame)
    }

    /// Regular fragment carrying the single tile at `index`.
    #[must_use]
    pub fn tile(&self, index: usize) -> Bytes { self.tiles(index, 1) }

    /// Window of the All-1 fragment.
    #[must_use]
    pub fn last_window(&self) -> u8 { self.position(self.regular).0 }

    /// All-1 fragment with the correct RCS.
    #[must_use]
    pub fn all1(&self) -> Bytes { self.all1_with_rcs(checksum(&self.message)) }

    /// All-1 fragment carrying an arbitrary RCS.
    #[must_use]
    pub fn all1_with_rcs(&self, rcs: u32) -> Bytes {
        let mut frame = vec![self.header(self.last_window(), self.profile.all_ones_fcn())];
        frame.extend_from_slice(&rcs.to_be_bytes());
        frame.extend_from_slice(&self.message[self.regular * self.profile.tile_size()..]);
        Bytes::from(frame)
    }

    /// Header-only ACK request for `window`.
    #[must_use]
    pub fn ack_request(&self, window: u8) -> Bytes { Bytes::from(vec![self.header(window, 0)]) }

    /// Header-only sender abort.
    #[must_use]
    pub fn abort(&self) -> Bytes {
        Bytes::from(vec![self.header(self.last_window(), self.profile.all_ones_fcn())])
    }

    /// One regular fragment per tile, followed by the All-1 fragment.
    #[must_use]
    pub fn fragments(&self) -> Vec<Bytes> {
        (0..self.regular)
            .map(|index| self.tile(index))
            .chain(std::iter::once(self.all1()))
            .collect()
    }
}
