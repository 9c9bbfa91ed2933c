//! Owned tile storage and per-window bitmaps for one session.

use bytes::{Bytes, BytesMut};

use crate::{
    codec::{Bitmap, checksum_parts},
    config::FragmentationProfile,
};

/// Tile buffer, bitmaps and last tile of an in-progress message.
///
/// All writes are bounds-checked against the profile's tile count. A
/// redelivered tile replaces the stored bytes; its bitmap bit stays set.
#[derive(Debug)]
pub struct TileStore {
    tile_size: usize,
    window_size: usize,
    tiles: Vec<u8>,
    bitmaps: Vec<Bitmap>,
    last_tile: Bytes,
    next_tile: usize,
}

impl TileStore {
    /// Allocate storage for every tile the profile can address.
    #[must_use]
    pub fn new(profile: &FragmentationProfile) -> Self {
        Self {
            tile_size: profile.tile_size(),
            window_size: profile.window_size(),
            tiles: vec![0; profile.max_message_size()],
            bitmaps: (0..profile.max_windows())
                .map(|_| Bitmap::new(profile.window_size()))
                .collect(),
            last_tile: Bytes::new(),
            next_tile: 0,
        }
    }

    /// Store whole tiles starting at global index `first_tile`.
    ///
    /// Returns the number of tiles the payload covered, or `None` if any of
    /// them lies outside the session.
    pub fn store_tiles(&mut self, first_tile: usize, payload: &[u8]) -> Option<usize> {
        let count = payload.len() / self.tile_size;
        let end = first_tile.checked_add(count)?;
        if end > self.tiles.len() / self.tile_size {
            return None;
        }
        for (offset, tile) in payload.chunks_exact(self.tile_size).enumerate() {
            let index = first_tile + offset;
            let (window, position) = (index / self.window_size, index % self.window_size);
            if let Some(bitmap) = self.bitmaps.get_mut(window) {
                bitmap.set(position);
            }
            let start = index * self.tile_size;
            self.tiles[start..start + self.tile_size].copy_from_slice(tile);
        }
        self.next_tile = self.next_tile.max(end);
        Some(count)
    }

    /// Store the final tile and mark the last position of `window`.
    pub fn store_last_tile(&mut self, window: u8, payload: Bytes) {
        if let Some(bitmap) = self.bitmaps.get_mut(usize::from(window)) {
            bitmap.set(self.window_size - 1);
        }
        self.last_tile = payload;
    }

    /// Bitmap of `window`, if the window exists.
    #[must_use]
    pub fn bitmap(&self, window: u8) -> Option<&Bitmap> { self.bitmaps.get(usize::from(window)) }

    #[must_use]
    pub fn bitmaps(&self) -> &[Bitmap] { &self.bitmaps }

    /// Report whether every tile of `window` has arrived.
    #[must_use]
    pub fn window_complete(&self, window: u8) -> bool {
        self.bitmap(window).is_some_and(Bitmap::is_complete)
    }

    /// One past the highest tile index written so far.
    #[must_use]
    pub fn next_tile(&self) -> usize { self.next_tile }

    #[must_use]
    pub fn last_tile(&self) -> &Bytes { &self.last_tile }

    fn body(&self) -> &[u8] { &self.tiles[..self.next_tile * self.tile_size] }

    /// CRC-32 of every tile below [`next_tile`](Self::next_tile) followed by
    /// the last tile.
    #[must_use]
    pub fn checksum(&self) -> u32 { checksum_parts([self.body(), self.last_tile.as_ref()]) }

    /// Copy out the reassembled message.
    #[must_use]
    pub fn reassembled(&self) -> Bytes {
        let mut message = BytesMut::with_capacity(self.body().len() + self.last_tile.len());
        message.extend_from_slice(self.body());
        message.extend_from_slice(&self.last_tile);
        message.freeze()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::TileStore;
    use crate::{codec::checksum, config::FragmentationProfile};

    #[expect(
        unused_braces,
        reason = "rustc false positive for single-line rstest fixtures"
    )]
    #[fixture]
    fn store() -> TileStore { TileStore::new(&FragmentationProfile::lorawan_uplink()) }

    #[rstest]
    fn tiles_spill_into_next_window(mut store: TileStore) {
        let count = store.store_tiles(62, &[1; 30]).expect("in range");
        assert_eq!(count, 3);
        assert!(store.bitmap(0).expect("window 0").get(62));
        assert!(store.bitmap(1).expect("window 1").get(0));
        assert!(store.bitmap(1).expect("window 1").get(1));
        assert_eq!(store.next_tile(), 65);
    }

    #[rstest]
    fn out_of_range_tiles_are_refused(mut store: TileStore) {
        assert_eq!(store.store_tiles(251, &[0; 20]), None);
        assert_eq!(store.next_tile(), 0);
    }

    #[rstest]
    fn redelivery_replaces_stored_tile(mut store: TileStore) {
        store.store_tiles(0, &[1; 10]).expect("in range");
        store.store_tiles(0, &[2; 10]).expect("in range");
        store.store_last_tile(0, Bytes::from_static(b"end"));
        assert_eq!(&store.reassembled()[..10], &[2; 10]);
        assert_eq!(store.bitmap(0).expect("window 0").missing().count(), 61);
    }

    #[rstest]
    fn checksum_covers_tiles_and_last_tile(mut store: TileStore) {
        store.store_tiles(0, b"0123456789abcdefghij").expect("in range");
        store.store_last_tile(0, Bytes::from_static(b"xyz"));
        assert_eq!(store.checksum(), checksum(b"0123456789abcdefghijxyz"));
        assert_eq!(store.reassembled().as_ref(), b"0123456789abcdefghijxyz");
        assert!(store.bitmap(0).expect("window 0").get(62));
    }

    #[rstest]
    fn next_tile_never_decreases(mut store: TileStore) {
        store.store_tiles(10, &[0; 10]).expect("in range");
        store.store_tiles(2, &[0; 10]).expect("in range");
        assert_eq!(store.next_tile(), 11);
    }
}
