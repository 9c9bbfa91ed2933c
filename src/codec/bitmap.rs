//! Per-window reception bitmap.

use std::fmt;

/// Reception bitmap of one window.
///
/// Position `i` corresponds to FCN `window_size - 1 - i`, so the first tile
/// sent in a window occupies the leftmost bit. Bits only ever go from `0` to
/// `1`.
///
/// # Examples
///
/// ```
/// use schc_gateway::codec::Bitmap;
///
/// let mut bitmap = Bitmap::new(4);
/// bitmap.set(0);
/// bitmap.set(2);
/// assert_eq!(bitmap.to_string(), "1010");
/// assert!(!bitmap.is_complete());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap(Vec<bool>);

impl Bitmap {
    /// Create an empty bitmap with `len` positions.
    #[must_use]
    pub fn new(len: usize) -> Self { Self(vec![false; len]) }

    /// Mark `position` as received. Returns `false` if it was already set or
    /// lies outside the bitmap.
    pub fn set(&mut self, position: usize) -> bool {
        match self.0.get_mut(position) {
            Some(bit) if !*bit => {
                *bit = true;
                true
            }
            _ => false,
        }
    }

    /// Report whether `position` has been received.
    #[must_use]
    pub fn get(&self, position: usize) -> bool { self.0.get(position).copied().unwrap_or(false) }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Report whether every position has been received.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.0.iter().all(|bit| *bit) }

    /// Positions still missing, in wire order.
    pub fn missing(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(pos, bit)| (!*bit).then_some(pos))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[bool] { &self.0 }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.0 {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}
