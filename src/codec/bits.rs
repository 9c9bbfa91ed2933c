//! MSB-first bit packing for ACK frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::CodecError;

/// Accumulates bits most-significant first into whole bytes.
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    bytes: BytesMut,
    current: u8,
    len: usize,
}

impl BitWriter {
    pub(crate) fn new() -> Self { Self::default() }

    pub(crate) fn push_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | u8::from(bit);
        self.len += 1;
        if self.len % 8 == 0 {
            self.bytes.put_u8(self.current);
            self.current = 0;
        }
    }

    /// Append the low `width` bits of `value`, most significant first.
    pub(crate) fn push_bits(&mut self, value: u8, width: u8) {
        for shift in (0..width).rev() {
            self.push_bit((value >> shift) & 1 == 1);
        }
    }

    pub(crate) fn extend(&mut self, bits: &[bool]) {
        for bit in bits {
            self.push_bit(*bit);
        }
    }

    /// Fill the current byte with `fill` bits. A no-op when already aligned.
    pub(crate) fn pad(&mut self, fill: bool) {
        while self.len % 8 != 0 {
            self.push_bit(fill);
        }
    }

    pub(crate) fn bit_len(&self) -> usize { self.len }

    /// Return the packed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Misaligned`] if the bit count is not a multiple
    /// of eight.
    pub(crate) fn finish(self) -> Result<Bytes, CodecError> {
        if self.len % 8 != 0 {
            return Err(CodecError::Misaligned { bits: self.len });
        }
        Ok(self.bytes.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::BitWriter;
    use crate::codec::CodecError;

    #[test]
    fn packs_msb_first() {
        let mut writer = BitWriter::new();
        writer.push_bits(0b10, 2);
        writer.push_bit(true);
        writer.pad(false);
        assert_eq!(writer.finish().expect("aligned").as_ref(), &[0b1010_0000]);
    }

    #[test]
    fn unaligned_output_is_rejected() {
        let mut writer = BitWriter::new();
        writer.push_bits(0b101, 3);
        assert_eq!(writer.finish(), Err(CodecError::Misaligned { bits: 3 }));
    }

    #[test]
    fn padding_is_noop_on_boundary() {
        let mut writer = BitWriter::new();
        writer.push_bits(0xff, 8);
        writer.pad(true);
        assert_eq!(writer.bit_len(), 8);
    }
}
