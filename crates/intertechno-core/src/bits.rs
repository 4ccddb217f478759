use crate::DecodeError;

/// Reads fixed-width bit fields at absolute bit offsets, most significant
/// bit of the first byte being offset 0.
#[derive(Debug, Clone, Copy)]
pub struct BitReader<'a> {
    buf: &'a [u8],
}

impl<'a> BitReader<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8
    }

    /// Reads `width` (at most 8) bits starting at bit `offset`.
    pub fn read_at(&self, offset: usize, width: usize) -> Result<u8, DecodeError> {
        if width == 0 || width > 8 {
            return Err(DecodeError::InvalidLength);
        }
        if offset + width > self.bit_len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut value = 0u8;
        for bit in offset..offset + width {
            let byte = self.buf[bit / 8];
            let set = byte & (0x80 >> (bit % 8)) != 0;
            value = (value << 1) | u8::from(set);
        }
        Ok(value)
    }
}

pub fn hex_value(digit: u8) -> Result<u8, DecodeError> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        other => Err(DecodeError::InvalidHex(other)),
    }
}

/// Converts hex text to bytes. A trailing odd digit fills the high nibble of
/// a final byte.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, DecodeError> {
    let digits = text.as_bytes();
    let mut out = Vec::with_capacity(digits.len().div_ceil(2));
    for pair in digits.chunks(2) {
        let high = hex_value(pair[0])?;
        let low = match pair.get(1) {
            Some(&d) => hex_value(d)?,
            None => 0,
        };
        out.push((high << 4) | low);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{decode_hex, BitReader};
    use crate::DecodeError;

    #[test]
    fn reads_nibbles_across_bytes() {
        let r = BitReader::new(&[0xA0, 0x17]);
        assert_eq!(r.read_at(0, 4).unwrap(), 0xA);
        assert_eq!(r.read_at(4, 4).unwrap(), 0x0);
        assert_eq!(r.read_at(9, 4).unwrap(), 0x2);
        assert_eq!(r.read_at(12, 4).unwrap(), 0x7);
    }

    #[test]
    fn reader_bounds() {
        let r = BitReader::new(&[0xFF]);
        assert_eq!(r.read_at(5, 4).unwrap_err(), DecodeError::UnexpectedEof);
        assert_eq!(r.read_at(0, 9).unwrap_err(), DecodeError::InvalidLength);
    }

    #[test]
    fn hex_odd_digit_fills_high_nibble() {
        assert_eq!(decode_hex("A0107").unwrap(), vec![0xA0, 0x10, 0x70]);
        assert_eq!(decode_hex("zz").unwrap_err(), DecodeError::InvalidHex(b'z'));
    }
}
