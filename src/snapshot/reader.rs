//! Cursor over snapshot bytes with the RDB integer and string encodings.
//!
//! ## Size encoding
//!
//! The top two bits of the first byte select the form:
//!
//! | Bits | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | `00` | the remaining 6 bits are the value                    |
//! | `01` | 6 bits + the next byte, big-endian (14 bits)          |
//! | `10` | the next 4 bytes, big-endian                          |
//! | `11` | special string encoding, selected by the low 6 bits   |
//!
//! ## Special string encodings
//!
//! | Low bits | Payload                                             |
//! |----------|-----------------------------------------------------|
//! | `0`      | 8-bit signed integer                                |
//! | `1`      | 16-bit signed integer, little-endian                |
//! | `2`      | 32-bit signed integer, little-endian                |
//! | `3`      | LZF blob: size `clen`, size `ulen`, `clen` bytes    |

use crate::snapshot::decoder::SnapshotError;
use bytes::Bytes;

pub const ENC_INT8: u8 = 0;
pub const ENC_INT16: u8 = 1;
pub const ENC_INT32: u8 = 2;
pub const ENC_LZF: u8 = 3;

/// Result of reading a size-encoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// A plain length or integer
    Len(usize),
    /// A special string encoding (`11` prefix), carrying the low 6 bits
    Encoded(u8),
}

/// Reads primitives from a snapshot held in memory.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Takes the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.remaining() < n {
            return Err(SnapshotError::UnexpectedEof {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SnapshotError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Reads a size-encoded field.
    pub fn read_length(&mut self) -> Result<Length, SnapshotError> {
        let first = self.read_u8()?;
        let low = first & 0x3F;

        match first >> 6 {
            0b00 => Ok(Length::Len(low as usize)),
            0b01 => {
                let next = self.read_u8()?;
                Ok(Length::Len(((low as usize) << 8) | next as usize))
            }
            0b10 => Ok(Length::Len(u32::from_be_bytes(self.take_array()?) as usize)),
            _ => Ok(Length::Encoded(low)),
        }
    }

    /// Reads a size-encoded integer where a special encoding is not allowed,
    /// such as a database index or a key count.
    pub fn read_size(&mut self) -> Result<usize, SnapshotError> {
        let offset = self.pos;
        match self.read_length()? {
            Length::Len(n) => Ok(n),
            Length::Encoded(encoding) => Err(SnapshotError::UnexpectedEncoding { offset, encoding }),
        }
    }

    /// Reads a string-encoded value.
    ///
    /// Integer encodings are returned in decimal form. LZF blobs are skipped
    /// whole and returned as an empty string.
    pub fn read_string(&mut self) -> Result<Bytes, SnapshotError> {
        let offset = self.pos;
        match self.read_length()? {
            Length::Len(n) => Ok(Bytes::copy_from_slice(self.take(n)?)),
            Length::Encoded(ENC_INT8) => {
                let n = self.read_u8()? as i8;
                Ok(Bytes::from(n.to_string()))
            }
            Length::Encoded(ENC_INT16) => {
                let n = i16::from_le_bytes(self.take_array()?);
                Ok(Bytes::from(n.to_string()))
            }
            Length::Encoded(ENC_INT32) => {
                let n = i32::from_le_bytes(self.take_array()?);
                Ok(Bytes::from(n.to_string()))
            }
            Length::Encoded(ENC_LZF) => {
                let compressed = self.read_size()?;
                let _uncompressed = self.read_size()?;
                self.take(compressed)?;
                Ok(Bytes::new())
            }
            Length::Encoded(encoding) => Err(SnapshotError::UnexpectedEncoding { offset, encoding }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_bit_length() {
        let mut reader = SnapshotReader::new(&[0x0A]);
        assert_eq!(reader.read_length().unwrap(), Length::Len(10));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_fourteen_bit_length() {
        // 0b01_000010 0xBC -> 0x2BC = 700
        let mut reader = SnapshotReader::new(&[0x42, 0xBC]);
        assert_eq!(reader.read_size().unwrap(), 700);
    }

    #[test]
    fn test_thirty_two_bit_length() {
        let mut reader = SnapshotReader::new(&[0x80, 0x00, 0x00, 0x42, 0x68]);
        assert_eq!(reader.read_size().unwrap(), 17_000);
    }

    #[test]
    fn test_special_encoding_is_not_a_size() {
        let mut reader = SnapshotReader::new(&[0xC0, 0x7B]);
        assert_eq!(
            reader.read_size(),
            Err(SnapshotError::UnexpectedEncoding {
                offset: 0,
                encoding: 0
            })
        );
    }

    #[test]
    fn test_plain_string() {
        let mut reader = SnapshotReader::new(b"\x03foobar");
        assert_eq!(reader.read_string().unwrap(), Bytes::from("foo"));
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn test_integer_strings() {
        let mut reader = SnapshotReader::new(&[0xC0, 0x7B]);
        assert_eq!(reader.read_string().unwrap(), Bytes::from("123"));

        let mut reader = SnapshotReader::new(&[0xC0, 0xFF]);
        assert_eq!(reader.read_string().unwrap(), Bytes::from("-1"));

        let mut reader = SnapshotReader::new(&[0xC1, 0x39, 0x30]);
        assert_eq!(reader.read_string().unwrap(), Bytes::from("12345"));

        let mut reader = SnapshotReader::new(&[0xC2, 0x87, 0xD6, 0x12, 0x00]);
        assert_eq!(reader.read_string().unwrap(), Bytes::from("1234567"));
    }

    #[test]
    fn test_lzf_string_is_skipped_whole() {
        // clen = 3, ulen = 10, three payload bytes, then a trailing marker.
        let mut reader = SnapshotReader::new(&[0xC3, 0x03, 0x0A, 0x01, 0x02, 0x03, 0xFF]);
        assert_eq!(reader.read_string().unwrap(), Bytes::new());
        assert_eq!(reader.read_u8().unwrap(), 0xFF);
    }

    #[test]
    fn test_unknown_string_encoding() {
        let mut reader = SnapshotReader::new(&[0xC5]);
        assert!(matches!(
            reader.read_string(),
            Err(SnapshotError::UnexpectedEncoding { encoding: 5, .. })
        ));
    }

    #[test]
    fn test_truncated_string() {
        let mut reader = SnapshotReader::new(b"\x05ab");
        assert_eq!(
            reader.read_string(),
            Err(SnapshotError::UnexpectedEof {
                offset: 1,
                needed: 5
            })
        );
    }

    #[test]
    fn test_little_endian_integers() {
        let mut reader = SnapshotReader::new(&[
            0x01, 0x00, 0x00, 0x00, 0x15, 0x72, 0xE7, 0x07, 0x8F, 0x01, 0x00, 0x00,
        ]);
        assert_eq!(reader.read_u32_le().unwrap(), 1);
        assert_eq!(reader.read_u64_le().unwrap(), 1_713_824_559_637);
    }
}
