//! Protobuf wire format primitives: keys, varints, zigzag and fixed-width values.

use crate::error::DecodeError;

/// Maximum encoded length of a varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Deepest nesting of messages and groups accepted while decoding.
pub const RECURSION_LIMIT: usize = 100;

pub(crate) fn recursion_limit_exceeded() -> DecodeError {
    DecodeError::InvalidData("recursion limit exceeded".into())
}

/// The six wire types that can appear in a field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }
}

/// Compose a field key: `(id << 3) | wire_type`.
#[inline]
pub fn make_key(id: u32, wire_type: WireType) -> u64 {
    ((id as u64) << 3) | wire_type as u64
}

#[inline]
pub fn write_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Number of bytes `v` occupies as a varint.
#[inline]
pub fn varint_len(v: u64) -> usize {
    let bits = 64 - (v | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

#[inline]
pub fn write_key(buf: &mut Vec<u8>, id: u32, wire_type: WireType) {
    write_varint(buf, make_key(id, wire_type));
}

#[inline]
pub fn write_fixed32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn write_fixed64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Write a length prefix followed by the bytes themselves.
#[inline]
pub fn write_length_delimited(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

#[inline]
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Cursor over an encoded buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn truncated(&self, need: usize) -> DecodeError {
        DecodeError::Truncated {
            need,
            have: self.remaining(),
        }
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self
                .buf
                .get(self.pos + i)
                .ok_or_else(|| self.truncated(i + 1))?;
            // the tenth byte carries only bit 63
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(DecodeError::InvalidData("varint overflows 64 bits".into()));
            }
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                self.pos += i + 1;
                return Ok(result);
            }
            shift += 7;
        }
        Err(DecodeError::InvalidData(
            "varint longer than 10 bytes".into(),
        ))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(self.truncated(len));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len)
            .map_err(|_| DecodeError::InvalidData(format!("length {len} too large")))?;
        self.read_bytes(len)
    }

    /// Read a field key and split it into field id and wire type.
    pub fn read_key(&mut self) -> Result<(u32, WireType), DecodeError> {
        let key = self.read_varint()?;
        let wire_type = WireType::from_u8((key & 0x7) as u8)
            .ok_or_else(|| DecodeError::InvalidData(format!("illegal wire type {}", key & 0x7)))?;
        let id = key >> 3;
        if id == 0 || id > u32::MAX as u64 {
            return Err(DecodeError::InvalidData(format!("illegal field id {id}")));
        }
        Ok((id as u32, wire_type))
    }

    /// Skip the value of a field whose key has just been read.
    pub fn skip(&mut self, id: u32, wire_type: WireType) -> Result<(), DecodeError> {
        self.skip_at_depth(id, wire_type, 0)
    }

    /// Like [`skip`](Self::skip), for a field found `depth` levels below the
    /// outermost message. Groups nested past [`RECURSION_LIMIT`] are rejected.
    pub fn skip_at_depth(
        &mut self,
        id: u32,
        wire_type: WireType,
        depth: usize,
    ) -> Result<(), DecodeError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.read_bytes(8)?;
            }
            WireType::Fixed32 => {
                self.read_bytes(4)?;
            }
            WireType::LengthDelimited => {
                self.read_length_delimited()?;
            }
            WireType::StartGroup if depth >= RECURSION_LIMIT => {
                return Err(recursion_limit_exceeded());
            }
            WireType::StartGroup => loop {
                let (inner, inner_type) = self.read_key()?;
                if inner_type == WireType::EndGroup {
                    if inner != id {
                        return Err(DecodeError::InvalidData(format!(
                            "end group tag {inner} does not match start group {id}"
                        )));
                    }
                    break;
                }
                self.skip_at_depth(inner, inner_type, depth + 1)?;
            },
            WireType::EndGroup => {
                return Err(DecodeError::InvalidData(format!(
                    "unexpected end group tag for field {id}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(v: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, v);
        buf
    }

    #[test]
    fn test_varint_boundaries() {
        assert_eq!(varint(0), vec![0x00]);
        assert_eq!(varint(127), vec![0x7f]);
        assert_eq!(varint(128), vec![0x80, 0x01]);
        assert_eq!(varint(300), vec![0xac, 0x02]);
        assert_eq!(varint(u32::MAX as u64), vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(varint(u64::MAX).len(), 10);
        for v in [0, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            assert_eq!(varint_len(v), varint(v).len());
        }
    }

    #[test]
    fn test_read_varint() {
        let data = [0xac, 0x02, 0xff, 0xff, 0xff, 0xff, 0x0f];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.read_varint().unwrap(), u32::MAX as u64);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_varint_truncated() {
        let mut reader = Reader::new(&[0x80, 0x80]);
        assert!(matches!(
            reader.read_varint(),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_read_varint_too_long() {
        let data = [0xff; 11];
        let mut reader = Reader::new(&data);
        assert!(matches!(
            reader.read_varint(),
            Err(DecodeError::InvalidData(_))
        ));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode32(i32::MAX), 0xffff_fffe);
        assert_eq!(zigzag_encode32(i32::MIN), 0xffff_ffff);
        assert_eq!(zigzag_encode64(i64::MIN), u64::MAX);
        for v in [0, -1, 1, i32::MIN, i32::MAX, 12345] {
            assert_eq!(zigzag_decode32(zigzag_encode32(v)), v);
        }
        for v in [0, -1, 1, i64::MIN, i64::MAX] {
            assert_eq!(zigzag_decode64(zigzag_encode64(v)), v);
        }
    }

    #[test]
    fn test_key() {
        assert_eq!(make_key(1, WireType::Varint), 0x08);
        assert_eq!(make_key(2, WireType::LengthDelimited), 0x12);
        let mut reader = Reader::new(&[0x1a]);
        assert_eq!(
            reader.read_key().unwrap(),
            (3, WireType::LengthDelimited)
        );
    }

    #[test]
    fn test_skip_group() {
        // group 1 { field 2 varint 5 } followed by field 3 varint 1
        let data = [0x0b, 0x10, 0x05, 0x0c, 0x18, 0x01];
        let mut reader = Reader::new(&data);
        let (id, wt) = reader.read_key().unwrap();
        reader.skip(id, wt).unwrap();
        assert_eq!(reader.read_key().unwrap(), (3, WireType::Varint));
    }

    #[test]
    fn test_read_varint_overflow() {
        let mut data = vec![0xff; 9];
        data.push(0x02);
        let mut reader = Reader::new(&data);
        assert!(matches!(
            reader.read_varint(),
            Err(DecodeError::InvalidData(_))
        ));

        data[9] = 0x01;
        let mut reader = Reader::new(&data);
        assert_eq!(reader.read_varint().unwrap(), u64::MAX);
    }

    #[test]
    fn test_skip_deep_groups() {
        let data = vec![0x0b; 1_000_000];
        let mut reader = Reader::new(&data);
        let (id, wt) = reader.read_key().unwrap();
        assert!(matches!(
            reader.skip(id, wt),
            Err(DecodeError::InvalidData(ref msg)) if msg.contains("recursion limit")
        ));

        // nesting within the limit is fine
        let mut data = vec![0x0b; 50];
        data.extend([0x0c; 50]);
        let mut reader = Reader::new(&data);
        let (id, wt) = reader.read_key().unwrap();
        reader.skip(id, wt).unwrap();
        assert!(reader.is_empty());
    }

    #[test]
    fn test_fixed() {
        let mut buf = Vec::new();
        write_fixed32(&mut buf, 0x0102_0304);
        write_fixed64(&mut buf, 1);
        assert_eq!(buf, vec![4, 3, 2, 1, 1, 0, 0, 0, 0, 0, 0, 0]);
        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_fixed32().unwrap(), 0x0102_0304);
        assert_eq!(reader.read_fixed64().unwrap(), 1);
    }
}
