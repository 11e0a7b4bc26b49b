use super::DnsError;

/// Fixed-capacity byte buffer with a read/write cursor
///
/// Every access is bounds checked; running out of room or input is reported
/// as a [`DnsError`] and leaves the cursor where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl WireBuffer {
    /// An empty buffer of `capacity` bytes for writing
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            cursor: 0,
        }
    }

    /// A buffer over received bytes for reading
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: bytes.into(),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Move the cursor to `pos`
    pub fn seek(&mut self, pos: usize) -> Result<(), DnsError> {
        if pos > self.data.len() {
            return Err(DnsError::Truncated {
                offset: pos,
                needed: 0,
            });
        }
        self.cursor = pos;
        Ok(())
    }

    /// Bytes before the cursor, i.e. everything written so far
    pub fn written(&self) -> &[u8] {
        &self.data[..self.cursor]
    }

    /// The whole underlying storage
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), DnsError> {
        self.put_slice(&[value])
    }

    /// Write a big-endian u16
    pub fn put_u16(&mut self, value: u16) -> Result<(), DnsError> {
        self.put_slice(&value.to_be_bytes())
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<(), DnsError> {
        if bytes.len() > self.remaining() {
            return Err(DnsError::BufferFull {
                needed: bytes.len(),
                remaining: self.remaining(),
            });
        }
        self.data[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, DnsError> {
        let value = self.byte_at(self.cursor)?;
        self.cursor += 1;
        Ok(value)
    }

    /// Read a big-endian u16
    pub fn read_u16(&mut self) -> Result<u16, DnsError> {
        let bytes = self.slice_at(self.cursor, 2)?;
        let value = u16::from_be_bytes([bytes[0], bytes[1]]);
        self.cursor += 2;
        Ok(value)
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&[u8], DnsError> {
        let start = self.cursor;
        self.slice_at(start, len)?;
        self.cursor += len;
        Ok(&self.data[start..start + len])
    }

    /// Random access without moving the cursor
    pub fn byte_at(&self, offset: usize) -> Result<u8, DnsError> {
        self.data
            .get(offset)
            .copied()
            .ok_or(DnsError::Truncated { offset, needed: 1 })
    }

    /// Random access without moving the cursor
    pub fn slice_at(&self, offset: usize, len: usize) -> Result<&[u8], DnsError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(DnsError::Truncated {
                offset,
                needed: len,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_is_big_endian() {
        let mut buf = WireBuffer::with_capacity(3);
        buf.put_u16(0x1234).unwrap();
        buf.put_u8(0xff).unwrap();
        assert_eq!(buf.written(), &[0x12, 0x34, 0xff]);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_put_overflow_keeps_cursor() {
        let mut buf = WireBuffer::with_capacity(3);
        buf.put_u16(1).unwrap();
        assert_eq!(
            buf.put_u16(2).unwrap_err(),
            DnsError::BufferFull {
                needed: 2,
                remaining: 1
            }
        );
        assert_eq!(buf.cursor(), 2);
    }

    #[test]
    fn test_read_truncated_keeps_cursor() {
        let mut buf = WireBuffer::from_bytes(vec![0xab, 0xcd, 0xef]);
        assert_eq!(buf.read_u16().unwrap(), 0xabcd);
        assert!(matches!(buf.read_u16(), Err(DnsError::Truncated { .. })));
        assert_eq!(buf.cursor(), 2);
        assert_eq!(buf.read_u8().unwrap(), 0xef);
        assert!(buf.read_u8().is_err());
    }

    #[test]
    fn test_read_slice_and_seek() {
        let mut buf = WireBuffer::from_bytes(b"hello".to_vec());
        assert_eq!(buf.read_slice(4).unwrap(), b"hell");
        assert!(buf.read_slice(2).is_err());
        buf.seek(1).unwrap();
        assert_eq!(buf.read_slice(4).unwrap(), b"ello");
        assert!(buf.seek(6).is_err());
    }

    #[test]
    fn test_slice_at_does_not_overflow() {
        let buf = WireBuffer::from_bytes(vec![0u8; 4]);
        assert!(buf.slice_at(usize::MAX, 2).is_err());
        assert!(buf.slice_at(2, 3).is_err());
        assert_eq!(buf.slice_at(2, 2).unwrap(), &[0, 0]);
    }
}
