use super::ReadAt;
use anyhow::Result;

/// Reader over an archive that is already held in memory
pub struct MemoryReader {
    data: Vec<u8>,
}

impl MemoryReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ReadAt for MemoryReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_is_short() {
        let reader = MemoryReader::new(b"hello".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(reader.read_at(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(reader.read_at(9, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_exact_at_fails_on_truncation() {
        let reader = MemoryReader::new(b"hello".to_vec());
        let mut buf = [0u8; 4];
        reader.read_exact_at(1, &mut buf).unwrap();
        assert_eq!(&buf, b"ello");
        assert!(reader.read_exact_at(2, &mut buf).is_err());
    }
}
