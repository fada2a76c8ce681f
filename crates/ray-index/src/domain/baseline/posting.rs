//! # Posting Blocks
//!
//! The data file of a baseline is an 8-byte magic followed by posting
//! blocks. A catalog position points at the first byte of a block:
//!
//! ```text
//! [attr_len:u16 BE][attr][value_len:u32 BE][value][count:u32 BE][target:u64 BE] x count
//! ```
//!
//! The magic guarantees no block starts at zero, which keeps the catalog's
//! "not found" sentinel unambiguous.

use crate::domain::notice::Target;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};

/// First bytes of every data file.
pub const DATA_MAGIC: &[u8; 8] = b"RAYDATA1";

/// Length of the data file header; the lowest valid position.
pub const DATA_HEADER_LEN: u64 = DATA_MAGIC.len() as u64;

/// Every target holding `value` for `attribute`, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub attribute: String,
    pub value: String,
    pub targets: Vec<Target>,
}

impl Posting {
    /// Bytes this block occupies in the data file.
    pub fn encoded_len(&self) -> u64 {
        2 + self.attribute.len() as u64
            + 4
            + self.value.len() as u64
            + 4
            + 8 * self.targets.len() as u64
    }

    pub fn write_to(&self, out: &mut impl Write) -> io::Result<u64> {
        let attr_len = u16::try_from(self.attribute.len())
            .map_err(|_| invalid("attribute name longer than 65535 bytes"))?;
        let value_len =
            u32::try_from(self.value.len()).map_err(|_| invalid("value longer than 4 GiB"))?;
        let count =
            u32::try_from(self.targets.len()).map_err(|_| invalid("too many targets"))?;

        out.write_all(&attr_len.to_be_bytes())?;
        out.write_all(self.attribute.as_bytes())?;
        out.write_all(&value_len.to_be_bytes())?;
        out.write_all(self.value.as_bytes())?;
        out.write_all(&count.to_be_bytes())?;
        for target in &self.targets {
            out.write_all(&target.to_be_bytes())?;
        }
        Ok(self.encoded_len())
    }

    /// Read one block, refusing any declared length that would run past
    /// `limit` bytes. Corrupt blocks surface as `InvalidData`.
    pub fn read_from(input: &mut impl Read, limit: u64) -> io::Result<Posting> {
        let mut budget = limit;
        let mut take = |n: u64| -> io::Result<()> {
            if n > budget {
                return Err(invalid("posting block runs past the end of the data file"));
            }
            budget -= n;
            Ok(())
        };

        let mut short = [0u8; 2];
        let mut word = [0u8; 4];

        take(2)?;
        input.read_exact(&mut short)?;
        let attr_len = u16::from_be_bytes(short) as u64;
        take(attr_len)?;
        let attribute = read_string(input, attr_len)?;

        take(4)?;
        input.read_exact(&mut word)?;
        let value_len = u32::from_be_bytes(word) as u64;
        take(value_len)?;
        let value = read_string(input, value_len)?;

        take(4)?;
        input.read_exact(&mut word)?;
        let count = u32::from_be_bytes(word) as u64;
        take(count * 8)?;
        let mut targets = Vec::with_capacity(count as usize);
        let mut long = [0u8; 8];
        for _ in 0..count {
            input.read_exact(&mut long)?;
            targets.push(u64::from_be_bytes(long));
        }

        Ok(Posting {
            attribute,
            value,
            targets,
        })
    }

    /// Read the block at `position` of a data file `data_len` bytes long.
    pub fn read_at<F: Read + Seek>(file: &mut F, position: u64, data_len: u64) -> io::Result<Posting> {
        if position < DATA_HEADER_LEN || position >= data_len {
            return Err(invalid("position outside the data file"));
        }
        file.seek(SeekFrom::Start(position))?;
        Posting::read_from(&mut BufReader::new(file), data_len - position)
    }
}

fn read_string(input: &mut impl Read, len: u64) -> io::Result<String> {
    let mut bytes = vec![0u8; len as usize];
    input.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| invalid("posting text is not UTF-8"))
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Sequential scan over every block of a data file.
///
/// Yields `(position, posting)` pairs.
pub struct PostingScan<R: Read> {
    reader: BufReader<R>,
    position: u64,
    data_len: u64,
}

impl<R: Read> PostingScan<R> {
    /// Start scanning; verifies the magic header first.
    pub fn new(input: R, data_len: u64) -> io::Result<Self> {
        let mut reader = BufReader::new(input);
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != DATA_MAGIC {
            return Err(invalid("data file magic mismatch"));
        }
        Ok(Self {
            reader,
            position: DATA_HEADER_LEN,
            data_len,
        })
    }
}

impl<R: Read> Iterator for PostingScan<R> {
    type Item = io::Result<(u64, Posting)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.fill_buf() {
            Ok(buf) if buf.is_empty() => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(e)),
        }
        let position = self.position;
        let posting = Posting::read_from(&mut self.reader, self.data_len.saturating_sub(position));
        Some(posting.map(|p| {
            self.position += p.encoded_len();
            (position, p)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Posting {
        Posting {
            attribute: "bout".to_string(),
            value: "42".to_string(),
            targets: vec![3, 7, 11],
        }
    }

    #[test]
    fn test_encoded_len_matches_written_bytes() {
        let mut out = Vec::new();
        let written = sample().write_to(&mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        assert_eq!(written, 2 + 4 + 4 + 2 + 4 + 3 * 8);
    }

    #[test]
    fn test_read_back() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();
        let len = out.len() as u64;
        let posting = Posting::read_from(&mut Cursor::new(out), len).unwrap();
        assert_eq!(posting, sample());
    }

    #[test]
    fn test_limit_rejects_oversized_count() {
        let mut out = Vec::new();
        sample().write_to(&mut out).unwrap();
        let result = Posting::read_from(&mut Cursor::new(&out), out.len() as u64 - 1);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_read_at_rejects_header_positions() {
        let mut data = DATA_MAGIC.to_vec();
        sample().write_to(&mut data).unwrap();
        let len = data.len() as u64;
        let mut cursor = Cursor::new(data);

        assert!(Posting::read_at(&mut cursor, 0, len).is_err());
        assert!(Posting::read_at(&mut cursor, len, len).is_err());
        assert_eq!(
            Posting::read_at(&mut cursor, DATA_HEADER_LEN, len).unwrap(),
            sample()
        );
    }

    #[test]
    fn test_scan_reports_positions() {
        let mut data = DATA_MAGIC.to_vec();
        let first = sample();
        let second = Posting {
            attribute: "author".to_string(),
            value: "jeff".to_string(),
            targets: vec![1],
        };
        first.write_to(&mut data).unwrap();
        second.write_to(&mut data).unwrap();
        let len = data.len() as u64;

        let scanned: Vec<_> = PostingScan::new(Cursor::new(data), len)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0], (DATA_HEADER_LEN, first.clone()));
        assert_eq!(scanned[1].0, DATA_HEADER_LEN + first.encoded_len());
        assert_eq!(scanned[1].1, second);
    }

    #[test]
    fn test_scan_rejects_bad_magic() {
        let result = PostingScan::new(Cursor::new(b"NOTRAY00".to_vec()), 8);
        assert!(result.is_err());
    }
}
