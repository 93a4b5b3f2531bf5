//! Per-point selection bits and the side file that keeps them across evictions.
use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// One bit per point of a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionMask {
    words: Vec<u64>,
    len: usize,
}

impl SelectionMask {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> bool {
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    pub fn set(&mut self, index: usize, selected: bool) {
        let bit = 1u64 << (index % 64);
        if selected {
            self.words[index / 64] |= bit;
        } else {
            self.words[index / 64] &= !bit;
        }
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn byte_size(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    /// Indices of all set bits in ascending order.
    pub fn iter_selected(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&i| self.get(i))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_size());
        for &w in &self.words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(len: usize, bytes: &[u8]) -> io::Result<Self> {
        let mut mask = Self::new(len);
        if bytes.len() != mask.byte_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "selection record does not match node size",
            ));
        }
        let mut cursor = Cursor::new(bytes);
        for w in mask.words.iter_mut() {
            *w = cursor.read_u64::<LittleEndian>()?;
        }
        Ok(mask)
    }
}

/// Scratch file of per-node records keyed by node file offset.
///
/// A record of unchanged length is rewritten in place; a resized one is appended.
#[derive(Debug)]
pub struct SideStore {
    file: File,
    entries: HashMap<u64, (u64, usize)>,
    end: u64,
}

impl SideStore {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: tempfile::tempfile()?,
            entries: HashMap::new(),
            end: 0,
        })
    }

    pub fn put(&mut self, key: u64, bytes: &[u8]) -> io::Result<()> {
        let pos = match self.entries.get(&key) {
            Some(&(pos, len)) if len == bytes.len() => pos,
            _ => self.end,
        };
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(bytes)?;
        self.entries.insert(key, (pos, bytes.len()));
        if pos == self.end {
            self.end += bytes.len() as u64;
        }
        Ok(())
    }

    pub fn get(&mut self, key: u64) -> io::Result<Option<Vec<u8>>> {
        let Some(&(pos, len)) = self.entries.get(&key) else {
            return Ok(None);
        };
        let mut bytes = vec![0u8; len];
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.read_exact(&mut bytes)?;
        Ok(Some(bytes))
    }

    pub fn remove(&mut self, key: u64) {
        self.entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_bits_and_counts() {
        let mut mask = SelectionMask::new(130);
        mask.set(0, true);
        mask.set(64, true);
        mask.set(129, true);
        mask.set(64, false);
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.iter_selected().collect::<Vec<_>>(), vec![0, 129]);
        let copy = SelectionMask::from_bytes(130, &mask.to_bytes()).unwrap();
        assert_eq!(copy, mask);
        assert!(SelectionMask::from_bytes(10, &mask.to_bytes()).is_err());
    }

    #[test]
    fn side_store_returns_latest_record() {
        let mut store = SideStore::new().unwrap();
        store.put(64, &[1, 2, 3]).unwrap();
        store.put(92, &[9]).unwrap();
        store.put(64, &[4, 5]).unwrap();
        assert_eq!(store.get(64).unwrap(), Some(vec![4, 5]));
        assert_eq!(store.get(92).unwrap(), Some(vec![9]));
        assert_eq!(store.get(120).unwrap(), None);
        store.remove(92);
        assert_eq!(store.get(92).unwrap(), None);
    }

    #[test]
    fn rewriting_a_record_keeps_the_file_size() {
        let mut store = SideStore::new().unwrap();
        for round in 0..1000u32 {
            store.put(7, &[(round % 251) as u8; 64]).unwrap();
        }
        assert_eq!(store.file.metadata().unwrap().len(), 64);
        assert_eq!(store.get(7).unwrap(), Some(vec![(999 % 251) as u8; 64]));

        store.put(7, &[1; 8]).unwrap();
        assert_eq!(store.get(7).unwrap(), Some(vec![1; 8]));
        assert_eq!(store.end, 72);
    }
}
