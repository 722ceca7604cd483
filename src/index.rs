//! Chromosome index
//!
//! Ordered mapping from chromosome name to its offset and length within the packed
//! payload. Offsets are store-global base coordinates and are assigned contiguously
//! in registration order, so the entries are always sorted by offset and a global
//! coordinate resolves to a chromosome by binary search.

use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{BuildError, QueryError, Result};

/// Location of one chromosome within the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeEntry {
    /// Unique chromosome name
    pub name: String,
    /// Number of bases
    pub length: u64,
    /// Global base index where the chromosome begins
    pub offset: u64,
}
impl ChromosomeEntry {
    /// One past the last global position of the chromosome
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChromosomeIndex {
    entries: Vec<ChromosomeEntry>,
    by_name: HashMap<String, usize>,
    total: u64,
}
impl ChromosomeIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chromosome and returns the offset assigned to it
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::DuplicateChromosome`] if `name` was already registered
    /// and [`BuildError::MalformedSource`] if the total length would overflow.
    pub fn register(&mut self, name: &str, length: u64) -> Result<u64> {
        if self.by_name.contains_key(name) {
            return Err(BuildError::DuplicateChromosome(name.to_string()).into());
        }
        let offset = self.total;
        let Some(total) = offset.checked_add(length) else {
            return Err(BuildError::MalformedSource(format!(
                "chromosome {name} of length {length} overflows the store size"
            ))
            .into());
        };
        self.by_name.insert(name.to_string(), self.entries.len());
        self.entries.push(ChromosomeEntry {
            name: name.to_string(),
            length,
            offset,
        });
        self.total = total;
        Ok(offset)
    }

    /// Looks up a chromosome by name
    pub fn lookup(&self, name: &str) -> Result<&ChromosomeEntry> {
        self.by_name
            .get(name)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| QueryError::UnknownChromosome(name.to_string()).into())
    }

    /// Resolves a global coordinate into a chromosome name and local coordinate
    ///
    /// Zero-length chromosomes share their offset with the next chromosome and are
    /// never returned.
    pub fn locate(&self, position: u64) -> Result<(&str, u64)> {
        if position >= self.total {
            return Err(QueryError::GlobalOutOfRange {
                position,
                total: self.total,
            }
            .into());
        }
        // last entry whose offset is <= position; non-empty because entries[0].offset == 0
        let idx = self.entries.partition_point(|e| e.offset <= position) - 1;
        let entry = &self.entries[idx];
        Ok((entry.name.as_str(), position - entry.offset))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    #[must_use]
    pub fn entries(&self) -> &[ChromosomeEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of chromosomes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all chromosome lengths
    #[must_use]
    pub fn total_len(&self) -> u64 {
        self.total
    }

    /// Serializes entries as `name_len: u16, name, length: u64, offset: u64`
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for entry in &self.entries {
            writer.write_u16::<LittleEndian>(entry.name.len() as u16)?;
            writer.write_all(entry.name.as_bytes())?;
            writer.write_u64::<LittleEndian>(entry.length)?;
            writer.write_u64::<LittleEndian>(entry.offset)?;
        }
        Ok(())
    }

    /// Reads `count` entries written by [`ChromosomeIndex::write_bytes`]
    ///
    /// The stored offsets must agree with the contiguous layout that re-registering
    /// the entries in order produces; any disagreement is reported as a message for
    /// the caller to wrap with the file path.
    pub fn read_bytes<R: Read>(
        reader: &mut R,
        count: u32,
    ) -> std::io::Result<std::result::Result<Self, String>> {
        let mut index = Self::new();
        for i in 0..count {
            let name_len = reader.read_u16::<LittleEndian>()? as usize;
            let mut name = vec![0; name_len];
            reader.read_exact(&mut name)?;
            let length = reader.read_u64::<LittleEndian>()?;
            let offset = reader.read_u64::<LittleEndian>()?;

            let Ok(name) = String::from_utf8(name) else {
                return Ok(Err(format!("chromosome {i} has a non UTF-8 name")));
            };
            if name.is_empty() {
                return Ok(Err(format!("chromosome {i} has an empty name")));
            }
            if index.total.checked_add(length).is_none() {
                return Ok(Err(format!(
                    "chromosome {name} of length {length} overflows the store size"
                )));
            }
            match index.register(&name, length) {
                Ok(expected) if expected == offset => {}
                Ok(expected) => {
                    return Ok(Err(format!(
                        "chromosome {name} declares offset {offset}, expected {expected}"
                    )))
                }
                Err(_) => return Ok(Err(format!("chromosome {name} is listed twice"))),
            }
        }
        Ok(Ok(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> ChromosomeIndex {
        let mut index = ChromosomeIndex::new();
        index.register("chr1", 5).unwrap();
        index.register("chrEmpty", 0).unwrap();
        index.register("chr2", 4).unwrap();
        index.register("chrM", 3).unwrap();
        index
    }

    #[test]
    fn offsets_are_contiguous() {
        let index = sample();
        let entries = index.entries();
        assert_eq!(entries[0].offset, 0);
        for pair in entries.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].length);
        }
        assert_eq!(index.total_len(), 12);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut index = sample();
        let err = index.register("chr2", 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateChromosome);
        assert_eq!(index.len(), 4);
        assert_eq!(index.total_len(), 12);
    }

    #[test]
    fn locate_inverts_offsets() {
        let index = sample();
        for entry in index.entries() {
            for local in 0..entry.length {
                let (name, pos) = index.locate(entry.offset + local).unwrap();
                assert_eq!(name, entry.name);
                assert_eq!(pos, local);
            }
        }
        assert_eq!(index.locate(5).unwrap(), ("chr2", 0));
        assert_eq!(index.locate(12).unwrap_err().kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn lookup_unknown_is_not_found() {
        let index = sample();
        assert_eq!(index.lookup("chrM").unwrap().offset, 9);
        assert_eq!(index.lookup("chrX").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn serialization_rederives_offsets() {
        let index = sample();
        let mut buf = Vec::new();
        index.write_bytes(&mut buf).unwrap();
        let back = ChromosomeIndex::read_bytes(&mut buf.as_slice(), 4)
            .unwrap()
            .unwrap();
        assert_eq!(back.entries(), index.entries());
        assert!(back.contains("chrEmpty"));
    }

    #[test]
    fn serialization_detects_bad_offsets() {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(1).unwrap();
        buf.extend_from_slice(b"a");
        buf.write_u64::<LittleEndian>(4).unwrap();
        buf.write_u64::<LittleEndian>(2).unwrap();
        let parsed = ChromosomeIndex::read_bytes(&mut buf.as_slice(), 1).unwrap();
        assert!(parsed.is_err());
    }

    #[test]
    fn overflowing_lengths_are_rejected() {
        let mut index = ChromosomeIndex::new();
        index.register("a", u64::MAX).unwrap();
        let err = index.register("b", 6).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSource);
        assert_eq!(index.len(), 1);
        assert_eq!(index.total_len(), u64::MAX);

        let mut buf = Vec::new();
        for (name, length, offset) in [(b"a", u64::MAX, 0), (b"b", 6, u64::MAX)] {
            buf.write_u16::<LittleEndian>(1).unwrap();
            buf.extend_from_slice(name);
            buf.write_u64::<LittleEndian>(length).unwrap();
            buf.write_u64::<LittleEndian>(offset).unwrap();
        }
        let parsed = ChromosomeIndex::read_bytes(&mut buf.as_slice(), 2).unwrap();
        assert!(parsed.unwrap_err().contains("overflows"));
    }
}
