//! Pre-packed sequence container
//!
//! A `.seqpack` file is a single zstd stream holding a magic number followed by a
//! sequence of [`PackedRecord`]s and a terminator. Records carry the same two-bit
//! words and side tables as a store, in record-relative coordinates, so a store can
//! be rebuilt from a container without decoding every base back to text.
//!
//! # Record layout
//!
//! ```text
//! name_len: u16   (0 terminates the stream)
//! name:     [u8; name_len]
//! len:      u64   bases in this record
//! n_words:  u64
//! words:    [u64; n_words]
//! n_exc:    u64   exception runs, then (start u64, len u64, symbol u8) each
//! n_mask:   u64   case-mask runs, then (start u64, len u64) each
//! ```

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use zstd::{Decoder, Encoder};

use crate::{
    codec::words_for,
    error::{BuildError, Error, Result},
    runs::{CaseMask, ExceptionTable},
};

/// Magic number opening every container stream: "SQPK"
pub const CONTAINER_MAGIC: u32 = 0x4B50_5153;

/// File extension recognized as a container by the command line
pub const CONTAINER_EXTENSION: &str = "seqpack";

/// A chunk of one chromosome in packed form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRecord {
    pub name: String,
    /// Number of bases in this record
    pub len: u64,
    /// Two-bit words, 32 bases each; exception slots hold the filler code
    pub words: Vec<u64>,
    /// Non-canonical symbols, relative to the record start
    pub exceptions: ExceptionTable,
    /// Lowercase canonical bases, relative to the record start
    pub case_mask: CaseMask,
}
impl PackedRecord {
    /// Checks the record's internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.is_empty() {
            return Err("empty record name".to_string());
        }
        let expected = words_for(self.len);
        if self.words.len() as u64 != expected {
            return Err(format!(
                "{} bases need {expected} words, found {}",
                self.len,
                self.words.len()
            ));
        }
        self.exceptions
            .validate(self.len)
            .map_err(|e| format!("exception table: {e}"))?;
        self.case_mask
            .validate(self.len)
            .map_err(|e| format!("case mask: {e}"))
    }
}

/// Streams [`PackedRecord`]s into a compressed container
pub struct ContainerWriter<W: Write> {
    encoder: Encoder<'static, W>,
    records: u64,
}
impl<W: Write> ContainerWriter<W> {
    pub fn new(writer: W, level: i32) -> Result<Self> {
        let mut encoder = Encoder::new(writer, level)?;
        encoder.write_u32::<LittleEndian>(CONTAINER_MAGIC)?;
        Ok(Self {
            encoder,
            records: 0,
        })
    }

    pub fn write_record(&mut self, record: &PackedRecord) -> Result<()> {
        let name_len = u16::try_from(record.name.len())
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                BuildError::MalformedSource(format!(
                    "record name {:?} cannot be stored in a container",
                    record.name
                ))
            })?;
        self.encoder.write_u16::<LittleEndian>(name_len)?;
        self.encoder.write_all(record.name.as_bytes())?;
        self.encoder.write_u64::<LittleEndian>(record.len)?;
        self.encoder
            .write_u64::<LittleEndian>(record.words.len() as u64)?;
        for &word in &record.words {
            self.encoder.write_u64::<LittleEndian>(word)?;
        }
        self.encoder
            .write_u64::<LittleEndian>(record.exceptions.len() as u64)?;
        record.exceptions.write_bytes(&mut self.encoder)?;
        self.encoder
            .write_u64::<LittleEndian>(record.case_mask.len() as u64)?;
        record.case_mask.write_bytes(&mut self.encoder)?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Writes the terminator, closes the zstd frame and returns the inner writer
    pub fn finish(mut self) -> Result<W> {
        self.encoder.write_u16::<LittleEndian>(0)?;
        Ok(self.encoder.finish()?)
    }
}

/// Lazily decodes the records of a container
pub struct ContainerReader<R: Read> {
    decoder: Decoder<'static, BufReader<R>>,
    done: bool,
}

impl ContainerReader<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read> ContainerReader<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut decoder = Decoder::new(reader)?;
        let magic = decoder.read_u32::<LittleEndian>().map_err(|_| not_a_container())?;
        if magic != CONTAINER_MAGIC {
            return Err(not_a_container().into());
        }
        Ok(Self {
            decoder,
            done: false,
        })
    }

    fn read_record(&mut self) -> Result<Option<PackedRecord>> {
        let name_len = self.decoder.read_u16::<LittleEndian>()?;
        if name_len == 0 {
            return Ok(None);
        }
        let mut name = vec![0; name_len as usize];
        self.decoder.read_exact(&mut name)?;
        let name = String::from_utf8(name).map_err(|_| {
            BuildError::MalformedSource("container record name is not valid UTF-8".to_string())
        })?;

        let len = self.decoder.read_u64::<LittleEndian>()?;
        let n_words = self.decoder.read_u64::<LittleEndian>()?;
        if n_words != words_for(len) {
            return Err(BuildError::MalformedSource(format!(
                "container record {name}: {len} bases stored in {n_words} words"
            ))
            .into());
        }
        // The word count comes from the stream, so the vector grows as data arrives
        let mut words = Vec::new();
        for _ in 0..n_words {
            words.push(self.decoder.read_u64::<LittleEndian>()?);
        }
        let n_exceptions = self.decoder.read_u64::<LittleEndian>()?;
        let exceptions = ExceptionTable::read_bytes(&mut self.decoder, n_exceptions)?;
        let n_mask = self.decoder.read_u64::<LittleEndian>()?;
        let case_mask = CaseMask::read_bytes(&mut self.decoder, n_mask)?;

        Ok(Some(PackedRecord {
            name,
            len,
            words,
            exceptions,
            case_mask,
        }))
    }
}

impl<R: Read> Iterator for ContainerReader<R> {
    type Item = Result<PackedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.done = true;
                Some(Err(BuildError::MalformedSource(
                    "container stream ends inside a record".to_string(),
                )
                .into()))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn not_a_container() -> BuildError {
    BuildError::MalformedSource("input is not a seqpack container".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use anyhow::Result;

    fn record(name: &str, len: u64) -> PackedRecord {
        let mut exceptions = ExceptionTable::new();
        if len > 2 {
            exceptions.push(1, b'N');
        }
        PackedRecord {
            name: name.to_string(),
            len,
            words: vec![0x1234_5678_9ABC_DEF0; words_for(len) as usize],
            exceptions,
            case_mask: CaseMask::new(),
        }
    }

    #[test]
    fn records_survive_the_stream() -> Result<()> {
        let records = vec![record("chr1", 40), record("chr1", 3), record("empty", 0)];
        let mut writer = ContainerWriter::new(Vec::new(), 3)?;
        for r in &records {
            writer.write_record(r)?;
        }
        assert_eq!(writer.records(), 3);
        let bytes = writer.finish()?;

        let back = ContainerReader::new(bytes.as_slice())?.collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(back, records);
        Ok(())
    }

    #[test]
    fn truncated_stream_is_an_error() -> Result<()> {
        let mut writer = ContainerWriter::new(Vec::new(), 3)?;
        writer.write_record(&record("chr1", 64))?;
        let bytes = writer.finish()?;

        // Re-encode all but the last bytes of the decompressed stream
        let mut plain = Vec::new();
        Decoder::new(bytes.as_slice())?.read_to_end(&mut plain)?;
        plain.truncate(plain.len() - 5);
        let truncated = zstd::encode_all(plain.as_slice(), 3)?;

        let results: Vec<_> = ContainerReader::new(truncated.as_slice())?.collect();
        assert_eq!(results.len(), 1);
        let Err(err) = &results[0] else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), ErrorKind::MalformedSource);
        Ok(())
    }

    #[test]
    fn huge_declared_length_fails_without_allocating() -> Result<()> {
        let len: u64 = 1 << 62;
        let mut plain = Vec::new();
        plain.write_u32::<LittleEndian>(CONTAINER_MAGIC)?;
        plain.write_u16::<LittleEndian>(4)?;
        plain.extend_from_slice(b"chr1");
        plain.write_u64::<LittleEndian>(len)?;
        plain.write_u64::<LittleEndian>(words_for(len))?;
        plain.write_u64::<LittleEndian>(0)?;
        let bytes = zstd::encode_all(plain.as_slice(), 3)?;

        let results: Vec<_> = ContainerReader::new(bytes.as_slice())?.collect();
        assert_eq!(results.len(), 1);
        let Err(err) = &results[0] else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), ErrorKind::MalformedSource);
        Ok(())
    }

    #[test]
    fn foreign_input_is_rejected() -> Result<()> {
        let bytes = zstd::encode_all(&b">chr1\nACGT\n"[..], 3)?;
        let Err(err) = ContainerReader::new(bytes.as_slice()) else {
            panic!("expected an error");
        };
        assert_eq!(err.kind(), ErrorKind::MalformedSource);
        Ok(())
    }

    #[test]
    fn validate_checks_word_count() {
        let mut r = record("x", 33);
        assert!(r.validate().is_ok());
        r.words.pop();
        assert!(r.validate().is_err());
    }
}
