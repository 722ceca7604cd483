//! Index file content
//!
//! A [`Catalog`] is everything a store keeps next to its packed payload: the
//! [`FormatHeader`], the [`ChromosomeIndex`], the [`ExceptionTable`] and the
//! [`CaseMask`]. It is serialized as the uncompressed 64-byte header followed by a
//! zstd-compressed body:
//!
//! 1. `num_chromosomes` index entries
//! 2. `num_exception_runs` exception runs
//! 3. `num_mask_runs` case-mask runs (only from format 2.1.0 on)
//!
//! Keeping the header uncompressed lets the reader check the version, and decide
//! on migration, before touching the body.

use std::io::{Read, Write};
use std::path::Path;

use zstd::{Decoder, Encoder};

use crate::{
    error::{Result, StoreError},
    header::{FormatHeader, CASE_MASK_VERSION, SIZE_HEADER},
    index::ChromosomeIndex,
    runs::{CaseMask, ExceptionTable},
};

#[derive(Debug, Clone)]
pub struct Catalog {
    pub header: FormatHeader,
    pub index: ChromosomeIndex,
    pub exceptions: ExceptionTable,
    pub case_mask: CaseMask,
}
impl Catalog {
    /// Assembles a catalog, deriving the header counts from its sections
    #[must_use]
    pub fn new(
        mut header: FormatHeader,
        index: ChromosomeIndex,
        exceptions: ExceptionTable,
        case_mask: CaseMask,
    ) -> Self {
        header.total_bases = index.total_len();
        header.num_chromosomes = index.len() as u32;
        header.num_exception_runs = exceptions.len() as u64;
        header.num_mask_runs = case_mask.len() as u64;
        Self {
            header,
            index,
            exceptions,
            case_mask,
        }
    }

    /// Writes the header and the compressed body
    pub fn write_bytes<W: Write>(&self, writer: &mut W, level: i32) -> Result<()> {
        self.header.write_bytes(writer)?;
        let mut encoder = Encoder::new(writer, level)?;
        self.index.write_bytes(&mut encoder)?;
        self.exceptions.write_bytes(&mut encoder)?;
        if self.header.version >= CASE_MASK_VERSION {
            self.case_mask.write_bytes(&mut encoder)?;
        }
        encoder.finish()?;
        Ok(())
    }

    /// Reads and validates a catalog
    ///
    /// `path` is only used to name the file in errors. Catalogs older than 2.1.0 are
    /// accepted and come back with an empty case mask.
    pub fn from_reader<R: Read>(reader: &mut R, path: &Path) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| StoreError::corrupt(path, "truncated header"))?;
        let header =
            FormatHeader::from_bytes(&buffer).map_err(|e| StoreError::corrupt(path, e))?;

        let truncated = |e: std::io::Error| StoreError::corrupt(path, format!("body: {e}"));
        let mut body = Decoder::new(reader).map_err(truncated)?;
        let index = match ChromosomeIndex::read_bytes(&mut body, header.num_chromosomes)
            .map_err(truncated)?
        {
            Ok(index) => index,
            Err(reason) => return Err(StoreError::corrupt(path, reason).into()),
        };
        let exceptions =
            ExceptionTable::read_bytes(&mut body, header.num_exception_runs).map_err(truncated)?;
        let case_mask = if header.version >= CASE_MASK_VERSION {
            CaseMask::read_bytes(&mut body, header.num_mask_runs).map_err(truncated)?
        } else {
            CaseMask::new()
        };

        let catalog = Self {
            header,
            index,
            exceptions,
            case_mask,
        };
        catalog
            .validate()
            .map_err(|reason| StoreError::corrupt(path, reason))?;
        Ok(catalog)
    }

    /// Checks the sections against each other and against the header
    pub fn validate(&self) -> std::result::Result<(), String> {
        let total = self.index.total_len();
        if total != self.header.total_bases {
            return Err(format!(
                "header declares {} bases, index holds {total}",
                self.header.total_bases
            ));
        }
        if self.index.len() != self.header.num_chromosomes as usize {
            return Err(format!(
                "header declares {} chromosomes, index holds {}",
                self.header.num_chromosomes,
                self.index.len()
            ));
        }
        self.exceptions
            .validate(total)
            .map_err(|e| format!("exception table: {e}"))?;
        self.case_mask
            .validate(total)
            .map_err(|e| format!("case mask: {e}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FormatVersion;
    use crate::policy::CasePolicy;
    use crate::runs::Run;
    use anyhow::Result;

    fn sample() -> Catalog {
        let mut index = ChromosomeIndex::new();
        index.register("chr1", 40).unwrap();
        index.register("chr2", 8).unwrap();
        let mut exceptions = ExceptionTable::new();
        exceptions.push(3, b'N');
        exceptions.push(4, b'N');
        exceptions.push(45, b'R');
        let mut mask = CaseMask::new();
        mask.push_run(Run {
            start: 10,
            len: 5,
            value: (),
        });
        Catalog::new(
            FormatHeader::new(CasePolicy::Preserve, 77),
            index,
            exceptions,
            mask,
        )
    }

    #[test]
    fn catalog_roundtrip() -> Result<()> {
        let catalog = sample();
        let mut buf = Vec::new();
        catalog.write_bytes(&mut buf, 3)?;
        let back = Catalog::from_reader(&mut buf.as_slice(), Path::new("mem.idx"))?;
        assert_eq!(back.header, catalog.header);
        assert_eq!(back.index.entries(), catalog.index.entries());
        assert_eq!(back.exceptions, catalog.exceptions);
        assert_eq!(back.case_mask, catalog.case_mask);
        Ok(())
    }

    #[test]
    fn pre_mask_catalog_drops_mask_section() -> Result<()> {
        let mut catalog = sample();
        catalog.header.version = FormatVersion::new(2, 0, 0);
        let mut buf = Vec::new();
        catalog.write_bytes(&mut buf, 3)?;
        let back = Catalog::from_reader(&mut buf.as_slice(), Path::new("old.idx"))?;
        assert!(back.case_mask.is_empty());
        assert_eq!(back.exceptions, catalog.exceptions);
        Ok(())
    }

    #[test]
    fn inconsistent_header_is_corrupt() -> Result<()> {
        let mut catalog = sample();
        catalog.header.total_bases += 1;
        let mut buf = Vec::new();
        catalog.write_bytes(&mut buf, 3)?;
        let err = Catalog::from_reader(&mut buf.as_slice(), Path::new("bad.idx")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CorruptStore);
        assert!(err.to_string().contains("bad.idx"));
        Ok(())
    }

    #[test]
    fn truncated_body_is_corrupt() -> Result<()> {
        let catalog = sample();
        let mut buf = Vec::new();
        catalog.write_bytes(&mut buf, 3)?;
        buf.truncate(SIZE_HEADER + 4);
        let err = Catalog::from_reader(&mut buf.as_slice(), Path::new("cut.idx")).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::CorruptStore);
        Ok(())
    }
}
