//! Header module for the seqcache library
//!
//! The format header is the first thing written to (and read from) a store's index
//! file. It carries the format version, which the reader compares against
//! [`MINIMUM_SUPPORTED_VERSION`] before anything else is parsed, the codec
//! parameters, and the counts needed to validate the rest of the index file and
//! the payload file.

use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    codec::BITS_PER_BASE,
    error::{HeaderError, Result},
    policy::CasePolicy,
};

/// Magic number of the index file: "SQCI" in ASCII (little-endian byte order)
#[allow(clippy::unreadable_literal)]
pub const MAGIC: u32 = 0x49435153;

/// Size of the header in bytes
pub const SIZE_HEADER: usize = 64;

/// Reserved bytes in the header
pub const RESERVED: [u8; 16] = [42; 16];

/// Format version written by this build
pub const CURRENT_VERSION: FormatVersion = FormatVersion::new(2, 1, 0);

/// Oldest format version that can be opened without migration
pub const MINIMUM_SUPPORTED_VERSION: FormatVersion = FormatVersion::new(2, 1, 0);

/// First version whose index file carries a case-mask section
pub(crate) const CASE_MASK_VERSION: FormatVersion = FormatVersion::new(2, 1, 0);

/// First version whose payload file name carries the store id
pub(crate) const GENERATION_PAYLOAD_VERSION: FormatVersion = FormatVersion::new(2, 1, 0);

/// A `major.minor.patch` format version
///
/// Versions are totally ordered field by field, which is what the migration table
/// relies on for its "older than" checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}
impl FormatVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Reads the three little-endian `u16` components from a 6-byte slice
    #[must_use]
    pub fn from_bytes(buffer: &[u8]) -> Self {
        Self {
            major: LittleEndian::read_u16(&buffer[0..2]),
            minor: LittleEndian::read_u16(&buffer[2..4]),
            patch: LittleEndian::read_u16(&buffer[4..6]),
        }
    }

    /// Writes the three components into a 6-byte slice
    pub fn write_into(&self, buffer: &mut [u8]) {
        LittleEndian::write_u16(&mut buffer[0..2], self.major);
        LittleEndian::write_u16(&mut buffer[2..4], self.minor);
        LittleEndian::write_u16(&mut buffer[4..6], self.patch);
    }
}
impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
impl FromStr for FormatVersion {
    type Err = HeaderError;

    /// Parses `major.minor.patch`; missing trailing components default to zero
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || HeaderError::InvalidVersion(s.to_string());
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> std::result::Result<u16, HeaderError> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let version = Self::new(next(true)?, next(false)?, next(false)?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

/// Header structure of the index file
///
/// The header has a fixed 64-byte little-endian layout:
///
/// | Offset | Size | Name          | Description                              |
/// | ------ | ---- | ------------- | ---------------------------------------- |
/// | 0      | 4    | magic         | `SQCI`                                   |
/// | 4      | 6    | version       | major, minor, patch (`u16` each)         |
/// | 10     | 1    | bits          | bits per packed base (2)                 |
/// | 11     | 1    | case policy   | 0 = fold, 1 = preserve                   |
/// | 12     | 8    | total bases   | sum of all chromosome lengths            |
/// | 20     | 4    | chromosomes   | number of index entries                  |
/// | 24     | 8    | store id      | generation shared with the payload file  |
/// | 32     | 8    | exceptions    | number of exception runs                 |
/// | 40     | 8    | mask runs     | number of case-mask runs (2.1.0+)        |
/// | 48     | 16   | reserved      |                                          |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub magic: u32,
    pub version: FormatVersion,
    pub bits: u8,
    pub case_policy: CasePolicy,
    pub total_bases: u64,
    pub num_chromosomes: u32,
    /// Random generation identifier, repeated in the payload file header
    pub store_id: u64,
    pub num_exception_runs: u64,
    pub num_mask_runs: u64,
    pub reserved: [u8; 16],
}
impl FormatHeader {
    /// Creates a current-version header with zeroed counts
    #[must_use]
    pub fn new(case_policy: CasePolicy, store_id: u64) -> Self {
        Self {
            magic: MAGIC,
            version: CURRENT_VERSION,
            bits: BITS_PER_BASE,
            case_policy,
            total_bases: 0,
            num_chromosomes: 0,
            store_id,
            num_exception_runs: 0,
            num_mask_runs: 0,
            reserved: RESERVED,
        }
    }

    /// Whether this header predates [`MINIMUM_SUPPORTED_VERSION`]
    #[must_use]
    pub fn needs_migration(&self) -> bool {
        self.version < MINIMUM_SUPPORTED_VERSION
    }

    /// Reads only the version of a header buffer, after checking the magic number
    ///
    /// Used before migration, when the rest of the header may follow an older layout.
    pub fn peek_version(buffer: &[u8; SIZE_HEADER]) -> Result<FormatVersion> {
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagicNumber(magic).into());
        }
        Ok(FormatVersion::from_bytes(&buffer[4..10]))
    }

    /// Parses a header from a fixed-size byte array
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The magic number is incorrect
    /// * The bit width is not 2
    /// * The case policy byte is unknown
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let version = Self::peek_version(buffer)?;
        let bits = buffer[10];
        if bits != BITS_PER_BASE {
            return Err(HeaderError::InvalidBitsPerBase(bits).into());
        }
        let case_policy = CasePolicy::from_byte(buffer[11])?;
        let num_mask_runs = if version < CASE_MASK_VERSION {
            0
        } else {
            LittleEndian::read_u64(&buffer[40..48])
        };
        let mut reserved = [0; 16];
        reserved.copy_from_slice(&buffer[48..64]);
        Ok(Self {
            magic: MAGIC,
            version,
            bits,
            case_policy,
            total_bases: LittleEndian::read_u64(&buffer[12..20]),
            num_chromosomes: LittleEndian::read_u32(&buffer[20..24]),
            store_id: LittleEndian::read_u64(&buffer[24..32]),
            num_exception_runs: LittleEndian::read_u64(&buffer[32..40]),
            num_mask_runs,
            reserved,
        })
    }

    /// Serializes the header into its 64-byte representation
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIZE_HEADER] {
        let mut buffer = [0u8; SIZE_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], self.magic);
        self.version.write_into(&mut buffer[4..10]);
        buffer[10] = self.bits;
        buffer[11] = self.case_policy.as_byte();
        LittleEndian::write_u64(&mut buffer[12..20], self.total_bases);
        LittleEndian::write_u32(&mut buffer[20..24], self.num_chromosomes);
        LittleEndian::write_u64(&mut buffer[24..32], self.store_id);
        LittleEndian::write_u64(&mut buffer[32..40], self.num_exception_runs);
        if self.version < CASE_MASK_VERSION {
            buffer[40..48].copy_from_slice(&RESERVED[..8]);
        } else {
            LittleEndian::write_u64(&mut buffer[40..48], self.num_mask_runs);
        }
        buffer[48..64].copy_from_slice(&self.reserved);
        buffer
    }

    /// Writes the header to a writer
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads a header from a reader
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buffer)?;
        Self::from_bytes(&buffer)
    }
}
