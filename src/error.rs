use std::path::PathBuf;

use crate::header::FormatVersion;

/// Custom Result type for seqcache operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the seqcache library, encompassing all possible error cases
/// that can occur while building, persisting, opening, querying or migrating a store.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors raised while consuming a sequence source
    BuildError(#[from] BuildError),
    /// Errors related to format header processing
    HeaderError(#[from] HeaderError),
    /// Errors related to the persisted companion files of a store
    StoreError(#[from] StoreError),
    /// Errors raised by query operations against an opened store
    QueryError(#[from] QueryError),
    /// Errors raised while upgrading a store written by an older format version
    MigrationError(#[from] MigrationError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// Errors from the bitnuc nucleotide processing library
    BitnucError(#[from] bitnuc::NucleotideError),
    /// Errors from opening (possibly compressed) source files
    NifflerError(#[from] niffler::Error),
}

/// Coarse classification of an [`Error`], stable across the nested error enums.
///
/// This is what outer layers (the CLI, pipelines calling into the store) should
/// branch on when deciding how to report or whether to retry a whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedSource,
    DuplicateChromosome,
    EmptySource,
    NotFound,
    CorruptStore,
    OutOfRange,
    InvalidRange,
    IoFailure,
    MigrationFailed,
}

impl Error {
    /// Returns the taxonomy class of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BuildError(e) => match e {
                BuildError::MalformedSource(_) => ErrorKind::MalformedSource,
                BuildError::DuplicateChromosome(_) => ErrorKind::DuplicateChromosome,
                BuildError::EmptySource => ErrorKind::EmptySource,
            },
            Self::HeaderError(_) => ErrorKind::CorruptStore,
            Self::StoreError(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::Io { .. } => ErrorKind::IoFailure,
                StoreError::Corrupt { .. }
                | StoreError::UnsupportedVersion { .. }
                | StoreError::OutdatedFormat { .. } => ErrorKind::CorruptStore,
            },
            Self::QueryError(e) => match e {
                QueryError::UnknownChromosome(_) => ErrorKind::NotFound,
                QueryError::OutOfRange { .. } | QueryError::GlobalOutOfRange { .. } => {
                    ErrorKind::OutOfRange
                }
                QueryError::InvalidRange { .. } => ErrorKind::InvalidRange,
            },
            Self::MigrationError(_) => ErrorKind::MigrationFailed,
            Self::IoError(_) | Self::NifflerError(_) => ErrorKind::IoFailure,
            Self::BitnucError(_) => ErrorKind::MalformedSource,
        }
    }
}

/// Errors that can occur while feeding a sequence source into a store builder
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// The source does not have the expected shape
    ///
    /// # Arguments
    /// * `String` - Description naming the offending file, line or record
    #[error("Malformed source: {0}")]
    MalformedSource(String),

    /// A chromosome name was registered twice
    #[error("Duplicate chromosome: {0}")]
    DuplicateChromosome(String),

    /// `finish` was called before any chromosome was registered
    #[error("Source contained no chromosomes")]
    EmptySource,
}

/// Errors specific to processing and validating format headers
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the header does not match the expected value
    ///
    /// # Arguments
    /// * `u32` - The invalid magic number that was found
    #[error("Invalid magic number: {0:#010x}")]
    InvalidMagicNumber(u32),

    /// The header declares a codec bit width this implementation cannot decode
    #[error("Invalid bits per base: {0}")]
    InvalidBitsPerBase(u8),

    /// The header declares an unknown case policy
    #[error("Invalid case policy: {0}")]
    InvalidCasePolicy(u8),

    /// A version string could not be parsed as `major.minor.patch`
    #[error("Invalid format version: {0:?}")]
    InvalidVersion(String),
}

/// Errors related to the on-disk companion files of a store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Neither a current nor a legacy layout exists under the basename
    #[error("No sequence store found at basename {}", .0.display())]
    NotFound(PathBuf),

    /// A companion file failed validation
    ///
    /// # Fields
    /// * `path` - The file that failed validation
    /// * `reason` - What was wrong with it
    #[error("Corrupt store file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The store was written by a newer format version than this build understands
    #[error("Store file {} was written by format {found}, newest supported is {supported}", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: FormatVersion,
        supported: FormatVersion,
    },

    /// The store requires migration but automatic migration was disabled
    #[error("Store {} uses format {found}, at least {minimum} is required (run `seqcache upgrade`)", basename.display())]
    OutdatedFormat {
        basename: PathBuf,
        found: FormatVersion,
        minimum: FormatVersion,
    },

    /// An underlying filesystem error, naming the file involved
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
impl StoreError {
    pub(crate) fn corrupt<P: Into<PathBuf>, S: ToString>(path: P, reason: S) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur while querying an opened store
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// The chromosome name is not part of the store
    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    /// A point query fell outside of the chromosome
    #[error("Position {position} is out of range for chromosome {name} (length {length})")]
    OutOfRange {
        name: String,
        position: u64,
        length: u64,
    },

    /// A range query had inverted or out-of-bounds coordinates
    #[error("Invalid range {start}..{end} for chromosome {name} (length {length})")]
    InvalidRange {
        name: String,
        start: u64,
        end: u64,
        length: u64,
    },

    /// A global coordinate fell outside of the store
    #[error("Global position {position} is out of range (store length {total})")]
    GlobalOutOfRange { position: u64, total: u64 },
}

/// Errors raised while migrating a store to the current format
#[derive(thiserror::Error, Debug)]
pub enum MigrationError {
    /// The migration did not complete; the store is left in its original state
    #[error("Migration of {} from format {from} failed: {source}", basename.display())]
    Failed {
        basename: PathBuf,
        from: FormatVersion,
        #[source]
        source: Box<Error>,
    },
}
