//! # seqcache
//!
//! Random-access, two-bit packed reference genome storage.
//!
//! A FASTA (optionally gzipped) or pre-packed `.seqpack` source is turned into a
//! store of two companion files under a common basename:
//!
//! * `{basename}.{store_id}.seq` holds the packed bases, 32 per little-endian `u64`
//! * `{basename}.idx` holds the format header, the chromosome index, and run-length
//!   tables for non-canonical symbols and soft-masked stretches
//!
//! Opened stores are memory mapped and answer base, range and reverse-complement
//! queries by chromosome name through [`SequenceAccess`]. Stores written by older
//! format versions (including the three-file legacy layout) are upgraded by the
//! [`Migrator`], either explicitly or automatically when opened.
//!
//! ```no_run
//! use seqcache::{FastaSource, SequenceAccess, StoreBuilder, StoreConfig, StoreReader, StoreWriter};
//!
//! # fn main() -> seqcache::Result<()> {
//! let config = StoreConfig::default();
//! let mut builder = StoreBuilder::begin(config);
//! for event in FastaSource::from_path("genome.fa.gz", config.chunk_size)? {
//!     builder.feed_event(event?)?;
//! }
//! StoreWriter::new(config).write(&builder.finish()?, "genome")?;
//!
//! let store = StoreReader::open("genome")?;
//! let window = store.range("chr1", 10_000, 10_100)?;
//! # Ok(())
//! # }
//! ```

mod access;
mod builder;
mod catalog;
pub mod codec;
mod config;
mod error;
mod header;
mod index;
pub mod legacy;
mod migrate;
mod policy;
mod reader;
mod runs;
pub mod source;
mod store;
mod writer;

pub use access::SequenceAccess;
pub use builder::StoreBuilder;
pub use catalog::Catalog;
pub use config::{
    StoreConfig, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL, DEFAULT_CONTAINER_CHUNK_BASES,
};
pub use error::{
    BuildError, Error, ErrorKind, HeaderError, MigrationError, QueryError, Result, StoreError,
};
pub use header::{FormatHeader, FormatVersion, CURRENT_VERSION, MINIMUM_SUPPORTED_VERSION};
pub use index::{ChromosomeEntry, ChromosomeIndex};
pub use migrate::{
    detect_version, pending_migrations, Migration, MigrationOutcome, Migrator, Staged,
    FORMAT_MIGRATIONS,
};
pub use policy::CasePolicy;
pub use reader::StoreReader;
pub use runs::{CaseMask, ExceptionTable, Run, RunTable};
pub use source::{ContainerReader, ContainerWriter, FastaSource, PackedRecord, SourceEvent};
pub use store::Store;
pub use writer::{index_path, payload_path, PayloadHeader, StagedWrite, StoreWriter};
