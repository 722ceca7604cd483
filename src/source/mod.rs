//! Sequence sources
//!
//! Two source shapes feed a [`StoreBuilder`](crate::StoreBuilder):
//!
//! * [`FastaSource`]: a lazy stream of [`SourceEvent`]s read from FASTA text,
//!   transparently decompressed when gzipped.
//! * [`ContainerReader`]: records that are already packed, as written by
//!   [`SequenceAccess::export_container`](crate::SequenceAccess::export_container).

mod container;
mod fasta;

pub use container::{ContainerReader, ContainerWriter, PackedRecord, CONTAINER_EXTENSION};
pub use fasta::FastaSource;

/// One step of a textual sequence source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Starts a new chromosome
    Header(String),
    /// A bounded chunk of sequence for the current chromosome, line breaks removed
    Sequence(Vec<u8>),
}
