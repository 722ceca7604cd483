//! Query surface shared by in-memory and persisted stores
//!
//! Downstream analyses only ever see a store through [`SequenceAccess`]. An
//! implementor provides the [`Catalog`] and word-level access to the packed
//! payload; every query is a provided method on top of those two.

use std::io::Write;

use crate::{
    catalog::Catalog,
    codec::{self, unpack_word, Encoded, BASES_PER_WORD},
    error::{QueryError, Result},
    index::ChromosomeEntry,
    policy::CasePolicy,
    source::{ContainerWriter, PackedRecord},
};

/// Random access to the chromosomes of a store
///
/// All methods take `&self` and never mutate shared state, so a single handle can
/// be queried from many threads at once when the implementor is `Sync`.
pub trait SequenceAccess {
    /// The store's header, chromosome index and side tables
    fn catalog(&self) -> &Catalog;

    /// Payload word at `index`
    fn word(&self, index: usize) -> u64;

    /// Chromosome names in index (offset) order
    fn chromosome_names(&self) -> Vec<&str> {
        self.catalog().index.names().collect()
    }

    fn num_chromosomes(&self) -> usize {
        self.catalog().index.len()
    }

    /// Total number of bases across all chromosomes
    fn total_len(&self) -> u64 {
        self.catalog().index.total_len()
    }

    fn chromosome(&self, name: &str) -> Result<&ChromosomeEntry> {
        self.catalog().index.lookup(name)
    }

    /// Length of chromosome `name`
    fn length(&self, name: &str) -> Result<u64> {
        self.chromosome(name).map(|entry| entry.length)
    }

    /// Resolves a global coordinate into `(chromosome, local position)`
    fn locate(&self, position: u64) -> Result<(&str, u64)> {
        self.catalog().index.locate(position)
    }

    /// Symbol at `position` of chromosome `name`
    fn base(&self, name: &str, position: u64) -> Result<u8> {
        let entry = self.chromosome(name)?;
        if position >= entry.length {
            return Err(QueryError::OutOfRange {
                name: name.to_string(),
                position,
                length: entry.length,
            }
            .into());
        }
        let global = entry.offset + position;
        let catalog = self.catalog();
        if let Some(symbol) = catalog.exceptions.get(global) {
            return Ok(symbol);
        }
        let mut scratch = Vec::with_capacity(BASES_PER_WORD);
        let in_word = (global % BASES_PER_WORD as u64) as usize;
        unpack_word(self.word(word_index(global)), in_word + 1, &mut scratch)?;
        let base = scratch[in_word];
        if catalog.case_mask.contains(global) {
            Ok(base.to_ascii_lowercase())
        } else {
            Ok(base)
        }
    }

    /// Symbols of `name` in `start..end`
    fn range(&self, name: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.range_into(name, start, end, &mut out)?;
        Ok(out)
    }

    /// Appends the symbols of `name` in `start..end` to `out`
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] unless `start <= end <= length`.
    fn range_into(&self, name: &str, start: u64, end: u64, out: &mut Vec<u8>) -> Result<()> {
        let entry = self.chromosome(name)?;
        if start > end || end > entry.length {
            return Err(QueryError::InvalidRange {
                name: name.to_string(),
                start,
                end,
                length: entry.length,
            }
            .into());
        }
        decode_global(self, entry.offset + start, entry.offset + end, out)
    }

    /// Reverse complement of `name` in `start..end`
    ///
    /// Canonical bases are complemented; exception symbols keep their value and
    /// only their position is mirrored.
    fn reverse_complement(&self, name: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut sequence = self.range(name, start, end)?;
        sequence.reverse();
        sequence.iter_mut().for_each(|b| *b = codec::complement(*b));
        Ok(sequence)
    }

    /// Writes every chromosome as pre-packed container records
    ///
    /// Chromosomes longer than `chunk_bases` are split into consecutive records
    /// sharing the chromosome name; empty chromosomes produce one empty record.
    fn export_container<W: Write>(
        &self,
        writer: &mut ContainerWriter<W>,
        chunk_bases: u64,
    ) -> Result<()>
    where
        Self: Sized,
    {
        let chunk_bases = chunk_bases.max(1);
        let catalog = self.catalog();
        let mut bases = Vec::new();
        let mut codes = Vec::new();
        for entry in catalog.index.entries() {
            let mut local = 0;
            loop {
                let len = (entry.length - local).min(chunk_bases);
                let start = entry.offset + local;
                let end = start + len;

                bases.clear();
                unpack_raw(self, start, end, &mut bases)?;
                codes.clear();
                codes.extend(bases.iter().map(|&b| match codec::encode(b, CasePolicy::Fold) {
                    Encoded::Canonical { code, .. } => code,
                    Encoded::Exception(_) => codec::FILLER_CODE,
                }));
                writer.write_record(&PackedRecord {
                    name: entry.name.clone(),
                    len,
                    words: codec::pack_codes(&codes)?,
                    exceptions: catalog.exceptions.slice(start, end),
                    case_mask: catalog.case_mask.slice(start, end),
                })?;

                local += len;
                if local >= entry.length {
                    break;
                }
            }
        }
        Ok(())
    }
}

fn word_index(position: u64) -> usize {
    (position / BASES_PER_WORD as u64) as usize
}

/// Appends the packed bases of global positions `start..end`, ignoring side tables
fn unpack_raw<S: SequenceAccess + ?Sized>(
    store: &S,
    start: u64,
    end: u64,
    out: &mut Vec<u8>,
) -> Result<()> {
    let mut scratch = Vec::with_capacity(BASES_PER_WORD);
    let mut pos = start;
    while pos < end {
        let in_word = (pos % BASES_PER_WORD as u64) as usize;
        let take = ((end - pos) as usize).min(BASES_PER_WORD - in_word);
        unpack_word(store.word(word_index(pos)), in_word + take, &mut scratch)?;
        out.extend_from_slice(&scratch[in_word..]);
        pos += take as u64;
    }
    Ok(())
}

/// Appends the symbols of global positions `start..end` with the case mask and
/// exception table applied
fn decode_global<S: SequenceAccess + ?Sized>(
    store: &S,
    start: u64,
    end: u64,
    out: &mut Vec<u8>,
) -> Result<()> {
    let origin = out.len();
    out.reserve((end - start) as usize);
    unpack_raw(store, start, end, out)?;

    let catalog = store.catalog();
    let region = &mut out[origin..];
    let clip = |run_start: u64, run_end: u64| {
        let lo = (run_start.max(start) - start) as usize;
        let hi = (run_end.min(end) - start) as usize;
        lo..hi
    };
    for run in catalog.case_mask.overlapping(start, end) {
        region[clip(run.start, run.end())].make_ascii_lowercase();
    }
    for run in catalog.exceptions.overlapping(start, end) {
        region[clip(run.start, run.end())].fill(run.value);
    }
    Ok(())
}
