//! Store builder
//!
//! Consumes a sequence source chunk by chunk and produces an in-memory [`Store`].
//! Only the packed payload and the side tables grow with the input; the source
//! itself is never materialized, so a FASTA reader can stream multi-gigabase
//! genomes through [`StoreBuilder::feed_event`].

use tracing::{debug, info};

use crate::{
    catalog::Catalog,
    codec::{self, unpack_word, Encoded, Packer, BASES_PER_WORD},
    config::StoreConfig,
    error::{BuildError, Result},
    header::FormatHeader,
    index::ChromosomeIndex,
    runs::{CaseMask, ExceptionTable},
    source::{PackedRecord, SourceEvent},
    store::Store,
};

/// Incrementally builds a [`Store`]
///
/// Chunks for one chromosome must be fed in sequence order; chromosomes are
/// indexed in the order they are started.
#[derive(Debug)]
pub struct StoreBuilder {
    config: StoreConfig,
    index: ChromosomeIndex,
    packer: Packer,
    exceptions: ExceptionTable,
    case_mask: CaseMask,
    /// Chromosome currently receiving bases
    current: Option<String>,
    /// Global offset of the current chromosome
    current_start: u64,
}
impl StoreBuilder {
    /// Starts an empty build
    #[must_use]
    pub fn begin(config: StoreConfig) -> Self {
        Self {
            config,
            index: ChromosomeIndex::new(),
            packer: Packer::new(),
            exceptions: ExceptionTable::new(),
            case_mask: CaseMask::new(),
            current: None,
            current_start: 0,
        }
    }

    /// Closes the current chromosome (if any) and starts a new one
    ///
    /// # Errors
    ///
    /// * [`BuildError::DuplicateChromosome`] if `name` was started before
    /// * [`BuildError::MalformedSource`] if `name` is empty or longer than 65535 bytes
    pub fn start_chromosome(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(BuildError::MalformedSource("empty chromosome name".to_string()).into());
        }
        if name.len() > u16::MAX as usize {
            return Err(BuildError::MalformedSource(format!(
                "chromosome name of {} bytes exceeds {} bytes",
                name.len(),
                u16::MAX
            ))
            .into());
        }
        self.close_current()?;
        if self.index.contains(name) {
            return Err(BuildError::DuplicateChromosome(name.to_string()).into());
        }
        self.current = Some(name.to_string());
        self.current_start = self.packer.len();
        Ok(())
    }

    /// Appends sequence symbols to the current chromosome
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MalformedSource`] if no chromosome has been started.
    pub fn push_sequence(&mut self, chunk: &[u8]) -> Result<()> {
        if self.current.is_none() {
            return Err(BuildError::MalformedSource(
                "sequence data before any chromosome header".to_string(),
            )
            .into());
        }
        chunk
            .iter()
            .try_for_each(|&symbol| self.push_symbol(symbol))
    }

    /// Appends `chunk` to chromosome `name`, starting it if it is not the current one
    pub fn feed(&mut self, name: &str, chunk: &[u8]) -> Result<()> {
        if self.current.as_deref() != Some(name) {
            self.start_chromosome(name)?;
        }
        self.push_sequence(chunk)
    }

    /// Applies one event of a textual source
    pub fn feed_event(&mut self, event: SourceEvent) -> Result<()> {
        match event {
            SourceEvent::Header(name) => self.start_chromosome(&name),
            SourceEvent::Sequence(chunk) => self.push_sequence(&chunk),
        }
    }

    /// Appends a pre-packed record to chromosome `record.name`
    ///
    /// Consecutive records with the same name continue one chromosome. Records
    /// without side tables are copied word by word; otherwise each base goes through
    /// the same exception and case-mask path as textual input.
    pub fn feed_packed(&mut self, record: &PackedRecord) -> Result<()> {
        record.validate().map_err(|reason| {
            BuildError::MalformedSource(format!("record {}: {reason}", record.name))
        })?;
        if self.current.as_deref() != Some(record.name.as_str()) {
            self.start_chromosome(&record.name)?;
        }

        if record.exceptions.is_empty() && record.case_mask.is_empty() {
            return self.packer.extend_words(&record.words, record.len);
        }

        let mut scratch = Vec::with_capacity(BASES_PER_WORD);
        for (i, &word) in record.words.iter().enumerate() {
            let first = (i * BASES_PER_WORD) as u64;
            if first >= record.len {
                break;
            }
            let n = (record.len - first).min(BASES_PER_WORD as u64) as usize;
            unpack_word(word, n, &mut scratch)?;
            for (j, &base) in scratch.iter().enumerate() {
                let rel = first + j as u64;
                let symbol = match record.exceptions.get(rel) {
                    Some(symbol) => symbol,
                    None if record.case_mask.contains(rel) => base.to_ascii_lowercase(),
                    None => base,
                };
                self.push_symbol(symbol)?;
            }
        }
        Ok(())
    }

    /// Number of bases fed so far
    #[must_use]
    pub fn num_bases(&self) -> u64 {
        self.packer.len()
    }

    /// Completes the build
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::EmptySource`] if no chromosome was ever started.
    pub fn finish(mut self) -> Result<Store> {
        self.close_current()?;
        if self.index.is_empty() {
            return Err(BuildError::EmptySource.into());
        }
        let (payload, n_bases) = self.packer.finish()?;
        debug_assert_eq!(n_bases, self.index.total_len());

        let header = FormatHeader::new(self.config.case_policy, rand::random());
        let catalog = Catalog::new(header, self.index, self.exceptions, self.case_mask);
        info!(
            chromosomes = catalog.index.len(),
            bases = n_bases,
            exception_runs = catalog.exceptions.len(),
            mask_runs = catalog.case_mask.len(),
            "finished building store"
        );
        Ok(Store::new(catalog, payload))
    }

    fn close_current(&mut self) -> Result<()> {
        if let Some(name) = self.current.take() {
            let length = self.packer.len() - self.current_start;
            let offset = self.index.register(&name, length)?;
            debug!(chromosome = %name, offset, length, "registered chromosome");
        }
        Ok(())
    }

    fn push_symbol(&mut self, symbol: u8) -> Result<()> {
        let position = self.packer.len();
        match codec::encode(symbol, self.config.case_policy) {
            Encoded::Canonical { code, lowercase } => {
                if lowercase {
                    self.case_mask.push(position, ());
                }
                self.packer.push_code(code)
            }
            Encoded::Exception(symbol) => {
                self.exceptions.push(position, symbol);
                self.packer.push_code(codec::FILLER_CODE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{access::SequenceAccess, error::ErrorKind, policy::CasePolicy};
    use anyhow::Result;

    fn build(records: &[(&str, &[u8])], config: StoreConfig) -> crate::Result<Store> {
        let mut builder = StoreBuilder::begin(config);
        for (name, seq) in records {
            for chunk in seq.chunks(3) {
                builder.feed(name, chunk)?;
            }
            if seq.is_empty() {
                builder.start_chromosome(name)?;
            }
        }
        builder.finish()
    }

    #[test]
    fn chunked_feed_matches_source() -> Result<()> {
        let store = build(
            &[("chr1", b"ACGTN"), ("chr2", b"TTTT")],
            StoreConfig::default(),
        )?;
        assert_eq!(store.chromosome_names(), vec!["chr1", "chr2"]);
        assert_eq!(store.range("chr1", 0, 5)?, b"ACGTN");
        assert_eq!(store.range("chr2", 0, 4)?, b"TTTT");
        assert_eq!(store.catalog().exceptions.len(), 1);
        Ok(())
    }

    #[test]
    fn sequence_before_header_is_malformed() {
        let mut builder = StoreBuilder::begin(StoreConfig::default());
        let err = builder.push_sequence(b"ACGT").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSource);
    }

    #[test]
    fn finishing_without_chromosomes_is_empty_source() {
        let err = StoreBuilder::begin(StoreConfig::default())
            .finish()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptySource);
    }

    #[test]
    fn restarting_a_chromosome_is_a_duplicate() -> Result<()> {
        let mut builder = StoreBuilder::begin(StoreConfig::default());
        builder.feed("chr1", b"AC")?;
        builder.feed("chr2", b"GT")?;
        let err = builder.feed("chr1", b"AA").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateChromosome);
        Ok(())
    }

    #[test]
    fn empty_chromosomes_are_indexed() -> Result<()> {
        let store = build(
            &[("a", b"AC"), ("empty", b""), ("b", b"GT")],
            StoreConfig::default(),
        )?;
        assert_eq!(store.length("empty")?, 0);
        assert_eq!(store.chromosome("b")?.offset, 2);
        assert_eq!(store.range("empty", 0, 0)?, b"");
        Ok(())
    }

    #[test]
    fn fold_policy_uppercases() -> Result<()> {
        let store = build(&[("c", b"acgTnN")], StoreConfig::default())?;
        assert_eq!(store.range("c", 0, 6)?, b"ACGTNN");
        assert!(store.catalog().case_mask.is_empty());
        Ok(())
    }

    #[test]
    fn preserve_policy_keeps_soft_masking() -> Result<()> {
        let config = StoreConfig::default().case_policy(CasePolicy::Preserve);
        let store = build(&[("c", b"ACgtacNnGT")], config)?;
        assert_eq!(store.range("c", 0, 10)?, b"ACgtacNnGT");
        assert_eq!(store.catalog().case_mask.len(), 1);
        assert_eq!(store.header().case_policy, CasePolicy::Preserve);
        Ok(())
    }

    #[test]
    fn packed_records_continue_a_chromosome() -> Result<()> {
        let original = build(
            &[("x", b"ACGTACGTNNNNacgtRYACGTACGTACGTACGTAC"), ("y", b"GG")],
            StoreConfig::default().case_policy(CasePolicy::Preserve),
        )?;
        let mut container = crate::source::ContainerWriter::new(Vec::new(), 3)?;
        original.export_container(&mut container, 7)?;
        let bytes = container.finish()?;

        let mut builder =
            StoreBuilder::begin(StoreConfig::default().case_policy(CasePolicy::Preserve));
        for record in crate::source::ContainerReader::new(bytes.as_slice())? {
            builder.feed_packed(&record?)?;
        }
        let rebuilt = builder.finish()?;
        assert_eq!(rebuilt.chromosome_names(), original.chromosome_names());
        for name in original.chromosome_names() {
            let len = original.length(name)?;
            assert_eq!(rebuilt.range(name, 0, len)?, original.range(name, 0, len)?);
        }
        Ok(())
    }

    #[test]
    fn malformed_packed_record_is_rejected() {
        let record = PackedRecord {
            name: "short".to_string(),
            len: 40,
            words: vec![0],
            exceptions: ExceptionTable::new(),
            case_mask: CaseMask::new(),
        };
        let mut builder = StoreBuilder::begin(StoreConfig::default());
        let err = builder.feed_packed(&record).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSource);
        assert!(err.to_string().contains("short"));
    }
}
