use crate::{access::SequenceAccess, catalog::Catalog, header::FormatHeader};

/// A complete store held in memory
///
/// Produced by [`StoreBuilder::finish`](crate::StoreBuilder::finish) and consumed by
/// [`StoreWriter`](crate::StoreWriter). It answers the same queries as an opened
/// [`StoreReader`](crate::StoreReader), which is handy for tests and for pipelines
/// that build and query in one process.
#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) catalog: Catalog,
    pub(crate) payload: Vec<u64>,
}
impl Store {
    pub(crate) fn new(catalog: Catalog, payload: Vec<u64>) -> Self {
        Self { catalog, payload }
    }

    #[must_use]
    pub fn header(&self) -> &FormatHeader {
        &self.catalog.header
    }

    /// Packed payload words, 32 bases per word
    #[must_use]
    pub fn payload(&self) -> &[u64] {
        &self.payload
    }
}

impl SequenceAccess for Store {
    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn word(&self, index: usize) -> u64 {
        self.payload[index]
    }
}
