use crate::policy::CasePolicy;

/// Default upper bound on the bytes of sequence text per FASTA chunk
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default number of bases per pre-packed container record
pub const DEFAULT_CONTAINER_CHUNK_BASES: u64 = 1 << 22;

/// Default zstd level for index and container bodies
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Settings shared by the builder, writer, reader and migrator
///
/// There is no global configuration: each component receives the config it
/// should honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// How lowercase symbols are stored
    pub case_policy: CasePolicy,
    /// Maximum bytes of sequence text in one FASTA chunk
    pub chunk_size: usize,
    /// Maximum bases in one exported container record
    pub container_chunk_bases: u64,
    /// zstd level for compressed sections
    pub compression_level: i32,
    /// Whether opening an outdated store migrates it in place
    pub auto_migrate: bool,
}
impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            case_policy: CasePolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            container_chunk_bases: DEFAULT_CONTAINER_CHUNK_BASES,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            auto_migrate: true,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    #[must_use]
    pub fn case_policy(mut self, case_policy: CasePolicy) -> Self {
        self.case_policy = case_policy;
        self
    }
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
    #[must_use]
    pub fn container_chunk_bases(mut self, bases: u64) -> Self {
        self.container_chunk_bases = bases.max(1);
        self
    }
    #[must_use]
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }
    #[must_use]
    pub fn auto_migrate(mut self, auto_migrate: bool) -> Self {
        self.auto_migrate = auto_migrate;
        self
    }
}
