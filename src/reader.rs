//! Opening persisted stores
//!
//! [`StoreReader`] memory-maps the payload file and keeps the decoded catalog in
//! memory. Opening validates everything that ties the two companion files
//! together, so a successfully opened reader never observes a torn store.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use memmap2::Mmap;
use tracing::{debug, info};

use crate::{
    access::SequenceAccess,
    catalog::Catalog,
    codec::words_for,
    config::StoreConfig,
    error::{Result, StoreError},
    header::{FormatHeader, CURRENT_VERSION, MINIMUM_SUPPORTED_VERSION},
    migrate::{detect_version, Migrator},
    writer::{index_path, payload_path, PayloadHeader, SIZE_PAYLOAD_HEADER},
};

/// A read-only handle on a persisted store
///
/// Cloning is cheap: clones share the catalog and the payload mapping. The handle
/// is `Send + Sync` and every query takes `&self`.
#[derive(Debug, Clone)]
pub struct StoreReader {
    basename: PathBuf,
    catalog: Arc<Catalog>,
    /// Memory mapped payload file
    mmap: Arc<Mmap>,
}
impl StoreReader {
    /// Opens the store under `basename` with the default configuration
    pub fn open<P: AsRef<Path>>(basename: P) -> Result<Self> {
        Self::open_with(basename, StoreConfig::default())
    }

    /// Opens the store under `basename`, migrating it first if it is outdated and
    /// `config.auto_migrate` is set
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] if neither a current nor a legacy store exists
    /// * [`StoreError::OutdatedFormat`] if migration is needed but disabled
    /// * [`StoreError::UnsupportedVersion`] if the store is newer than this build
    /// * [`StoreError::Corrupt`] if the companion files are inconsistent
    pub fn open_with<P: AsRef<Path>>(basename: P, config: StoreConfig) -> Result<Self> {
        let basename = basename.as_ref();
        let version = detect_version(basename)?;
        if version > CURRENT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                path: index_path(basename),
                found: version,
                supported: CURRENT_VERSION,
            }
            .into());
        }
        if version < MINIMUM_SUPPORTED_VERSION {
            if !config.auto_migrate {
                return Err(StoreError::OutdatedFormat {
                    basename: basename.to_path_buf(),
                    found: version,
                    minimum: MINIMUM_SUPPORTED_VERSION,
                }
                .into());
            }
            info!(basename = %basename.display(), found = %version, "store is outdated, migrating");
            Migrator::new(config).migrate(basename)?;
        }
        Self::open_current(basename)
    }

    fn open_current(basename: &Path) -> Result<Self> {
        let ipath = index_path(basename);
        let file = File::open(&ipath).map_err(|e| StoreError::io(&ipath, e))?;
        let catalog = Catalog::from_reader(&mut BufReader::new(file), &ipath)?;

        let ppath = payload_path(basename, &catalog.header);
        let file = match File::open(&ppath) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::corrupt(&ppath, "payload file is missing").into());
            }
            Err(e) => return Err(StoreError::io(&ppath, e).into()),
        };
        // Safety: the payload is only ever replaced by rename, never written in place
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| StoreError::io(&ppath, e))?;
        validate_payload(&mmap, &catalog).map_err(|reason| StoreError::corrupt(&ppath, reason))?;

        debug!(
            basename = %basename.display(),
            chromosomes = catalog.index.len(),
            bases = catalog.index.total_len(),
            "opened store"
        );
        Ok(Self {
            basename: basename.to_path_buf(),
            catalog: Arc::new(catalog),
            mmap: Arc::new(mmap),
        })
    }

    #[must_use]
    pub fn basename(&self) -> &Path {
        &self.basename
    }

    #[must_use]
    pub fn header(&self) -> &FormatHeader {
        &self.catalog.header
    }

    /// Payload file this handle has mapped
    #[must_use]
    pub fn payload_path(&self) -> PathBuf {
        payload_path(&self.basename, &self.catalog.header)
    }

    fn words(&self) -> &[u64] {
        bytemuck::cast_slice(&self.mmap[SIZE_PAYLOAD_HEADER..])
    }
}

impl SequenceAccess for StoreReader {
    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn word(&self, index: usize) -> u64 {
        u64::from_le(self.words()[index])
    }
}

fn validate_payload(mmap: &[u8], catalog: &Catalog) -> std::result::Result<(), String> {
    let header = PayloadHeader::from_bytes(mmap)?;
    if header.store_id != catalog.header.store_id {
        return Err(format!(
            "payload belongs to store {:#018x}, index expects {:#018x}",
            header.store_id, catalog.header.store_id
        ));
    }
    let total = catalog.index.total_len();
    if header.n_bases != total || header.n_words != words_for(total) {
        return Err(format!(
            "payload holds {} bases in {} words, index expects {total} bases",
            header.n_bases, header.n_words
        ));
    }
    let expected = SIZE_PAYLOAD_HEADER as u64 + header.n_words * 8;
    if mmap.len() as u64 != expected {
        return Err(format!(
            "payload is {} bytes, expected {expected}",
            mmap.len()
        ));
    }
    Ok(())
}
