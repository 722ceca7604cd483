//! Format migrations
//!
//! Each entry of [`FORMAT_MIGRATIONS`] upgrades stores older than its threshold
//! version. Migrating a store runs every pending entry in order on an in-memory
//! staging value and commits once at the end, so a failure at any step leaves the
//! files under the basename exactly as they were.

use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::Path,
};

use tracing::{info, warn};

use crate::{
    builder::StoreBuilder,
    catalog::Catalog,
    config::StoreConfig,
    error::{MigrationError, Result, StoreError},
    header::{
        FormatHeader, FormatVersion, CASE_MASK_VERSION, CURRENT_VERSION, MINIMUM_SUPPORTED_VERSION,
        SIZE_HEADER,
    },
    legacy::{self, LegacyStore},
    policy::CasePolicy,
    runs::CaseMask,
    store::Store,
    writer::{index_path, payload_path, StoreWriter},
};

/// In-memory state of a store while migrations are applied
#[derive(Debug)]
pub enum Staged {
    /// Three-file layout as loaded from disk
    Legacy(LegacyStore),
    /// A complete store that must be written from scratch
    Rebuilt(Store),
    /// An index that must be rewritten next to an untouched payload
    Catalog(Catalog),
}

/// One step of the migration table
pub struct Migration {
    /// Stores older than this version need the step
    pub threshold: FormatVersion,
    pub description: &'static str,
    pub apply: fn(Staged, &StoreConfig) -> Result<Staged>,
}

/// Ordered migration table
pub static FORMAT_MIGRATIONS: &[Migration] = &[
    Migration {
        threshold: FormatVersion::new(1, 9, 6),
        description: "index legacy layout",
        apply: index_legacy_layout,
    },
    Migration {
        threshold: FormatVersion::new(2, 1, 0),
        description: "add case-mask section",
        apply: add_case_mask_section,
    },
];

/// Migrations that apply to a store written with `version`
pub fn pending_migrations(version: FormatVersion) -> impl Iterator<Item = &'static Migration> {
    FORMAT_MIGRATIONS
        .iter()
        .filter(move |migration| version < migration.threshold)
}

/// Result of [`Migrator::migrate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The store already satisfied the minimum version; nothing was written
    UpToDate(FormatVersion),
    /// The store was upgraded by `steps` table entries
    Migrated {
        from: FormatVersion,
        to: FormatVersion,
        steps: usize,
    },
}

/// Detects the format version of the store under `basename`
///
/// The current layout takes precedence over legacy files when both exist.
pub fn detect_version(basename: &Path) -> Result<FormatVersion> {
    let path = index_path(basename);
    if path.exists() {
        let mut buffer = [0u8; SIZE_HEADER];
        File::open(&path)
            .and_then(|mut file| file.read_exact(&mut buffer))
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => StoreError::corrupt(&path, "truncated header"),
                _ => StoreError::io(&path, e),
            })?;
        return FormatHeader::peek_version(&buffer)
            .map_err(|e| StoreError::corrupt(&path, e).into());
    }
    if legacy::header_path(basename).exists() {
        return legacy::read_version(basename);
    }
    Err(StoreError::NotFound(basename.to_path_buf()).into())
}

/// Upgrades stores in place
#[derive(Debug, Clone, Copy, Default)]
pub struct Migrator {
    config: StoreConfig,
}
impl Migrator {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// See [`detect_version`]
    pub fn detect_version<P: AsRef<Path>>(&self, basename: P) -> Result<FormatVersion> {
        detect_version(basename.as_ref())
    }

    /// Brings the store under `basename` up to [`CURRENT_VERSION`]
    ///
    /// Calling this on a store that needs no migration is a no-op.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] if no store exists under `basename`
    /// * [`StoreError::UnsupportedVersion`] if the store is newer than this build
    /// * [`MigrationError::Failed`] if any step fails; the original files are left untouched
    pub fn migrate<P: AsRef<Path>>(&self, basename: P) -> Result<MigrationOutcome> {
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
        if version >= MINIMUM_SUPPORTED_VERSION {
            let leftovers = legacy::existing_files(basename);
            if !leftovers.is_empty() {
                warn!(
                    basename = %basename.display(),
                    files = leftovers.len(),
                    "legacy files found next to a current store; leaving them in place"
                );
            }
            return Ok(MigrationOutcome::UpToDate(version));
        }

        let steps = self
            .run(basename, version)
            .map_err(|source| MigrationError::Failed {
                basename: basename.to_path_buf(),
                from: version,
                source: Box::new(source),
            })?;
        info!(
            basename = %basename.display(),
            from = %version,
            to = %CURRENT_VERSION,
            steps,
            "migrated store"
        );
        Ok(MigrationOutcome::Migrated {
            from: version,
            to: CURRENT_VERSION,
            steps,
        })
    }

    fn run(&self, basename: &Path, version: FormatVersion) -> Result<usize> {
        let mut staged = load(basename)?;
        let mut steps = 0;
        for migration in pending_migrations(version) {
            info!(
                basename = %basename.display(),
                step = migration.description,
                target = %migration.threshold,
                "applying migration"
            );
            staged = (migration.apply)(staged, &self.config)?;
            steps += 1;
        }
        self.commit(basename, staged)?;
        Ok(steps)
    }

    fn commit(&self, basename: &Path, staged: Staged) -> Result<()> {
        let writer = StoreWriter::new(self.config);
        match staged {
            Staged::Rebuilt(store) => {
                writer.write(&store, basename)?;
                legacy::remove_files(basename)
            }
            Staged::Catalog(mut catalog) => {
                catalog.header.version = CURRENT_VERSION;
                writer.adopt_shared_payload(basename, &catalog.header)?;
                writer.write_catalog(&catalog, basename).inspect_err(|_| {
                    let adopted = payload_path(basename, &catalog.header);
                    if let Err(e) = fs::remove_file(&adopted) {
                        warn!(
                            path = %adopted.display(),
                            error = %e,
                            "could not remove adopted payload"
                        );
                    }
                })
            }
            Staged::Legacy(_) => Err(StoreError::corrupt(
                legacy::header_path(basename),
                "no migration converted the legacy layout",
            )
            .into()),
        }
    }
}

/// Loads the on-disk state of an outdated store
fn load(basename: &Path) -> Result<Staged> {
    let path = index_path(basename);
    if path.exists() {
        let file = File::open(&path).map_err(|e| StoreError::io(&path, e))?;
        let catalog = Catalog::from_reader(&mut BufReader::new(file), &path)?;
        return Ok(Staged::Catalog(catalog));
    }
    legacy::read_legacy(basename).map(Staged::Legacy)
}

/// 1.9.6: re-encode the three-file layout as index plus payload
///
/// Positions flagged in the ignore bitmap become `N` exceptions.
fn index_legacy_layout(staged: Staged, config: &StoreConfig) -> Result<Staged> {
    let legacy = match staged {
        Staged::Legacy(legacy) => legacy,
        other => return Ok(other),
    };
    let mut builder = StoreBuilder::begin(config.case_policy(CasePolicy::Fold));
    for chromosome in &legacy.chromosomes {
        builder.start_chromosome(&chromosome.name)?;
        chromosome.for_each_chunk(|chunk| builder.push_sequence(chunk))?;
    }
    builder.finish().map(Staged::Rebuilt)
}

/// 2.1.0: the index gains a case-mask section
///
/// Stores written before 2.1.0 always folded case, so the mask is empty.
fn add_case_mask_section(staged: Staged, _config: &StoreConfig) -> Result<Staged> {
    match staged {
        Staged::Catalog(catalog) => {
            let mut header = catalog.header;
            header.version = CASE_MASK_VERSION;
            header.case_policy = CasePolicy::Fold;
            Ok(Staged::Catalog(Catalog::new(
                header,
                catalog.index,
                catalog.exceptions,
                CaseMask::new(),
            )))
        }
        Staged::Rebuilt(store) => Ok(Staged::Rebuilt(store)),
        Staged::Legacy(_) => Err(StoreError::corrupt(
            "legacy layout",
            "case-mask migration requires an indexed store",
        )
        .into()),
    }
}
