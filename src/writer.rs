//! Persisting stores
//!
//! A store under basename `B` occupies two files:
//!
//! * `B.{store_id:016x}.seq`: the payload, a 32-byte [`PayloadHeader`] followed by
//!   the packed little-endian `u64` words. Stores older than 2.1.0 used a single
//!   `B.seq` for every generation.
//! * `B.idx`: the [`Catalog`] (format header, chromosome index, side tables)
//!
//! Both files are staged as temporaries in the destination directory and synced.
//! The payload is renamed to its generation-specific name first, which never
//! replaces a committed file. The index rename is the single commit point: until
//! it happens the previous index still names the previous payload. Payloads of
//! earlier generations are deleted only once the new index is in place.

use std::{
    ffi::{OsStr, OsString},
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    codec::words_for,
    config::StoreConfig,
    error::{Result, StoreError},
    header::{FormatHeader, GENERATION_PAYLOAD_VERSION},
    store::Store,
};

/// Extension of the index file
pub const INDEX_EXTENSION: &str = "idx";

/// Extension of the payload file
pub const PAYLOAD_EXTENSION: &str = "seq";

/// Magic number of the payload file: "SQCP"
#[allow(clippy::unreadable_literal)]
pub const PAYLOAD_MAGIC: u32 = 0x50435153;

/// Size of the payload header in bytes
pub const SIZE_PAYLOAD_HEADER: usize = 32;

/// Appends `.{extension}` to a basename without replacing any existing extension
pub(crate) fn companion_path(basename: &Path, extension: &str) -> PathBuf {
    let mut path = OsString::from(basename.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

#[must_use]
pub fn index_path(basename: &Path) -> PathBuf {
    companion_path(basename, INDEX_EXTENSION)
}

/// Payload file that an index with `header` refers to
#[must_use]
pub fn payload_path(basename: &Path, header: &FormatHeader) -> PathBuf {
    if header.version < GENERATION_PAYLOAD_VERSION {
        shared_payload_path(basename)
    } else {
        companion_path(
            basename,
            &format!("{:016x}.{PAYLOAD_EXTENSION}", header.store_id),
        )
    }
}

/// Payload file of a pre-2.1.0 store
pub(crate) fn shared_payload_path(basename: &Path) -> PathBuf {
    companion_path(basename, PAYLOAD_EXTENSION)
}

/// Whether `name` is a payload file name, of any generation, for file stem `stem`
fn is_payload_name(name: &str, stem: &str) -> bool {
    let Some(middle) = name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(PAYLOAD_EXTENSION))
    else {
        return false;
    };
    let bytes = middle.as_bytes();
    let generation = bytes.len() == 17
        && bytes[16] == b'.'
        && bytes[..16].iter().all(u8::is_ascii_hexdigit);
    bytes.is_empty() || generation
}

/// Deletes every payload file of `basename` except `keep`
///
/// Runs after a commit, when nothing refers to those files any more, so failures
/// are only logged.
fn remove_stale_payloads(basename: &Path, keep: &Path) {
    let Some(stem) = basename.file_name().and_then(OsStr::to_str) else {
        return;
    };
    let dir = parent_dir(basename);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not list store directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_payload_name(name, stem) || keep.file_name() == Some(OsStr::new(name)) {
            continue;
        }
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale payload"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove stale payload"),
        }
    }
}

/// Header of the payload file
///
/// | Offset | Size | Name     |
/// | ------ | ---- | -------- |
/// | 0      | 4    | magic    |
/// | 4      | 4    | padding  |
/// | 8      | 8    | store id |
/// | 16     | 8    | bases    |
/// | 24     | 8    | words    |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub store_id: u64,
    pub n_bases: u64,
    pub n_words: u64,
}
impl PayloadHeader {
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIZE_PAYLOAD_HEADER] {
        let mut buffer = [0u8; SIZE_PAYLOAD_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], PAYLOAD_MAGIC);
        LittleEndian::write_u64(&mut buffer[8..16], self.store_id);
        LittleEndian::write_u64(&mut buffer[16..24], self.n_bases);
        LittleEndian::write_u64(&mut buffer[24..32], self.n_words);
        buffer
    }

    pub fn from_bytes(buffer: &[u8]) -> std::result::Result<Self, String> {
        if buffer.len() < SIZE_PAYLOAD_HEADER {
            return Err(format!("{} bytes is too short for a payload header", buffer.len()));
        }
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        if magic != PAYLOAD_MAGIC {
            return Err(format!("invalid payload magic number: {magic:#010x}"));
        }
        Ok(Self {
            store_id: LittleEndian::read_u64(&buffer[8..16]),
            n_bases: LittleEndian::read_u64(&buffer[16..24]),
            n_words: LittleEndian::read_u64(&buffer[24..32]),
        })
    }
}

/// Writes stores to disk
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreWriter {
    config: StoreConfig,
}
impl StoreWriter {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// Writes `store` under `basename`, replacing any previous store there
    pub fn write<P: AsRef<Path>>(&self, store: &Store, basename: P) -> Result<()> {
        self.stage(store, basename.as_ref())?.commit()
    }

    /// Writes both companion files to temporaries next to their destinations
    ///
    /// Nothing is visible under `basename` until [`StagedWrite::commit`].
    pub fn stage(&self, store: &Store, basename: &Path) -> Result<StagedWrite> {
        let dir = parent_dir(basename);
        let catalog = &store.catalog;

        let payload_dest = payload_path(basename, &catalog.header);
        let mut payload = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        {
            let header = PayloadHeader {
                store_id: catalog.header.store_id,
                n_bases: catalog.index.total_len(),
                n_words: words_for(catalog.index.total_len()),
            };
            let mut out = BufWriter::new(payload.as_file_mut());
            write_payload(&mut out, &header, &store.payload)
                .map_err(|e| StoreError::io(&payload_dest, e))?;
        }
        payload
            .as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&payload_dest, e))?;

        let index = stage_catalog(catalog, basename, self.config.compression_level)?;
        debug!(
            payload = %payload.path().display(),
            index = %index.path().display(),
            "staged store"
        );
        Ok(StagedWrite {
            basename: basename.to_path_buf(),
            payload_dest,
            payload: Some(payload),
            created_payload: false,
            index,
        })
    }

    /// Rewrites only the index file of an existing store
    ///
    /// The catalog must describe the payload already on disk, `store_id` included.
    pub fn write_catalog<P: AsRef<Path>>(&self, catalog: &Catalog, basename: P) -> Result<()> {
        let basename = basename.as_ref();
        let payload = payload_path(basename, &catalog.header);
        if !payload.exists() {
            return Err(StoreError::corrupt(&payload, "payload file is missing").into());
        }
        let staged = stage_catalog(catalog, basename, self.config.compression_level)?;
        persist(staged, &index_path(basename))?;
        remove_stale_payloads(basename, &payload);
        info!(
            basename = %basename.display(),
            version = %catalog.header.version,
            "rewrote index"
        );
        Ok(())
    }

    /// Makes the payload of a pre-2.1.0 store available under the name `header`
    /// expects
    ///
    /// The shared payload is hard linked when the filesystem allows it and copied
    /// otherwise. It stays in place until the next index commit removes it.
    pub(crate) fn adopt_shared_payload(
        &self,
        basename: &Path,
        header: &FormatHeader,
    ) -> Result<()> {
        let src = shared_payload_path(basename);
        let dest = payload_path(basename, header);
        if src == dest || dest.exists() {
            return Ok(());
        }
        if fs::hard_link(&src, &dest).is_ok() {
            debug!(from = %src.display(), to = %dest.display(), "linked payload");
            return Ok(());
        }
        let dir = parent_dir(basename);
        let mut copy = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        let mut input = File::open(&src).map_err(|e| StoreError::io(&src, e))?;
        std::io::copy(&mut input, copy.as_file_mut()).map_err(|e| StoreError::io(&dest, e))?;
        copy.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&dest, e))?;
        persist(copy, &dest)?;
        debug!(from = %src.display(), to = %dest.display(), "copied payload");
        Ok(())
    }
}

/// A store whose companion files are staged but not yet visible
#[derive(Debug)]
pub struct StagedWrite {
    basename: PathBuf,
    payload_dest: PathBuf,
    payload: Option<NamedTempFile>,
    /// Whether persisting the payload created its file rather than replacing one
    created_payload: bool,
    index: NamedTempFile,
}
impl StagedWrite {
    /// Moves the payload to its generation-specific name, leaving the index staged
    pub(crate) fn persist_payload(&mut self) -> Result<()> {
        if let Some(payload) = self.payload.take() {
            self.created_payload = !self.payload_dest.exists();
            persist(payload, &self.payload_dest)?;
        }
        Ok(())
    }

    /// Moves both files into place, index last, then drops older payloads
    ///
    /// If the index cannot be moved into place, a payload file created by this
    /// write is removed again and the previous store stays as it was.
    pub fn commit(mut self) -> Result<()> {
        self.persist_payload()?;
        if let Err(e) = persist(self.index, &index_path(&self.basename)) {
            if self.created_payload {
                if let Err(cleanup) = fs::remove_file(&self.payload_dest) {
                    warn!(
                        path = %self.payload_dest.display(),
                        error = %cleanup,
                        "could not remove uncommitted payload"
                    );
                }
            }
            return Err(e);
        }
        remove_stale_payloads(&self.basename, &self.payload_dest);
        info!(basename = %self.basename.display(), "committed store");
        Ok(())
    }
}

fn parent_dir(basename: &Path) -> &Path {
    match basename.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn write_payload<W: Write>(
    out: &mut W,
    header: &PayloadHeader,
    words: &[u64],
) -> std::io::Result<()> {
    out.write_all(&header.to_bytes())?;
    words
        .iter()
        .try_for_each(|&w| out.write_u64::<LittleEndian>(w))?;
    out.flush()
}

fn stage_catalog(catalog: &Catalog, basename: &Path, level: i32) -> Result<NamedTempFile> {
    let dir = parent_dir(basename);
    let dest = index_path(basename);
    let mut file = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    {
        let mut out = BufWriter::new(file.as_file_mut());
        catalog.write_bytes(&mut out, level)?;
        out.flush().map_err(|e| StoreError::io(&dest, e))?;
    }
    file.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(&dest, e))?;
    Ok(file)
}

fn persist(file: NamedTempFile, dest: &Path) -> Result<()> {
    file.persist(dest)
        .map_err(|e| StoreError::io(dest, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StoreBuilder;
    use anyhow::Result;

    fn small_store() -> crate::Result<Store> {
        let mut builder = StoreBuilder::begin(StoreConfig::default());
        builder.feed("chr1", b"ACGTNACGT")?;
        builder.finish()
    }

    #[test]
    fn companion_paths_keep_dots_in_basename() {
        let base = Path::new("/data/hg19.v2");
        let mut header = FormatHeader::new(crate::policy::CasePolicy::Fold, 0xab);
        assert_eq!(index_path(base), PathBuf::from("/data/hg19.v2.idx"));
        assert_eq!(
            payload_path(base, &header),
            PathBuf::from("/data/hg19.v2.00000000000000ab.seq")
        );
        header.version = crate::header::FormatVersion::new(2, 0, 0);
        assert_eq!(payload_path(base, &header), PathBuf::from("/data/hg19.v2.seq"));
    }

    #[test]
    fn payload_names_match_only_their_own_store() {
        assert!(is_payload_name("hg19.seq", "hg19"));
        assert!(is_payload_name("hg19.00000000000000ab.seq", "hg19"));
        assert!(!is_payload_name("hg19.v2.00000000000000ab.seq", "hg19"));
        assert!(!is_payload_name("hg19.idx", "hg19"));
        assert!(!is_payload_name("hg19.bases", "hg19"));
        assert!(!is_payload_name("hg190.seq", "hg19"));
    }

    #[test]
    fn payload_header_roundtrip() {
        let header = PayloadHeader {
            store_id: 7,
            n_bases: 100,
            n_words: 4,
        };
        assert_eq!(PayloadHeader::from_bytes(&header.to_bytes()), Ok(header));
        assert!(PayloadHeader::from_bytes(&[0u8; 32]).is_err());
        assert!(PayloadHeader::from_bytes(&[0u8; 8]).is_err());
    }

    #[test]
    fn write_produces_both_files_and_no_leftovers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("genome");
        let store = small_store()?;
        StoreWriter::default().write(&store, &base)?;

        assert!(index_path(&base).exists());
        let payload = std::fs::read(payload_path(&base, &store.catalog.header))?;
        assert_eq!(payload.len(), SIZE_PAYLOAD_HEADER + 8);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 2);
        Ok(())
    }

    #[test]
    fn overwrite_removes_previous_generation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("genome");
        let writer = StoreWriter::default();
        let first = small_store()?;
        let second = small_store()?;
        writer.write(&first, &base)?;
        writer.write(&second, &base)?;

        assert!(!payload_path(&base, &first.catalog.header).exists());
        assert!(payload_path(&base, &second.catalog.header).exists());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 2);
        Ok(())
    }

    #[test]
    fn staged_files_are_invisible_until_commit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("genome");
        let store = small_store()?;
        let staged = StoreWriter::default().stage(&store, &base)?;
        assert!(!index_path(&base).exists());
        assert!(!payload_path(&base, &store.catalog.header).exists());
        drop(staged);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_io_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("absent").join("genome");
        let err = StoreWriter::default()
            .write(&small_store()?, &base)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::IoFailure);
        assert!(err.to_string().contains("absent"));
        assert!(!index_path(&base).exists());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn failed_index_commit_leaves_no_payload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("genome");
        // A directory squatting on the index name makes the final rename fail
        std::fs::create_dir(index_path(&base))?;
        let store = small_store()?;
        let err = StoreWriter::default()
            .write(&store, &base)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::IoFailure);
        assert!(err.to_string().contains("genome.idx"));
        assert!(!payload_path(&base, &store.catalog.header).exists());
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
