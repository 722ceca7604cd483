//! Legacy (pre-1.9.6) store layout
//!
//! Before the index/payload split, a store under basename `B` was three files:
//!
//! * `B.header`: magic, version, chromosome count, then per chromosome the name
//!   (`u16` length prefix) and its length as `u64`
//! * `B.bases`: per chromosome, `ceil(len / 32)` two-bit words
//! * `B.ignore`: per chromosome, `ceil(len / 64)` bitmap words; a set bit marks a
//!   position whose real symbol is `N`
//!
//! Every chromosome starts on a fresh word in both bit streams. The layout only
//! knows `A`, `C`, `G`, `T` and `N`, always uppercase. It is read for migration
//! and written only to produce fixtures of old stores.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use crate::{
    codec::{self, unpack_word, Encoded, BASES_PER_WORD},
    error::{Result, StoreError},
    header::FormatVersion,
    policy::CasePolicy,
    writer::companion_path,
};

/// Magic number of the legacy header file: "SQCL"
#[allow(clippy::unreadable_literal)]
pub const LEGACY_MAGIC: u32 = 0x4C435153;

/// Version stamped by [`write_legacy`]
pub const LEGACY_VERSION: FormatVersion = FormatVersion::new(1, 9, 5);

const LEGACY_EXTENSIONS: [&str; 3] = ["header", "bases", "ignore"];

#[must_use]
pub fn header_path(basename: &Path) -> PathBuf {
    companion_path(basename, LEGACY_EXTENSIONS[0])
}

fn bases_path(basename: &Path) -> PathBuf {
    companion_path(basename, LEGACY_EXTENSIONS[1])
}

fn ignore_path(basename: &Path) -> PathBuf {
    companion_path(basename, LEGACY_EXTENSIONS[2])
}

/// Legacy companion files that currently exist under `basename`
#[must_use]
pub fn existing_files(basename: &Path) -> Vec<PathBuf> {
    LEGACY_EXTENSIONS
        .iter()
        .map(|ext| companion_path(basename, ext))
        .filter(|path| path.exists())
        .collect()
}

/// Removes whatever legacy companion files exist under `basename`
pub fn remove_files(basename: &Path) -> Result<()> {
    for path in existing_files(basename) {
        fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
        debug!(path = %path.display(), "removed legacy file");
    }
    Ok(())
}

/// One chromosome of a legacy store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyChromosome {
    pub name: String,
    pub length: u64,
    pub words: Vec<u64>,
    pub ignore: Vec<u64>,
}
impl LegacyChromosome {
    /// Whether position `pos` is flagged in the ignore bitmap
    #[must_use]
    pub fn is_ignored(&self, pos: u64) -> bool {
        self.ignore
            .get((pos / 64) as usize)
            .is_some_and(|&word| (word >> (pos % 64)) & 1 == 1)
    }

    /// Decodes the chromosome into `ACGTN` text, `BASES_PER_WORD` bases at a time
    pub fn for_each_chunk<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut chunk = Vec::with_capacity(BASES_PER_WORD);
        for (i, &word) in self.words.iter().enumerate() {
            let first = (i * BASES_PER_WORD) as u64;
            let n = (self.length - first).min(BASES_PER_WORD as u64) as usize;
            unpack_word(word, n, &mut chunk)?;
            for (j, base) in chunk.iter_mut().enumerate() {
                if self.is_ignored(first + j as u64) {
                    *base = b'N';
                }
            }
            f(&chunk)?;
        }
        Ok(())
    }
}

/// A fully loaded legacy store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyStore {
    pub version: FormatVersion,
    pub chromosomes: Vec<LegacyChromosome>,
}

/// Reads only the version from a legacy header file
pub fn read_version(basename: &Path) -> Result<FormatVersion> {
    let path = header_path(basename);
    let mut reader = BufReader::new(File::open(&path).map_err(|e| StoreError::io(&path, e))?);
    read_preamble(&mut reader, &path).map(|(version, _)| version)
}

fn read_preamble<R: Read>(reader: &mut R, path: &Path) -> Result<(FormatVersion, u32)> {
    let truncated = |_| StoreError::corrupt(path, "truncated legacy header");
    let magic = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    if magic != LEGACY_MAGIC {
        return Err(
            StoreError::corrupt(path, format!("invalid legacy magic number: {magic:#010x}")).into(),
        );
    }
    let mut version = [0u8; 6];
    reader.read_exact(&mut version).map_err(truncated)?;
    let count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    Ok((FormatVersion::from_bytes(&version), count))
}

/// Loads all three legacy files
pub fn read_legacy(basename: &Path) -> Result<LegacyStore> {
    let open = |path: &Path| -> Result<BufReader<File>> {
        match File::open(path) {
            Ok(file) => Ok(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::corrupt(path, "legacy companion file is missing").into())
            }
            Err(e) => Err(StoreError::io(path, e).into()),
        }
    };
    let hpath = header_path(basename);
    let bpath = bases_path(basename);
    let ipath = ignore_path(basename);
    let mut header = open(&hpath)?;
    let mut bases = open(&bpath)?;
    let mut ignore = open(&ipath)?;

    let (version, count) = read_preamble(&mut header, &hpath)?;
    let mut chromosomes = Vec::new();
    for _ in 0..count {
        let truncated = |_| StoreError::corrupt(&hpath, "truncated legacy header");
        let name_len = header.read_u16::<LittleEndian>().map_err(truncated)?;
        let mut name = vec![0; name_len as usize];
        header.read_exact(&mut name).map_err(truncated)?;
        let name = String::from_utf8(name)
            .map_err(|_| StoreError::corrupt(&hpath, "chromosome name is not valid UTF-8"))?;
        let length = header.read_u64::<LittleEndian>().map_err(truncated)?;

        let words = read_words(&mut bases, codec::words_for(length), &bpath)?;
        let ignore_bits = read_words(&mut ignore, length.div_ceil(64), &ipath)?;
        chromosomes.push(LegacyChromosome {
            name,
            length,
            words,
            ignore: ignore_bits,
        });
    }
    for (reader, path) in [(&mut bases, &bpath), (&mut ignore, &ipath)] {
        let mut extra = [0u8; 1];
        if reader.read(&mut extra).map_err(|e| StoreError::io(path, e))? != 0 {
            return Err(StoreError::corrupt(path, "trailing data after the last chromosome").into());
        }
    }
    Ok(LegacyStore {
        version,
        chromosomes,
    })
}

fn read_words<R: Read>(reader: &mut R, n: u64, path: &Path) -> Result<Vec<u64>> {
    let mut words = Vec::new();
    for _ in 0..n {
        words.push(
            reader
                .read_u64::<LittleEndian>()
                .map_err(|_| StoreError::corrupt(path, "truncated legacy bit stream"))?,
        );
    }
    Ok(words)
}

/// Writes `records` in the legacy layout
///
/// Symbols are case folded; anything other than `A`, `C`, `G`, `T` becomes `N`.
pub fn write_legacy(basename: &Path, records: &[(&str, &[u8])]) -> Result<()> {
    let create = |path: PathBuf| -> Result<(BufWriter<File>, PathBuf)> {
        let file = File::create(&path).map_err(|e| StoreError::io(&path, e))?;
        Ok((BufWriter::new(file), path))
    };
    let (mut header, hpath) = create(header_path(basename))?;
    let (mut bases, bpath) = create(bases_path(basename))?;
    let (mut ignore, ipath) = create(ignore_path(basename))?;

    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |e| StoreError::io(path, e)
    };

    header
        .write_u32::<LittleEndian>(LEGACY_MAGIC)
        .map_err(io(&hpath))?;
    let mut version = [0u8; 6];
    LEGACY_VERSION.write_into(&mut version);
    header.write_all(&version).map_err(io(&hpath))?;
    header
        .write_u32::<LittleEndian>(records.len() as u32)
        .map_err(io(&hpath))?;

    for (name, sequence) in records {
        header
            .write_u16::<LittleEndian>(name.len() as u16)
            .map_err(io(&hpath))?;
        header.write_all(name.as_bytes()).map_err(io(&hpath))?;
        header
            .write_u64::<LittleEndian>(sequence.len() as u64)
            .map_err(io(&hpath))?;

        let mut codes = Vec::with_capacity(sequence.len());
        let mut bitmap = vec![0u64; sequence.len().div_ceil(64)];
        for (pos, &symbol) in sequence.iter().enumerate() {
            match codec::encode(symbol, CasePolicy::Fold) {
                Encoded::Canonical { code, .. } => codes.push(code),
                Encoded::Exception(_) => {
                    codes.push(codec::FILLER_CODE);
                    bitmap[pos / 64] |= 1 << (pos % 64);
                }
            }
        }
        for word in codec::pack_codes(&codes)? {
            bases.write_u64::<LittleEndian>(word).map_err(io(&bpath))?;
        }
        for word in bitmap {
            ignore.write_u64::<LittleEndian>(word).map_err(io(&ipath))?;
        }
    }
    header.flush().map_err(io(&hpath))?;
    bases.flush().map_err(io(&bpath))?;
    ignore.flush().map_err(io(&ipath))?;
    Ok(())
}
