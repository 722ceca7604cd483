use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use seqcache::{
    source::CONTAINER_EXTENSION, CasePolicy, ContainerReader, FastaSource, SequenceAccess,
    Store, StoreBuilder, StoreConfig, StoreWriter, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL,
};
use tracing::info;

#[derive(Args)]
pub struct BuildArgs {
    /// FASTA file (optionally gzipped) or .seqpack container
    #[arg(required = true)]
    pub input: PathBuf,

    /// Basename of the store; defaults to the input path without its extensions
    #[arg(short, long)]
    pub basename: Option<PathBuf>,

    /// Keep soft-masked (lowercase) bases instead of folding to uppercase
    #[arg(long)]
    pub preserve_case: bool,

    /// Maximum bytes of sequence text per FASTA chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// zstd level for the index file
    #[arg(long, default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    pub compression_level: i32,
}

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let basename = args
        .basename
        .clone()
        .unwrap_or_else(|| default_basename(&args.input));
    let policy = if args.preserve_case {
        CasePolicy::Preserve
    } else {
        CasePolicy::Fold
    };
    let config = StoreConfig::default()
        .case_policy(policy)
        .chunk_size(args.chunk_size)
        .compression_level(args.compression_level);

    let store = read_source(&args.input, config).with_context(|| {
        format!(
            "failed to build {} from {}",
            basename.display(),
            args.input.display()
        )
    })?;
    StoreWriter::new(config)
        .write(&store, &basename)
        .with_context(|| format!("failed to write store {}", basename.display()))?;

    println!(
        "{}: {} chromosomes, {} bases",
        basename.display(),
        store.num_chromosomes(),
        store.total_len()
    );
    Ok(())
}

fn read_source(input: &Path, config: StoreConfig) -> seqcache::Result<Store> {
    let mut builder = StoreBuilder::begin(config);
    if is_container(input) {
        info!(input = %input.display(), "reading container");
        for record in ContainerReader::from_path(input)? {
            builder.feed_packed(&record?)?;
        }
    } else {
        info!(input = %input.display(), "reading FASTA");
        for event in FastaSource::from_path(input, config.chunk_size)? {
            builder.feed_event(event?)?;
        }
    }
    builder.finish()
}

fn is_container(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION))
}

/// Strips a trailing `.gz` and then one more extension: `hg19.fa.gz` becomes `hg19`
pub fn default_basename(input: &Path) -> PathBuf {
    let stripped = if input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
    {
        input.with_extension("")
    } else {
        input.to_path_buf()
    };
    stripped.with_extension("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basenames_drop_compression_and_format_extensions() {
        assert_eq!(default_basename(Path::new("ref/hg19.fa.gz")), PathBuf::from("ref/hg19"));
        assert_eq!(default_basename(Path::new("hg19.fasta")), PathBuf::from("hg19"));
        assert_eq!(default_basename(Path::new("mm9.seqpack")), PathBuf::from("mm9"));
        assert_eq!(default_basename(Path::new("genome")), PathBuf::from("genome"));
    }
}
