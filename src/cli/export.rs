use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use seqcache::{
    ContainerWriter, SequenceAccess, StoreReader, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_CONTAINER_CHUNK_BASES,
};

#[derive(Args)]
pub struct ExportArgs {
    /// Basename of the store
    #[arg(required = true)]
    pub basename: PathBuf,

    /// Output .seqpack path
    #[arg(required = true)]
    pub output: PathBuf,

    /// Maximum bases per container record
    #[arg(long, default_value_t = DEFAULT_CONTAINER_CHUNK_BASES)]
    pub chunk_bases: u64,
}

pub fn run(args: ExportArgs) -> anyhow::Result<()> {
    let store = StoreReader::open(&args.basename)?;
    let file = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut writer = ContainerWriter::new(BufWriter::new(file), DEFAULT_COMPRESSION_LEVEL)?;
    store.export_container(&mut writer, args.chunk_bases)?;
    let records = writer.records();
    writer.finish()?.flush()?;
    println!(
        "{}: {} records, {} bases",
        args.output.display(),
        records,
        store.total_len()
    );
    Ok(())
}
