use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Args;
use seqcache::{SequenceAccess, StoreConfig, StoreReader};

#[derive(Args)]
pub struct FetchArgs {
    /// Basename of the store
    #[arg(required = true)]
    pub basename: PathBuf,

    /// Chromosome name
    #[arg(required = true)]
    pub chromosome: String,

    /// 0-based start of the region
    #[arg(short, long, default_value_t = 0)]
    pub start: u64,

    /// End of the region (exclusive); defaults to the chromosome length
    #[arg(short, long)]
    pub end: Option<u64>,

    /// Print the reverse complement of the region
    #[arg(short, long)]
    pub reverse_complement: bool,

    /// Bases per output line
    #[arg(long, default_value_t = 60)]
    pub line_width: usize,

    /// Fail instead of upgrading an outdated store
    #[arg(long)]
    pub no_migrate: bool,
}

pub fn run(args: FetchArgs) -> anyhow::Result<()> {
    let config = StoreConfig::default().auto_migrate(!args.no_migrate);
    let store = StoreReader::open_with(&args.basename, config)?;
    let end = match args.end {
        Some(end) => end,
        None => store.length(&args.chromosome)?,
    };
    let sequence = if args.reverse_complement {
        store.reverse_complement(&args.chromosome, args.start, end)?
    } else {
        store.range(&args.chromosome, args.start, end)?
    };

    let mut out = BufWriter::new(io::stdout().lock());
    let strand = if args.reverse_complement { "(-)" } else { "" };
    writeln!(out, ">{}:{}-{}{strand}", args.chromosome, args.start, end)?;
    for line in sequence.chunks(args.line_width.max(1)) {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
