use std::path::PathBuf;

use clap::Args;
use seqcache::{SequenceAccess, StoreConfig, StoreReader};

#[derive(Args)]
pub struct InfoArgs {
    /// Basename of the store
    #[arg(required = true)]
    pub basename: PathBuf,

    /// Fail instead of upgrading an outdated store
    #[arg(long)]
    pub no_migrate: bool,
}

pub fn run(args: InfoArgs) -> anyhow::Result<()> {
    let config = StoreConfig::default().auto_migrate(!args.no_migrate);
    let store = StoreReader::open_with(&args.basename, config)?;
    let header = store.header();
    let catalog = store.catalog();

    println!("Store: {}", store.basename().display());
    println!("Format version: {}", header.version);
    println!("Case policy: {:?}", header.case_policy);
    println!("Chromosomes: {}", store.num_chromosomes());
    println!("Total bases: {}", store.total_len());
    println!(
        "Exception runs: {} ({} bases)",
        catalog.exceptions.len(),
        catalog.exceptions.covered()
    );
    println!(
        "Case-mask runs: {} ({} bases)",
        catalog.case_mask.len(),
        catalog.case_mask.covered()
    );
    println!();
    println!("name\tlength\toffset");
    for entry in catalog.index.entries() {
        println!("{}\t{}\t{}", entry.name, entry.length, entry.offset);
    }
    Ok(())
}
