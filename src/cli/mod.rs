//! Command-line interface for seqcache.
//!
//! - **build**: Build a store from a FASTA file (plain or gzipped) or a `.seqpack` container
//! - **upgrade**: Migrate stores written by older format versions
//! - **fetch**: Print a region of a chromosome as FASTA
//! - **info**: Summarize a store and list its chromosomes
//! - **export**: Write a store's chromosomes to a `.seqpack` container
//!
//! ## Usage
//!
//! ```text
//! # Build hg19.idx / hg19.seq next to the input
//! seqcache build hg19.fa.gz
//!
//! # Fetch a window, reverse complemented
//! seqcache fetch hg19 chr7 --start 1000 --end 1100 --reverse-complement
//!
//! # Upgrade old stores in place
//! seqcache upgrade hg18 mm9
//! ```

use clap::{Parser, Subcommand};

pub mod build;
pub mod export;
pub mod fetch;
pub mod info;
pub mod upgrade;

#[derive(Parser)]
#[command(name = "seqcache")]
#[command(version)]
#[command(about = "Random-access two-bit reference genome storage")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a store from a FASTA file or a .seqpack container
    Build(build::BuildArgs),

    /// Migrate stores to the current format version
    Upgrade(upgrade::UpgradeArgs),

    /// Print a chromosome region as FASTA
    Fetch(fetch::FetchArgs),

    /// Describe a store
    Info(info::InfoArgs),

    /// Export a store as a .seqpack container
    Export(export::ExportArgs),
}
