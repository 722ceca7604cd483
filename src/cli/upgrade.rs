use std::path::PathBuf;

use clap::Args;
use seqcache::{MigrationOutcome, Migrator, StoreConfig};
use tracing::error;

#[derive(Args)]
pub struct UpgradeArgs {
    /// Basenames of the stores to upgrade
    #[arg(required = true)]
    pub basenames: Vec<PathBuf>,
}

/// Upgrades every store; a failing store does not stop the others
pub fn run(args: UpgradeArgs) -> anyhow::Result<()> {
    let migrator = Migrator::new(StoreConfig::default());
    let mut failed = 0;
    for basename in &args.basenames {
        match migrator.migrate(basename) {
            Ok(MigrationOutcome::UpToDate(version)) => {
                println!("{}: up to date (format {version})", basename.display());
            }
            Ok(MigrationOutcome::Migrated { from, to, steps }) => {
                println!(
                    "{}: upgraded {from} -> {to} ({steps} steps)",
                    basename.display()
                );
            }
            Err(e) => {
                error!("{e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} stores could not be upgraded", args.basenames.len());
    }
    Ok(())
}
