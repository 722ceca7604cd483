use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr so that fetched sequence can be piped
    let filter = if cli.verbose {
        EnvFilter::new("seqcache=debug,info")
    } else {
        EnvFilter::new("seqcache=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        cli::Commands::Build(args) => cli::build::run(args)?,
        cli::Commands::Upgrade(args) => cli::upgrade::run(args)?,
        cli::Commands::Fetch(args) => cli::fetch::run(args)?,
        cli::Commands::Info(args) => cli::info::run(args)?,
        cli::Commands::Export(args) => cli::export::run(args)?,
    }

    Ok(())
}
