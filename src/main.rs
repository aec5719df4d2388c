use anyhow::Result;
use clap::Parser;
use judgebench::cli;
use tracing::error;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    if let Err(err) = cli::dispatch(args) {
        // Fatal preconditions can fail before logging is up.
        eprintln!("judgebench: {err:#}");
        error!("{:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
