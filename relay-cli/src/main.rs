use anyhow::Result;
use clap::Parser;
use relay_cli::{Cli, Commands, run_serve};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
    }
}
