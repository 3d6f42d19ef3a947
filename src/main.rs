use clap::Parser;
use coloc_processor::cli::{run, Cli};
use coloc_processor::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
