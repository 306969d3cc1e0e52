use anyhow::Result;
use clap::Parser;

use s3_part_copy::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing()?;

    let outcome = cli.run().await.map_err(|e| {
        tracing::error!(error = %e, "Copy failed");
        e
    })?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
