use clap::Parser;
use parlay::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    Cli::parse().execute().await?;
    Ok(())
}
