use clap::Parser;

use bedwatch::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    bedwatch::init_tracing();
    cli::run(Cli::parse()).await
}
