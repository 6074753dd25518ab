use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    snowdash::cli::app::run().await
}
