use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    stratus_cli::run().await
}
