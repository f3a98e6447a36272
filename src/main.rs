use anyhow::Result;
use substrate_ingest::{init_tracing, IngestConfig, Runner};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = IngestConfig::from_env()?;
    let mut runner = Runner::connect(config).await?;
    runner.run_until_ctrl_c().await
}
