use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    home_dashboard::run().await
}
