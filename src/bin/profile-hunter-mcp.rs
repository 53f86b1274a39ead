#[tokio::main]
async fn main() -> anyhow::Result<()> {
    profile_hunter::mcp::run().await
}
