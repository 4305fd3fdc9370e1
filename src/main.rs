#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    askshot::server::run().await
}
