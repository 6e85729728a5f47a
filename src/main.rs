#[tokio::main]
async fn main() -> anyhow::Result<()> {
    weldcount_lib::run().await
}
