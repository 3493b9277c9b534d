#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = mcq_client::run().await {
        eprintln!("mcq-client fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
