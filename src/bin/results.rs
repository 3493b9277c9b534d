#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = mcq_client::run_results().await {
        eprintln!("mcq-results fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
