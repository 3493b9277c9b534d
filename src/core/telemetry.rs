use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.telemetry().log_level.clone()));

    // stdout belongs to the candidate-facing prompt; logs go to stderr.
    let builder = fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr);

    if settings.telemetry().json {
        builder.json().try_init().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder.try_init().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        api_url = settings.api().base_url.as_str(),
        "Tracing initialised"
    );

    Ok(())
}
