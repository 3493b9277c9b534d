pub(crate) mod config;
pub(crate) mod context;
pub(crate) mod metrics;
pub(crate) mod security;
pub(crate) mod shutdown;
pub(crate) mod telemetry;
pub(crate) mod time;
