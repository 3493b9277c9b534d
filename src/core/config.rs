mod parsing;
mod settings;
mod types;

pub(crate) use types::{ApiBaseUrl, ConfigError, Environment, Settings};
