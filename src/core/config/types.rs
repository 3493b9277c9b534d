use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) api: ApiSettings,
    pub(super) credentials: CredentialSettings,
    pub(super) storage: StorageSettings,
    pub(super) quiz: QuizSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) base_url: ApiBaseUrl,
    pub(crate) request_timeout_seconds: u64,
    pub(crate) connect_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct CredentialSettings {
    pub(crate) email: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) admin_email: String,
}

#[derive(Debug, Clone)]
pub(crate) struct StorageSettings {
    pub(crate) state_dir: String,
}

#[derive(Debug, Clone)]
pub(crate) struct QuizSettings {
    pub(crate) reconcile_interval_seconds: u64,
    pub(crate) time_up_notice_seconds: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApiBaseUrl(pub(super) String);

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid api url: {0}")]
    InvalidUrl(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
}

impl ApiBaseUrl {
    pub(super) fn parse(value: String) -> Result<Self, ConfigError> {
        let trimmed = value.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidUrl(value));
        }
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(value));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn join(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}
