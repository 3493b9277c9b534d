use super::parsing::{
    env_optional, env_or_default, normalize_email, parse_bool, parse_environment,
    parse_positive_u64, parse_u64,
};
use super::types::{
    ApiBaseUrl, ApiSettings, ConfigError, CredentialSettings, QuizSettings, RuntimeSettings,
    Settings, StorageSettings, TelemetrySettings,
};

const DEFAULT_ADMIN_EMAIL: &str = "admin@kaaratech.com";

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("MCQ_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("MCQ_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let base_url = env_or_default("MCQ_API_URL", "http://localhost:8000");
        let request_timeout_seconds = parse_positive_u64(
            "MCQ_REQUEST_TIMEOUT_SECONDS",
            env_or_default("MCQ_REQUEST_TIMEOUT_SECONDS", "30"),
        )?;
        let connect_timeout_seconds = parse_positive_u64(
            "MCQ_CONNECT_TIMEOUT_SECONDS",
            env_or_default("MCQ_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;

        let email = env_optional("MCQ_EMAIL");
        let password = env_optional("MCQ_PASSWORD");
        let admin_email = normalize_email(&env_or_default("MCQ_ADMIN_EMAIL", DEFAULT_ADMIN_EMAIL));

        let state_dir = env_or_default("MCQ_STATE_DIR", ".mcq-state");

        let reconcile_interval_seconds = parse_positive_u64(
            "MCQ_RECONCILE_INTERVAL_SECONDS",
            env_or_default("MCQ_RECONCILE_INTERVAL_SECONDS", "30"),
        )?;
        let time_up_notice_seconds = parse_u64(
            "MCQ_TIME_UP_NOTICE_SECONDS",
            env_or_default("MCQ_TIME_UP_NOTICE_SECONDS", "3"),
        )?;

        let log_level = env_or_default("MCQ_LOG_LEVEL", "info");
        let json = env_optional("MCQ_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings {
                base_url: ApiBaseUrl::parse(base_url)?,
                request_timeout_seconds,
                connect_timeout_seconds,
            },
            credentials: CredentialSettings { email, password, admin_email },
            storage: StorageSettings { state_dir },
            quiz: QuizSettings { reconcile_interval_seconds, time_up_notice_seconds },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn credentials(&self) -> &CredentialSettings {
        &self.credentials
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn quiz(&self) -> &QuizSettings {
        &self.quiz
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    /// Whether `email` designates the administrator account.
    pub(crate) fn is_admin_email(&self, email: &str) -> bool {
        normalize_email(email) == self.credentials.admin_email
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.state_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "MCQ_STATE_DIR",
                value: String::from("<empty>"),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.credentials.email.is_none() {
            return Err(ConfigError::MissingSecret("MCQ_EMAIL"));
        }
        if self.credentials.password.is_none() {
            return Err(ConfigError::MissingSecret("MCQ_PASSWORD"));
        }

        Ok(())
    }
}
