use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Structured classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ErrorCode {
    Unauthorized,
    AlreadyCompleted,
    TimeLimitExceeded,
    Validation,
    Network,
    Server,
    Unknown,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::AlreadyCompleted => "already_completed",
            Self::TimeLimitExceeded => "time_limit_exceeded",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }

    /// Terminal failures end the session and discard local progress.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::AlreadyCompleted | Self::TimeLimitExceeded)
    }
}

#[derive(Debug, Clone, Error)]
pub(crate) enum ApiError {
    #[error("authentication required: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    AlreadyCompleted(String),
    #[error("{0}")]
    TimeLimitExceeded(String),
    #[error("{0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error ({status}): {detail}")]
    Server { status: u16, detail: String },
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
    #[error("unexpected response: {0}")]
    Unknown(String),
}

const ALREADY_COMPLETED_MARKER: &str = "already completed";
const TIME_LIMIT_MARKER: &str = "time limit exceeded";

impl ApiError {
    pub(crate) fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::AlreadyCompleted(_) => ErrorCode::AlreadyCompleted,
            Self::TimeLimitExceeded(_) => ErrorCode::TimeLimitExceeded,
            Self::Validation(_) => ErrorCode::Validation,
            Self::Network(_) => ErrorCode::Network,
            Self::Server { .. } => ErrorCode::Server,
            Self::Rejected { .. } | Self::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// Maps a non-2xx response onto the taxonomy.
    ///
    /// The server reports terminal conditions only through its human-readable
    /// `detail`, so the two markers are matched here and nowhere else.
    pub(crate) fn from_response(status: StatusCode, detail: Option<String>) -> Self {
        let detail = detail.unwrap_or_else(|| {
            status.canonical_reason().unwrap_or("request failed").to_string()
        });
        let lowered = detail.to_ascii_lowercase();

        if status == StatusCode::UNAUTHORIZED {
            return Self::Unauthorized(detail);
        }
        if lowered.contains(ALREADY_COMPLETED_MARKER) {
            return Self::AlreadyCompleted(detail);
        }
        if lowered.contains(TIME_LIMIT_MARKER) {
            return Self::TimeLimitExceeded(detail);
        }
        if status.is_server_error() {
            return Self::Server { status: status.as_u16(), detail };
        }
        Self::Rejected { status: status.as_u16(), detail }
    }

    pub(crate) fn from_transport(err: &reqwest::Error, context: &str) -> Self {
        if err.is_decode() {
            tracing::error!(error = %err, "{context}: undecodable response");
            return Self::Unknown(format!("{context}: {err}"));
        }
        tracing::warn!(
            error = %err,
            timeout = err.is_timeout(),
            connect = err.is_connect(),
            "{context}"
        );
        Self::Network(format!("{context}: {err}"))
    }
}
