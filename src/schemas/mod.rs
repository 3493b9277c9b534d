use serde::Deserialize;

pub(crate) mod auth;
pub(crate) mod quiz;
pub(crate) mod student;

/// Error body returned by the server for non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub(crate) detail: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Flattens `detail`, which is a string for handled errors and a list of
    /// objects for request validation failures.
    pub(crate) fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
