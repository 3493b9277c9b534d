use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Validate)]
pub(crate) struct LoginForm {
    #[validate(email(message = "Please enter a valid email address"))]
    pub(crate) email: String,
    #[validate(length(min = 1, message = "Please enter both email and password"))]
    pub(crate) password: String,
}

/// Body of the token exchange; the server expects OAuth2 password-form field names.
#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub(crate) username: &'a str,
    pub(crate) password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    #[serde(default)]
    pub(crate) token_type: Option<String>,
}
