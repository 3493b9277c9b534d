use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::config::{ApiBaseUrl, Settings};
use crate::core::context::TokenSlot;
use crate::schemas::auth::{LoginForm, TokenRequest, TokenResponse};
use crate::schemas::quiz::{
    QuizStatePayload, QuizStatusPayload, SubmissionRequest, SubmissionResponse,
};
use crate::schemas::student::StudentPayload;
use crate::schemas::ErrorResponse;

/// The endpoints a quiz session depends on.
#[async_trait]
pub(crate) trait QuizApi: Send + Sync {
    /// `GET /questions/`: question set plus the authoritative start instant.
    async fn fetch_quiz(&self) -> Result<QuizStatePayload, ApiError>;
    /// `GET /quiz-status`: reconciliation only.
    async fn quiz_status(&self) -> Result<QuizStatusPayload, ApiError>;
    /// `POST /submit`.
    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionResponse, ApiError>;
}

#[derive(Clone)]
pub(crate) struct ApiClient {
    client: Client,
    base_url: ApiBaseUrl,
    token: TokenSlot,
}

impl ApiClient {
    pub(crate) fn from_settings(settings: &Settings, token: TokenSlot) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.api().connect_timeout_seconds))
            .timeout(Duration::from_secs(settings.api().request_timeout_seconds))
            .build()
            .context("Failed to build quiz API HTTP client")?;

        Ok(Self { client, base_url: settings.api().base_url.clone(), token })
    }

    /// Exchanges credentials for a bearer token and stores it.
    ///
    /// Malformed input is rejected before any request is made.
    pub(crate) async fn login(&self, form: &LoginForm) -> Result<String, ApiError> {
        if form.email.trim().is_empty() || form.password.is_empty() {
            return Err(ApiError::Validation("Please enter both email and password".to_string()));
        }
        form.validate().map_err(|errors| ApiError::Validation(errors.to_string()))?;

        tracing::info!(
            email = %form.email,
            password_length = form.password.len(),
            "Login request initiated"
        );

        let email = form.email.trim();
        let request = self
            .client
            .post(self.base_url.join("/token"))
            .form(&TokenRequest { username: email, password: &form.password });
        let response: TokenResponse = self.execute(request, "token", false).await?;

        tracing::info!(
            token_type = response.token_type.as_deref().unwrap_or("bearer"),
            token_length = response.access_token.len(),
            "Login succeeded"
        );

        self.token
            .set(response.access_token.clone())
            .map_err(|err| ApiError::Unknown(format!("Failed to store access token: {err}")))?;
        Ok(response.access_token)
    }

    /// `GET /admin/results/`.
    pub(crate) async fn admin_results(&self) -> Result<Vec<StudentPayload>, ApiError> {
        let request = self.client.get(self.base_url.join("/admin/results/"));
        self.execute(request, "admin_results", true).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &'static str,
        authenticated: bool,
    ) -> Result<T, ApiError> {
        let request_id = Uuid::new_v4().to_string();
        let mut request = request.header("X-Request-Id", &request_id);

        if authenticated {
            match self.token.get() {
                Some(token) => request = request.bearer_auth(token),
                None => tracing::warn!(endpoint, "No access token available for request"),
            }
        }

        let started = Instant::now();
        let result = request.send().await;
        metrics::histogram!("api_request_duration_seconds", "endpoint" => endpoint)
            .record(started.elapsed().as_secs_f64());

        let response = result.map_err(|err| {
            ApiError::from_transport(&err, &format!("{endpoint} request failed"))
        })?;
        let status = response.status();

        if status.is_success() {
            tracing::debug!(endpoint, request_id, status = status.as_u16(), "API response");
            return response.json::<T>().await.map_err(|err| {
                ApiError::from_transport(&err, &format!("{endpoint} response invalid"))
            });
        }

        let raw_body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&raw_body)
            .ok()
            .and_then(|body| body.detail_text())
            .or_else(|| (!raw_body.trim().is_empty()).then(|| raw_body.trim().to_string()));
        let error = ApiError::from_response(status, detail);

        tracing::warn!(
            endpoint,
            request_id,
            status = status.as_u16(),
            code = error.code().as_str(),
            error = %error,
            "API request failed"
        );

        if matches!(error, ApiError::Unauthorized(_)) {
            self.token.discard();
        }

        Err(error)
    }
}

#[async_trait]
impl QuizApi for ApiClient {
    async fn fetch_quiz(&self) -> Result<QuizStatePayload, ApiError> {
        let request = self.client.get(self.base_url.join("/questions/"));
        let payload: QuizStatePayload = self.execute(request, "questions", true).await?;
        payload.validate().map_err(|errors| {
            ApiError::Unknown(format!("questions payload failed validation: {errors}"))
        })?;
        tracing::info!(
            question_count = payload.questions.len(),
            quiz_started_at = %payload.quiz_started_at,
            "Questions loaded"
        );
        Ok(payload)
    }

    async fn quiz_status(&self) -> Result<QuizStatusPayload, ApiError> {
        let request = self.client.get(self.base_url.join("/quiz-status"));
        self.execute(request, "quiz_status", true).await
    }

    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionResponse, ApiError> {
        let builder = self.client.post(self.base_url.join("/submit")).json(request);
        self.execute(builder, "submit", true).await
    }
}
