use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use axum::Router;
use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::api::client::QuizApi;
use crate::api::errors::ApiError;
use crate::core::config::Settings;
use crate::core::time::Clock;
use crate::models::{Question, QuestionId};
use crate::schemas::quiz::{
    CorrectAnswerPayload, QuestionPayload, QuizStatePayload, QuizStatusPayload, SubmissionRequest,
    SubmissionResponse,
};

const RESET_VARS: [&str; 12] = [
    "MCQ_STRICT_CONFIG",
    "MCQ_EMAIL",
    "MCQ_PASSWORD",
    "MCQ_ADMIN_EMAIL",
    "MCQ_STATE_DIR",
    "MCQ_RECONCILE_INTERVAL_SECONDS",
    "MCQ_TIME_UP_NOTICE_SECONDS",
    "MCQ_REQUEST_TIMEOUT_SECONDS",
    "MCQ_CONNECT_TIMEOUT_SECONDS",
    "MCQ_LOG_LEVEL",
    "MCQ_LOG_JSON",
    "ENVIRONMENT",
];

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<AsyncMutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(AsyncMutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env(api_url: &str) {
    for var in RESET_VARS {
        std::env::remove_var(var);
    }
    std::env::set_var("MCQ_ENV", "test");
    std::env::set_var("MCQ_API_URL", api_url);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

pub(crate) async fn test_settings(api_url: &str) -> Settings {
    let _guard = env_lock().await;
    set_test_env(api_url);
    std::env::set_var("MCQ_REQUEST_TIMEOUT_SECONDS", "5");
    std::env::set_var("MCQ_CONNECT_TIMEOUT_SECONDS", "1");
    Settings::load().expect("test settings")
}

pub(crate) fn question(id: QuestionId, options: &str, correct: &[&str]) -> Question {
    Question::from_payload(question_payload(id, options, correct))
}

fn question_payload(id: QuestionId, options: &str, correct: &[&str]) -> QuestionPayload {
    QuestionPayload {
        id,
        question_text: format!("Question {id}"),
        options: options.to_string(),
        correct_answers: correct
            .iter()
            .map(|answer| CorrectAnswerPayload { answer: answer.to_string() })
            .collect(),
    }
}

/// Three questions with options `A`-`D`; question 2 is multi-select.
pub(crate) fn quiz_state(started_at: &str) -> QuizStatePayload {
    QuizStatePayload {
        questions: vec![
            question_payload(1, "Rust||Go||Java||C", &["A"]),
            question_payload(2, "Box||Vec||i32||Rc", &["B", "D"]),
            question_payload(3, "1||2||3||4", &["C"]),
        ],
        quiz_started_at: started_at.to_string(),
    }
}

/// Wall clock that follows tokio's (possibly paused) time from `base`, plus
/// any jumps applied with `advance`.
pub(crate) struct ManualClock {
    base: OffsetDateTime,
    started: tokio::time::Instant,
    jumped: Mutex<time::Duration>,
}

impl ManualClock {
    pub(crate) fn new(base: OffsetDateTime) -> Self {
        Self { base, started: tokio::time::Instant::now(), jumped: Mutex::new(time::Duration::ZERO) }
    }

    /// Moves wall time forward without letting tokio time pass, as a
    /// suspended process would observe on wake-up.
    pub(crate) fn advance(&self, by: time::Duration) {
        *self.jumped.lock().expect("clock lock") += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        let jumped = *self.jumped.lock().expect("clock lock");
        self.base + self.started.elapsed() + jumped
    }
}

/// Scripted in-process stand-in for the quiz API.
pub(crate) struct FakeQuizApi {
    fetch: Result<QuizStatePayload, ApiError>,
    status: Result<QuizStatusPayload, ApiError>,
    submit_results: Mutex<VecDeque<Result<SubmissionResponse, ApiError>>>,
    submit_delay: std::time::Duration,
    submitted: Mutex<Vec<SubmissionRequest>>,
    fetch_calls: AtomicUsize,
    status_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl FakeQuizApi {
    pub(crate) fn new() -> Self {
        Self {
            fetch: Err(ApiError::Unknown("no quiz scripted".to_string())),
            status: Ok(QuizStatusPayload { quiz_started_at: None, submitted_at: None }),
            submit_results: Mutex::new(VecDeque::new()),
            submit_delay: std::time::Duration::ZERO,
            submitted: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_quiz(mut self, quiz: QuizStatePayload) -> Self {
        self.fetch = Ok(quiz);
        self
    }

    pub(crate) fn with_fetch_error(mut self, err: ApiError) -> Self {
        self.fetch = Err(err);
        self
    }

    pub(crate) fn with_status(mut self, status: QuizStatusPayload) -> Self {
        self.status = Ok(status);
        self
    }

    pub(crate) fn with_status_error(mut self, err: ApiError) -> Self {
        self.status = Err(err);
        self
    }

    /// Queues the result of the next `submit`; once drained, submissions
    /// succeed with a score equal to the number of answer pairs.
    pub(crate) fn push_submit(self, result: Result<SubmissionResponse, ApiError>) -> Self {
        self.submit_results.lock().expect("submit results").push_back(result);
        self
    }

    pub(crate) fn with_submit_delay(mut self, delay: std::time::Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted(&self) -> Vec<SubmissionRequest> {
        self.submitted.lock().expect("submitted").clone()
    }
}

#[async_trait]
impl QuizApi for FakeQuizApi {
    async fn fetch_quiz(&self) -> Result<QuizStatePayload, ApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch.clone()
    }

    async fn quiz_status(&self) -> Result<QuizStatusPayload, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status.clone()
    }

    async fn submit(&self, request: &SubmissionRequest) -> Result<SubmissionResponse, ApiError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().expect("submitted").push(request.clone());
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        let scripted = self.submit_results.lock().expect("submit results").pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SubmissionResponse {
                message: "Quiz submitted successfully!".to_string(),
                score: request.answers.len() as f64,
            })
        })
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub(crate) async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!(error = %err, "Mock server stopped");
        }
    });
    format!("http://{addr}")
}
