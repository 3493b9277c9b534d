use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct QuestionPayload {
    pub(crate) id: i64,
    pub(crate) question_text: String,
    #[validate(length(min = 1, message = "options must not be empty"))]
    pub(crate) options: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "correct_answers must not be empty"))]
    pub(crate) correct_answers: Vec<CorrectAnswerPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CorrectAnswerPayload {
    pub(crate) answer: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct QuizStatePayload {
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionPayload>,
    pub(crate) quiz_started_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QuizStatusPayload {
    #[serde(default)]
    pub(crate) quiz_started_at: Option<String>,
    #[serde(default)]
    pub(crate) submitted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct AnswerPayload {
    pub(crate) question_id: i64,
    pub(crate) selected_answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct SubmissionRequest {
    pub(crate) answers: Vec<AnswerPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubmissionResponse {
    #[serde(default)]
    pub(crate) message: String,
    pub(crate) score: f64,
}
