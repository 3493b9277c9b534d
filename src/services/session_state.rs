use std::collections::BTreeSet;

use thiserror::Error;
use time::OffsetDateTime;

use crate::api::errors::ApiError;
use crate::core::time::parse_server_instant;
use crate::models::{normalize_letter, AnswerSelection, Question, QuestionId};
use crate::schemas::quiz::{QuizStatePayload, QuizStatusPayload};
use crate::services::answer_store::AnswerStore;
use crate::services::session_clock::SessionClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Loading,
    Active,
    Finalizing,
    Completed,
    Locked,
    Error,
}

impl SessionState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Locked => "locked",
            Self::Error => "error",
        }
    }

    /// No mutation or network call is permitted from a terminal state.
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Locked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum SessionError {
    #[error("answers cannot change while the session is {0}")]
    NotActive(&'static str),
    #[error("question {0} is not part of this quiz")]
    UnknownQuestion(QuestionId),
    #[error("question {question_id} has no option {letter}")]
    UnknownOption { question_id: QuestionId, letter: String },
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("submission is not allowed while the session is {0}")]
    SubmitNotAllowed(&'static str),
    #[error("session has been torn down")]
    TornDown,
}

#[derive(Debug)]
pub(crate) enum LoadOutcome {
    Active { question_count: usize, remaining_seconds: i64, restored_answers: usize },
    Locked { reason: String },
    ReauthenticationRequired,
    Failed(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconcileOutcome {
    StillActive,
    CompletedElsewhere,
    Ignored,
}

/// The mutable record a quiz session revolves around.
///
/// `finalize_latched` flips together with the move out of `Active` and never
/// resets, so finalization is entered at most once however many triggers
/// observe the deadline.
pub(crate) struct QuizSession {
    state: SessionState,
    finalize_latched: bool,
    live: bool,
    questions: Vec<Question>,
    answers: AnswerSelection,
    clock: Option<SessionClock>,
    score: Option<f64>,
    store: AnswerStore,
}

impl QuizSession {
    pub(crate) fn new(store: AnswerStore) -> Self {
        Self {
            state: SessionState::Loading,
            finalize_latched: false,
            live: true,
            questions: Vec::new(),
            answers: AnswerSelection::default(),
            clock: None,
            score: None,
            store,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn is_live(&self) -> bool {
        self.live
    }

    pub(crate) fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub(crate) fn answers(&self) -> &AnswerSelection {
        &self.answers
    }

    pub(crate) fn score(&self) -> Option<f64> {
        self.score
    }

    pub(crate) fn remaining_at(&self, now: OffsetDateTime) -> Option<i64> {
        self.clock.map(|clock| clock.remaining_at(now))
    }

    /// Applies the result of `GET /questions/`.
    pub(crate) fn load(
        &mut self,
        fetched: Result<QuizStatePayload, ApiError>,
        now: OffsetDateTime,
    ) -> LoadOutcome {
        if self.state != SessionState::Loading {
            tracing::warn!(state = self.state.as_str(), "Ignoring quiz load outside loading state");
            return LoadOutcome::Failed(ApiError::Unknown("session already loaded".to_string()));
        }

        let payload = match fetched {
            Ok(payload) => payload,
            Err(ApiError::AlreadyCompleted(detail)) => {
                self.finalize_latched = true;
                self.state = SessionState::Locked;
                self.purge_store();
                tracing::info!(detail = %detail, "Quiz already completed; session locked");
                return LoadOutcome::Locked { reason: detail };
            }
            Err(ApiError::Unauthorized(detail)) => {
                self.state = SessionState::Error;
                tracing::warn!(detail = %detail, "Quiz load requires re-authentication");
                return LoadOutcome::ReauthenticationRequired;
            }
            Err(err) => {
                self.state = SessionState::Error;
                tracing::error!(error = %err, code = err.code().as_str(), "Failed to load quiz");
                return LoadOutcome::Failed(err);
            }
        };

        let Some(server_start) = parse_server_instant(&payload.quiz_started_at) else {
            self.state = SessionState::Error;
            let err = ApiError::Unknown(format!(
                "unreadable quiz_started_at: {}",
                payload.quiz_started_at
            ));
            tracing::error!(error = %err, "Failed to load quiz");
            return LoadOutcome::Failed(err);
        };

        // The server start is authoritative; the stored copy only mirrors it.
        let clock = SessionClock::from_server_start(server_start, now);
        if let Some(anchor) = self.store.load_anchor() {
            let persisted = SessionClock::from_anchor(anchor);
            if persisted.remaining_at(now) != clock.remaining_at(now) {
                tracing::info!(
                    persisted_remaining = persisted.remaining_at(now),
                    server_remaining = clock.remaining_at(now),
                    "Replacing stale persisted anchor with server start"
                );
            }
        }
        if let Err(err) = self.store.save_anchor(clock.anchor()) {
            tracing::error!(error = %err, "Failed to persist session anchor");
        }

        self.questions = payload.questions.into_iter().map(Question::from_payload).collect();
        self.answers = self.store.load_answers().restricted_to(&self.questions);
        self.clock = Some(clock);
        self.state = SessionState::Active;

        let remaining_seconds = clock.remaining_at(now);
        tracing::info!(
            question_count = self.questions.len(),
            restored_answers = self.answers.answered_count(),
            remaining_seconds,
            deadline = %clock.deadline(),
            "Quiz session active"
        );

        LoadOutcome::Active {
            question_count: self.questions.len(),
            remaining_seconds,
            restored_answers: self.answers.answered_count(),
        }
    }

    /// Records a candidate choice and persists the full answer map.
    pub(crate) fn select(
        &mut self,
        question_id: QuestionId,
        letter: &str,
    ) -> Result<BTreeSet<String>, SessionError> {
        if !self.live {
            return Err(SessionError::TornDown);
        }
        if self.state != SessionState::Active || self.finalize_latched {
            return Err(SessionError::NotActive(self.state.as_str()));
        }

        let question = self
            .questions
            .iter()
            .find(|question| question.id == question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;
        let letter = normalize_letter(letter)
            .filter(|letter| question.has_option(letter))
            .ok_or_else(|| SessionError::UnknownOption { question_id, letter: letter.to_string() })?;

        self.answers.apply(question, letter);
        self.persist_answers();

        Ok(self.answers.selected(question_id).cloned().unwrap_or_default())
    }

    /// Latches and moves `Active -> Finalizing`. Returns `false` if the
    /// latch was already taken or the session is not active.
    pub(crate) fn begin_finalizing(&mut self) -> bool {
        if !self.live || self.finalize_latched || self.state != SessionState::Active {
            return false;
        }
        self.finalize_latched = true;
        self.state = SessionState::Finalizing;
        self.persist_answers();
        tracing::info!("Session finalizing");
        true
    }

    pub(crate) fn complete(&mut self, score: f64) {
        self.finalize_latched = true;
        self.state = SessionState::Completed;
        self.score = Some(score);
        self.purge_store();
    }

    pub(crate) fn lock(&mut self) {
        self.finalize_latched = true;
        self.state = SessionState::Locked;
        self.purge_store();
    }

    /// Applies a `GET /quiz-status` result.
    ///
    /// Acts only while the candidate can still change the outcome locally:
    /// `Active`, or `Finalizing` with no submission outstanding.
    pub(crate) fn apply_reconciliation(
        &mut self,
        status: &QuizStatusPayload,
        submission_in_flight: bool,
    ) -> ReconcileOutcome {
        let actionable = self.live
            && (self.state == SessionState::Active
                || (self.state == SessionState::Finalizing && !submission_in_flight));
        if !actionable {
            tracing::debug!(
                state = self.state.as_str(),
                live = self.live,
                submission_in_flight,
                "Ignoring reconciliation result"
            );
            return ReconcileOutcome::Ignored;
        }

        let submitted = status
            .submitted_at
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty());
        if !submitted {
            return ReconcileOutcome::StillActive;
        }

        self.finalize_latched = true;
        self.state = SessionState::Completed;
        self.purge_store();
        tracing::info!(
            submitted_at = status.submitted_at.as_deref().unwrap_or_default(),
            "Quiz completed in another session"
        );
        ReconcileOutcome::CompletedElsewhere
    }

    /// Final save before the session goes away. Later completions see a dead
    /// session and are dropped.
    pub(crate) fn teardown(&mut self) {
        if !self.live {
            return;
        }
        if matches!(self.state, SessionState::Active | SessionState::Finalizing) {
            self.persist_answers();
        }
        self.live = false;
        tracing::info!(state = self.state.as_str(), "Session torn down");
    }

    fn persist_answers(&self) {
        if let Err(err) = self.store.save_answers(&self.answers) {
            tracing::error!(error = %err, "Failed to persist answers");
        }
    }

    fn purge_store(&self) {
        if let Err(err) = self.store.purge() {
            tracing::error!(error = %err, "Failed to purge persisted quiz state");
        }
    }
}
