use crate::api::errors::{ApiError, ErrorCode};
use crate::schemas::quiz::{SubmissionRequest, SubmissionResponse};
use crate::services::session_state::{QuizSession, SessionError, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeMode {
    ManualSubmit,
    AutoDeadline,
}

impl FinalizeMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::ManualSubmit => "manual",
            Self::AutoDeadline => "auto_deadline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubmitDecision {
    Ready,
    /// 1-based numbers of the questions left unanswered.
    NeedsConfirmation(Vec<usize>),
}

#[derive(Debug)]
pub(crate) enum SubmissionOutcome {
    Completed { score: f64 },
    Locked { code: ErrorCode, message: String },
    ReauthenticationRequired,
    Failed { code: ErrorCode, message: String },
    Stale,
}

/// Guards the single outstanding `POST /submit` of a session and applies
/// its result.
#[derive(Debug, Default)]
pub(crate) struct SubmissionController {
    in_flight: bool,
    attempts: u32,
}

impl SubmissionController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a manual submission needs the candidate to confirm first.
    pub(crate) fn review(&self, session: &QuizSession) -> SubmitDecision {
        let unanswered = session.answers().unanswered_numbers(session.questions());
        if unanswered.is_empty() {
            SubmitDecision::Ready
        } else {
            SubmitDecision::NeedsConfirmation(unanswered)
        }
    }

    /// Claims the in-flight slot and builds the payload.
    ///
    /// A manual submit from `Active` takes the finalize latch itself. From
    /// `Finalizing` this is the automatic submission after the time-up notice
    /// or a retry after a recoverable failure.
    pub(crate) fn begin(
        &mut self,
        session: &mut QuizSession,
        mode: FinalizeMode,
    ) -> Result<SubmissionRequest, SessionError> {
        if self.in_flight {
            return Err(SessionError::SubmissionInFlight);
        }
        if !session.is_live() {
            return Err(SessionError::TornDown);
        }

        match session.state() {
            SessionState::Active => {
                if !session.begin_finalizing() {
                    return Err(SessionError::SubmitNotAllowed(session.state().as_str()));
                }
            }
            SessionState::Finalizing => {}
            other => return Err(SessionError::SubmitNotAllowed(other.as_str())),
        }

        let answers = session.answers().to_payload(session.questions());
        self.in_flight = true;
        self.attempts += 1;

        tracing::info!(
            mode = mode.as_str(),
            attempt = self.attempts,
            answered = session.answers().answered_count(),
            pairs = answers.len(),
            "Submitting quiz"
        );

        Ok(SubmissionRequest { answers })
    }

    /// Applies the server's response to a submission started by `begin`.
    pub(crate) fn complete(
        &mut self,
        session: &mut QuizSession,
        result: Result<SubmissionResponse, ApiError>,
    ) -> SubmissionOutcome {
        self.in_flight = false;

        if !session.is_live() || session.state() != SessionState::Finalizing {
            tracing::warn!(
                state = session.state().as_str(),
                live = session.is_live(),
                succeeded = result.is_ok(),
                "Dropping submission result for inactive session"
            );
            return SubmissionOutcome::Stale;
        }

        match result {
            Ok(response) => {
                session.complete(response.score);
                metrics::counter!("quiz_submissions_total", "outcome" => "success").increment(1);
                tracing::info!(score = response.score, message = %response.message, "Quiz submitted");
                SubmissionOutcome::Completed { score: response.score }
            }
            Err(err) if err.code().is_terminal() => {
                session.lock();
                metrics::counter!("quiz_submissions_total", "outcome" => "terminal").increment(1);
                tracing::warn!(code = err.code().as_str(), error = %err, "Submission rejected for good");
                SubmissionOutcome::Locked { code: err.code(), message: err.to_string() }
            }
            Err(ApiError::Unauthorized(detail)) => {
                metrics::counter!("quiz_submissions_total", "outcome" => "unauthorized").increment(1);
                tracing::warn!(detail = %detail, "Submission requires re-authentication");
                SubmissionOutcome::ReauthenticationRequired
            }
            Err(err) => {
                metrics::counter!("quiz_submissions_total", "outcome" => "recoverable").increment(1);
                tracing::warn!(code = err.code().as_str(), error = %err, "Submission failed; retry allowed");
                SubmissionOutcome::Failed { code: err.code(), message: err.to_string() }
            }
        }
    }
}
