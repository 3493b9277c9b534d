use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, sleep_until, Duration, Instant, MissedTickBehavior};

use crate::api::client::QuizApi;
use crate::api::errors::{ApiError, ErrorCode};
use crate::core::config::Settings;
use crate::core::shutdown::TeardownReason;
use crate::core::time::Clock;
use crate::models::{Question, QuestionId};
use crate::schemas::quiz::{QuizStatePayload, QuizStatusPayload, SubmissionResponse};
use crate::services::answer_store::AnswerStore;
use crate::services::guard_policy::{GuardPolicy, InputAction};
use crate::services::session_state::{
    LoadOutcome, QuizSession, ReconcileOutcome, SessionError, SessionState,
};
use crate::services::submission::{
    FinalizeMode, SubmissionController, SubmissionOutcome, SubmitDecision,
};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) enum SessionCommand {
    Select { question_id: QuestionId, letter: String },
    RequestSubmit,
    ConfirmSubmit,
    CancelSubmit,
    RetrySubmit,
    Input(InputAction),
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionEvent {
    Started {
        questions: Vec<Question>,
        question_count: usize,
        remaining_seconds: i64,
        restored_answers: usize,
    },
    Tick { remaining_seconds: i64 },
    AnswerChanged { question_id: QuestionId, selected: Vec<String> },
    ConfirmationRequired { unanswered: Vec<usize> },
    TimeUp { notice_seconds: u64 },
    SubmissionFailed { code: ErrorCode, message: String, retryable: bool },
    Completed { score: f64 },
    CompletedElsewhere,
    Locked { reason: String },
    LoadFailed { code: ErrorCode, message: String },
    ReauthenticationRequired,
    Suppressed(InputAction),
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RunnerConfig {
    pub(crate) reconcile_interval: Duration,
    pub(crate) time_up_notice: Duration,
}

impl RunnerConfig {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            reconcile_interval: Duration::from_secs(settings.quiz().reconcile_interval_seconds),
            time_up_notice: Duration::from_secs(settings.quiz().time_up_notice_seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RunSummary {
    pub(crate) state: SessionState,
    pub(crate) score: Option<f64>,
    pub(crate) reauthenticate: bool,
}

enum Completion {
    Fetched(Result<QuizStatePayload, ApiError>),
    Reconciled(Result<QuizStatusPayload, ApiError>),
    Submitted(Result<SubmissionResponse, ApiError>),
}

/// Owns one quiz session and drives it from a single task.
///
/// Network calls are spawned and report back through `completions`; every
/// state change happens inside the loop turn that observed its trigger.
pub(crate) struct SessionRunner {
    api: Arc<dyn QuizApi>,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
    session: QuizSession,
    controller: SubmissionController,
    guard: GuardPolicy,
    events: mpsc::UnboundedSender<SessionEvent>,
    completions: mpsc::UnboundedSender<Completion>,
    awaiting_confirmation: bool,
    expiry_handled: bool,
    auto_submit_scheduled: bool,
    reconcile_pending: bool,
    reauthenticate: bool,
    notice_deadline: Option<Instant>,
}

impl SessionRunner {
    /// Returns the runner plus the receiver its spawned calls report to.
    fn new(
        api: Arc<dyn QuizApi>,
        clock: Arc<dyn Clock>,
        store: AnswerStore,
        config: RunnerConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let runner = Self {
            api,
            clock,
            config,
            session: QuizSession::new(store),
            controller: SubmissionController::new(),
            guard: GuardPolicy::new(),
            events,
            completions,
            awaiting_confirmation: false,
            expiry_handled: false,
            auto_submit_scheduled: false,
            reconcile_pending: false,
            reauthenticate: false,
            notice_deadline: None,
        };
        (runner, completions_rx)
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Session event receiver dropped");
        }
    }

    fn is_finished(&self) -> bool {
        self.reauthenticate
            || self.session.state().is_terminal()
            || self.session.state() == SessionState::Error
    }

    fn sync_guard(&mut self) {
        if self.session.is_live() && self.session.state() == SessionState::Active {
            self.guard.attach();
        } else {
            self.guard.detach();
        }
    }

    fn spawn_fetch(&self) {
        let api = self.api.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = api.fetch_quiz().await;
            if tx.send(Completion::Fetched(result)).is_err() {
                tracing::debug!("Quiz fetch finished after session ended");
            }
        });
    }

    fn spawn_reconcile(&mut self) {
        self.reconcile_pending = true;
        let api = self.api.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = api.quiz_status().await;
            if tx.send(Completion::Reconciled(result)).is_err() {
                tracing::debug!("Reconciliation finished after session ended");
            }
        });
    }

    fn dispatch_submit(&mut self, mode: FinalizeMode) {
        let request = match self.controller.begin(&mut self.session, mode) {
            Ok(request) => request,
            Err(SessionError::SubmissionInFlight) => {
                tracing::debug!(mode = mode.as_str(), "Submission already in flight");
                return;
            }
            Err(err) => {
                tracing::debug!(mode = mode.as_str(), error = %err, "Submission not started");
                if mode == FinalizeMode::ManualSubmit {
                    self.emit(SessionEvent::Rejected { reason: err.to_string() });
                }
                return;
            }
        };
        self.sync_guard();

        let api = self.api.clone();
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let result = api.submit(&request).await;
            if tx.send(Completion::Submitted(result)).is_err() {
                tracing::debug!("Submission finished after session ended");
            }
        });
    }

    fn on_tick(&mut self) {
        if !matches!(self.session.state(), SessionState::Active | SessionState::Finalizing) {
            return;
        }
        let Some(remaining_seconds) = self.session.remaining_at(self.clock.now()) else {
            return;
        };
        self.emit(SessionEvent::Tick { remaining_seconds });

        if remaining_seconds == 0 && !self.expiry_handled {
            self.expiry_handled = true;
            self.on_expiry();
        }
    }

    fn on_expiry(&mut self) {
        if self.session.begin_finalizing() {
            self.schedule_auto_submit();
            return;
        }
        self.resume_auto_submit();
    }

    fn schedule_auto_submit(&mut self) {
        self.auto_submit_scheduled = true;
        self.awaiting_confirmation = false;
        self.sync_guard();
        tracing::info!(
            notice_seconds = self.config.time_up_notice.as_secs(),
            "Time is up; automatic submission scheduled"
        );
        self.emit(SessionEvent::TimeUp { notice_seconds: self.config.time_up_notice.as_secs() });
        self.notice_deadline = Some(Instant::now() + self.config.time_up_notice);
    }

    /// A manual submission that was in flight or failed at the deadline still
    /// gets one automatic attempt once it has settled.
    fn resume_auto_submit(&mut self) {
        if !self.auto_submit_scheduled
            && self.session.state() == SessionState::Finalizing
            && !self.controller.in_flight()
            && self.notice_deadline.is_none()
        {
            self.schedule_auto_submit();
        }
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Select { question_id, letter } => {
                match self.session.select(question_id, &letter) {
                    Ok(selected) => self.emit(SessionEvent::AnswerChanged {
                        question_id,
                        selected: selected.into_iter().collect(),
                    }),
                    Err(err) => self.emit(SessionEvent::Rejected { reason: err.to_string() }),
                }
            }
            SessionCommand::RequestSubmit => {
                if self.session.state() != SessionState::Active {
                    let err = SessionError::SubmitNotAllowed(self.session.state().as_str());
                    self.emit(SessionEvent::Rejected { reason: err.to_string() });
                    return;
                }
                match self.controller.review(&self.session) {
                    SubmitDecision::Ready => self.dispatch_submit(FinalizeMode::ManualSubmit),
                    SubmitDecision::NeedsConfirmation(unanswered) => {
                        self.awaiting_confirmation = true;
                        self.emit(SessionEvent::ConfirmationRequired { unanswered });
                    }
                }
            }
            SessionCommand::ConfirmSubmit => {
                if !std::mem::take(&mut self.awaiting_confirmation) {
                    self.emit(SessionEvent::Rejected {
                        reason: "no submission is awaiting confirmation".to_string(),
                    });
                    return;
                }
                self.dispatch_submit(FinalizeMode::ManualSubmit);
            }
            SessionCommand::CancelSubmit => {
                if !std::mem::take(&mut self.awaiting_confirmation) {
                    self.emit(SessionEvent::Rejected {
                        reason: "no submission is awaiting confirmation".to_string(),
                    });
                }
            }
            SessionCommand::RetrySubmit => {
                if self.session.state() != SessionState::Finalizing || self.notice_deadline.is_some()
                {
                    self.emit(SessionEvent::Rejected {
                        reason: format!(
                            "nothing to retry while the session is {}",
                            self.session.state().as_str()
                        ),
                    });
                    return;
                }
                self.dispatch_submit(FinalizeMode::ManualSubmit);
            }
            SessionCommand::Input(action) => {
                if self.guard.should_suppress(action) {
                    tracing::debug!(action = %action, "Input suppressed");
                    self.emit(SessionEvent::Suppressed(action));
                }
            }
            SessionCommand::Teardown => {}
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Fetched(result) => self.on_fetched(result),
            Completion::Reconciled(result) => self.on_reconciled(result),
            Completion::Submitted(result) => self.on_submitted(result),
        }
    }

    fn on_fetched(&mut self, result: Result<QuizStatePayload, ApiError>) {
        if !self.session.is_live() {
            return;
        }
        match self.session.load(result, self.clock.now()) {
            LoadOutcome::Active { question_count, remaining_seconds, restored_answers } => {
                self.sync_guard();
                self.emit(SessionEvent::Started {
                    questions: self.session.questions().to_vec(),
                    question_count,
                    remaining_seconds,
                    restored_answers,
                });
            }
            LoadOutcome::Locked { reason } => self.emit(SessionEvent::Locked { reason }),
            LoadOutcome::ReauthenticationRequired => {
                self.reauthenticate = true;
                self.emit(SessionEvent::ReauthenticationRequired);
            }
            LoadOutcome::Failed(err) => self.emit(SessionEvent::LoadFailed {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }

    fn on_reconciled(&mut self, result: Result<QuizStatusPayload, ApiError>) {
        self.reconcile_pending = false;
        let status = match result {
            Ok(status) => status,
            Err(err) => {
                metrics::counter!("quiz_reconcile_total", "outcome" => "error").increment(1);
                tracing::warn!(code = err.code().as_str(), error = %err, "Reconciliation failed");
                return;
            }
        };

        match self.session.apply_reconciliation(&status, self.controller.in_flight()) {
            ReconcileOutcome::CompletedElsewhere => {
                metrics::counter!("quiz_reconcile_total", "outcome" => "completed_elsewhere")
                    .increment(1);
                self.notice_deadline = None;
                self.awaiting_confirmation = false;
                self.sync_guard();
                self.emit(SessionEvent::CompletedElsewhere);
            }
            ReconcileOutcome::StillActive => {
                metrics::counter!("quiz_reconcile_total", "outcome" => "active").increment(1);
            }
            ReconcileOutcome::Ignored => {
                metrics::counter!("quiz_reconcile_total", "outcome" => "ignored").increment(1);
            }
        }
    }

    fn on_submitted(&mut self, result: Result<SubmissionResponse, ApiError>) {
        let outcome = self.controller.complete(&mut self.session, result);
        self.sync_guard();
        match outcome {
            SubmissionOutcome::Completed { score } => self.emit(SessionEvent::Completed { score }),
            SubmissionOutcome::Locked { code, message } => {
                self.emit(SessionEvent::SubmissionFailed {
                    code,
                    message: message.clone(),
                    retryable: false,
                });
                self.emit(SessionEvent::Locked { reason: message });
            }
            SubmissionOutcome::ReauthenticationRequired => {
                self.reauthenticate = true;
                self.emit(SessionEvent::ReauthenticationRequired);
            }
            SubmissionOutcome::Failed { code, message } => {
                self.emit(SessionEvent::SubmissionFailed { code, message, retryable: true });
                if self.session.remaining_at(self.clock.now()) == Some(0) {
                    self.expiry_handled = true;
                    self.resume_auto_submit();
                }
            }
            SubmissionOutcome::Stale => {}
        }
    }

    fn teardown(&mut self, reason: &str) {
        self.session.teardown();
        if self.guard.is_attached() {
            self.guard.detach();
        }
        self.notice_deadline = None;
        self.awaiting_confirmation = false;
        tracing::info!(
            reason,
            state = self.session.state().as_str(),
            submit_attempts = self.controller.attempts(),
            "Session runner stopped"
        );
        crate::core::metrics::log_snapshot();
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.session.state(),
            score: self.session.score(),
            reauthenticate: self.reauthenticate,
        }
    }
}

/// Runs one quiz session until it reaches an outcome, the command channel
/// closes, a `Teardown` command arrives or `shutdown` resolves.
pub(crate) async fn run_session(
    api: Arc<dyn QuizApi>,
    clock: Arc<dyn Clock>,
    store: AnswerStore,
    config: RunnerConfig,
    mut commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown: impl Future<Output = TeardownReason>,
) -> RunSummary {
    let (mut runner, mut completions) = SessionRunner::new(api, clock, store, config, events);
    tokio::pin!(shutdown);

    let mut tick = interval(TICK_PERIOD);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut reconcile =
        interval_at(Instant::now() + config.reconcile_interval, config.reconcile_interval);
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        reconcile_interval_seconds = config.reconcile_interval.as_secs(),
        notice_seconds = config.time_up_notice.as_secs(),
        "Session runner started"
    );
    runner.spawn_fetch();

    loop {
        if runner.is_finished() {
            runner.teardown("finished");
            break;
        }

        let ticking = matches!(
            runner.session.state(),
            SessionState::Active | SessionState::Finalizing
        );
        let can_reconcile = ticking && !runner.reconcile_pending && !runner.controller.in_flight();
        let notice_deadline = runner.notice_deadline;

        tokio::select! {
            reason = &mut shutdown => {
                runner.teardown(reason.as_str());
                break;
            }
            Some(completion) = completions.recv() => runner.on_completion(completion),
            command = commands.recv() => match command {
                Some(SessionCommand::Teardown) => {
                    runner.teardown(TeardownReason::Requested.as_str());
                    break;
                }
                Some(command) => runner.on_command(command),
                None => {
                    runner.teardown("commands closed");
                    break;
                }
            },
            _ = tick.tick(), if ticking => runner.on_tick(),
            _ = reconcile.tick(), if can_reconcile => runner.spawn_reconcile(),
            _ = async { if let Some(deadline) = notice_deadline { sleep_until(deadline).await } },
                if notice_deadline.is_some() =>
            {
                runner.notice_deadline = None;
                runner.dispatch_submit(FinalizeMode::AutoDeadline);
            }
        }
    }

    runner.summary()
}
