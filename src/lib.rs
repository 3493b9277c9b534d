pub(crate) mod api;
pub(crate) mod console;
pub(crate) mod core;
pub(crate) mod models;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use crate::core::config::Settings;
use crate::core::context::SessionContext;
use crate::core::security;
use crate::core::time::SystemClock;
use crate::core::{shutdown, telemetry};
use crate::models::StudentRecord;
use crate::schemas::auth::LoginForm;
use crate::services::answer_store::{FileStore, KeyValueStore};
use crate::services::ranking;
use crate::tasks::runner::{self, RunnerConfig, SessionCommand, SessionEvent};

const MAX_LOGIN_ATTEMPTS: usize = 3;

fn bootstrap() -> anyhow::Result<Settings> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;
    Ok(settings)
}

fn open_context(settings: Settings) -> anyhow::Result<SessionContext> {
    let kv: Arc<dyn KeyValueStore> = Arc::new(
        FileStore::open(&settings.storage().state_dir)
            .with_context(|| format!("Failed to open state dir {}", settings.storage().state_dir))?,
    );
    SessionContext::new(settings, kv, Arc::new(SystemClock))
}

/// Returns the authenticated subject, logging in when no usable token is stored.
async fn authenticate(
    context: &SessionContext,
    mut lines: Option<&mut mpsc::Receiver<String>>,
) -> anyhow::Result<String> {
    if let Some(subject) = context.authenticated_subject() {
        tracing::info!(subject = %subject, "Reusing stored access token");
        return Ok(subject);
    }

    let credentials = context.settings().credentials();
    for attempt in 1..=MAX_LOGIN_ATTEMPTS {
        let form = match (&credentials.email, &credentials.password, lines.as_deref_mut()) {
            (Some(email), Some(password), _) if attempt == 1 => {
                LoginForm { email: email.clone(), password: password.clone() }
            }
            (_, _, Some(lines)) => LoginForm {
                email: console::prompt(lines, "Email").await?,
                password: console::prompt(lines, "Password").await?,
            },
            _ => anyhow::bail!("MCQ_EMAIL and MCQ_PASSWORD are required to log in"),
        };

        match context.api().login(&form).await {
            Ok(token) => {
                let subject = match security::inspect_token(&token, context.clock().now()) {
                    Ok(claims) => claims.sub,
                    Err(err) => {
                        tracing::warn!(error = %err, "Issued token unreadable; using login email");
                        form.email.trim().to_string()
                    }
                };
                return Ok(subject);
            }
            Err(err) => {
                tracing::warn!(attempt, code = err.code().as_str(), error = %err, "Login failed");
                if lines.is_none() {
                    anyhow::bail!("login failed: {err}");
                }
                println!("Login failed: {err}");
            }
        }
    }

    anyhow::bail!("login failed after {MAX_LOGIN_ATTEMPTS} attempts")
}

async fn fetch_ranked(context: &SessionContext) -> anyhow::Result<Vec<ranking::RankedStudent>> {
    let students = context.api().admin_results().await.context("Failed to fetch admin results")?;
    let records = students.into_iter().map(StudentRecord::from_payload).collect();
    Ok(ranking::rank_students(records, |email| context.settings().is_admin_email(email)))
}

/// Logs in as the administrator and renders the ranked results table.
pub async fn results_report() -> anyhow::Result<String> {
    let settings = Settings::load()?;
    let context = open_context(settings)?;
    report_for(&context).await
}

async fn report_for(context: &SessionContext) -> anyhow::Result<String> {
    let subject = authenticate(context, None).await?;
    if !context.settings().is_admin_email(&subject) {
        anyhow::bail!("{subject} is not the administrator account");
    }
    let rows = fetch_ranked(context).await?;
    tracing::info!(
        students = rows.len(),
        submitted = rows.iter().filter(|row| row.normalized.is_some()).count(),
        "Results ranked"
    );
    Ok(ranking::render_table(&rows))
}

pub async fn run_results() -> anyhow::Result<()> {
    let settings = bootstrap()?;
    let context = open_context(settings)?;
    let report = report_for(&context).await?;
    print!("{report}");
    Ok(())
}

/// Forwards parsed stdin lines to the session until the runner stops, then
/// hands the line reader back.
async fn forward_commands(
    mut lines: mpsc::Receiver<String>,
    commands: mpsc::Sender<SessionCommand>,
) -> mpsc::Receiver<String> {
    loop {
        tokio::select! {
            _ = commands.closed() => break,
            line = lines.recv() => {
                let Some(line) = line else {
                    // stdin closed: leave the session as if the window were closed.
                    if commands.send(SessionCommand::Teardown).await.is_err() {
                        tracing::debug!("Session runner stopped before stdin closed");
                    }
                    break;
                };
                match console::parse_command(&line) {
                    Ok(command) => {
                        if commands.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(help) => println!("{help}"),
                }
            }
        }
    }
    lines
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        if let Some(text) = console::render_event(&event) {
            println!("{text}");
        }
    }
}

/// Entry point of the candidate client: log in, then either run the quiz
/// session or, for the administrator, print the results report.
pub async fn run() -> anyhow::Result<()> {
    let settings = bootstrap()?;
    let context = open_context(settings)?;
    let mut lines = console::spawn_stdin_reader();

    tracing::info!(
        environment = context.settings().runtime().environment.as_str(),
        api_url = context.settings().api().base_url.as_str(),
        "MCQ client starting"
    );

    for _ in 0..MAX_LOGIN_ATTEMPTS {
        let subject = authenticate(&context, Some(&mut lines)).await?;
        if context.settings().is_admin_email(&subject) {
            let rows = fetch_ranked(&context).await?;
            print!("{}", ranking::render_table(&rows));
            return Ok(());
        }

        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_events(events_rx));
        let forwarder = tokio::spawn(forward_commands(lines, commands_tx));

        let summary = runner::run_session(
            Arc::new(context.api().clone()),
            context.clock(),
            context.store().clone(),
            RunnerConfig::from_settings(context.settings()),
            commands_rx,
            events_tx,
            shutdown::teardown_signal(),
        )
        .await;

        lines = forwarder.await.context("Command forwarder failed")?;
        printer.await.context("Event printer failed")?;

        tracing::info!(
            state = summary.state.as_str(),
            score = summary.score,
            reauthenticate = summary.reauthenticate,
            "Quiz session finished"
        );
        if !summary.reauthenticate {
            return Ok(());
        }
        context.token().discard();
    }

    anyhow::bail!("re-authentication limit reached")
}
