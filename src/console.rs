use std::fmt::Write;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::core::time::format_remaining;
use crate::models::Question;
use crate::services::guard_policy::InputAction;
use crate::tasks::runner::{SessionCommand, SessionEvent};

pub(crate) const HELP: &str = "Commands: <question> <letter> (e.g. `3 B`), submit, yes, no, retry, quit. \
Multi-select questions toggle the letter.";

/// Feeds stdin lines into a channel so prompts and session commands share one reader.
pub(crate) fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

pub(crate) async fn prompt(lines: &mut mpsc::Receiver<String>, label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    std::io::Write::flush(&mut std::io::stdout()).context("Failed to flush stdout")?;
    let line = lines.recv().await.context("stdin closed before input was read")?;
    Ok(line.trim().to_string())
}

pub(crate) fn parse_command(line: &str) -> Result<SessionCommand, String> {
    let line = line.trim();
    let lowered = line.to_ascii_lowercase();

    let command = match lowered.as_str() {
        "submit" | "s" => SessionCommand::RequestSubmit,
        "yes" | "y" | "confirm" => SessionCommand::ConfirmSubmit,
        "no" | "n" | "cancel" => SessionCommand::CancelSubmit,
        "retry" | "r" => SessionCommand::RetrySubmit,
        "quit" | "exit" | "q" => SessionCommand::Teardown,
        _ => {
            let mut parts = lowered.split_whitespace();
            let first = parts.next().ok_or_else(|| HELP.to_string())?;
            let first = if first == "select" {
                parts.next().ok_or_else(|| HELP.to_string())?
            } else {
                first
            };

            match (first.parse::<i64>(), parts.next(), parts.next()) {
                (Ok(question_id), Some(letter), None) => {
                    SessionCommand::Select { question_id, letter: letter.to_string() }
                }
                _ => match line.parse::<InputAction>() {
                    Ok(action) => SessionCommand::Input(action),
                    Err(_) => return Err(HELP.to_string()),
                },
            }
        }
    };

    Ok(command)
}

/// Text shown to the candidate for an event, if any.
pub(crate) fn render_event(event: &SessionEvent) -> Option<String> {
    let text = match event {
        SessionEvent::Started { questions, remaining_seconds, restored_answers, .. } => {
            let mut out = render_questions(questions);
            let _ = write!(out, "Time remaining: {}", format_remaining(*remaining_seconds));
            if *restored_answers > 0 {
                let _ = write!(out, " ({restored_answers} saved answers restored)");
            }
            let _ = write!(out, "\n{HELP}");
            out
        }
        SessionEvent::Tick { remaining_seconds } => {
            let remaining = *remaining_seconds;
            if remaining == 0 || (remaining > 10 && remaining % 60 != 0) {
                return None;
            }
            format!("Time remaining: {}", format_remaining(remaining))
        }
        SessionEvent::AnswerChanged { question_id, selected } => {
            if selected.is_empty() {
                format!("Question {question_id}: cleared")
            } else {
                format!("Question {question_id}: {}", selected.join(", "))
            }
        }
        SessionEvent::ConfirmationRequired { unanswered } => {
            let numbers: Vec<String> = unanswered.iter().map(ToString::to_string).collect();
            format!(
                "You have unanswered questions: {}. Submit anyway? (yes/no)",
                numbers.join(", ")
            )
        }
        SessionEvent::TimeUp { notice_seconds } => {
            format!("Time is up! Submitting your answers in {notice_seconds} seconds...")
        }
        SessionEvent::SubmissionFailed { message, retryable: true, .. } => {
            format!("Submission failed: {message}. Type `retry` to try again.")
        }
        SessionEvent::SubmissionFailed { message, retryable: false, .. } => {
            format!("Submission failed: {message}")
        }
        SessionEvent::Completed { score } => format!("Quiz submitted. Score: {score}"),
        SessionEvent::CompletedElsewhere => {
            "This quiz was already submitted from another session.".to_string()
        }
        SessionEvent::Locked { reason } => format!("Quiz locked: {reason}"),
        SessionEvent::LoadFailed { message, .. } => format!("Could not load the quiz: {message}"),
        SessionEvent::ReauthenticationRequired => {
            "Your session has expired. Please log in again.".to_string()
        }
        SessionEvent::Suppressed(action) => format!("{action} is disabled during the quiz."),
        SessionEvent::Rejected { reason } => reason.clone(),
    };
    Some(text)
}

fn render_questions(questions: &[Question]) -> String {
    let mut out = String::new();
    for (index, question) in questions.iter().enumerate() {
        let _ = writeln!(out, "\n{}. [id {}] {}", index + 1, question.id, question.prompt);
        if question.is_multi_select() {
            let _ = writeln!(out, "   (select all that apply)");
        }
        for (letter, option) in question.lettered_options() {
            let _ = writeln!(out, "   {letter}) {option}");
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::errors::ErrorCode;

    #[test]
    fn parses_selection_and_submit_commands() {
        assert!(matches!(
            parse_command("3 b"),
            Ok(SessionCommand::Select { question_id: 3, ref letter }) if letter == "b"
        ));
        assert!(matches!(
            parse_command("select 12 C"),
            Ok(SessionCommand::Select { question_id: 12, .. })
        ));
        assert!(matches!(parse_command(" Submit "), Ok(SessionCommand::RequestSubmit)));
        assert!(matches!(parse_command("yes"), Ok(SessionCommand::ConfirmSubmit)));
        assert!(matches!(parse_command("retry"), Ok(SessionCommand::RetrySubmit)));
        assert!(matches!(parse_command("quit"), Ok(SessionCommand::Teardown)));
    }

    #[test]
    fn parses_guarded_input() {
        assert!(matches!(parse_command("ctrl+c"), Ok(SessionCommand::Input(_))));
        assert!(matches!(parse_command("paste"), Ok(SessionCommand::Input(InputAction::Paste))));
        assert!(parse_command("what now").is_err());
        assert!(parse_command("").is_err());
    }

    #[test]
    fn ticks_are_rendered_sparingly() {
        assert_eq!(
            render_event(&SessionEvent::Tick { remaining_seconds: 600 }).as_deref(),
            Some("Time remaining: 10:00")
        );
        assert_eq!(render_event(&SessionEvent::Tick { remaining_seconds: 599 }), None);
        assert!(render_event(&SessionEvent::Tick { remaining_seconds: 7 }).is_some());
        assert_eq!(render_event(&SessionEvent::Tick { remaining_seconds: 0 }), None);
    }

    #[test]
    fn failures_mention_retry_only_when_recoverable() {
        let retryable = render_event(&SessionEvent::SubmissionFailed {
            code: ErrorCode::Network,
            message: "network error".to_string(),
            retryable: true,
        });
        assert!(retryable.is_some_and(|text| text.contains("retry")));

        let terminal = render_event(&SessionEvent::SubmissionFailed {
            code: ErrorCode::AlreadyCompleted,
            message: "You have already completed the quiz.".to_string(),
            retryable: false,
        });
        assert!(terminal.is_some_and(|text| !text.contains("retry")));
    }
}
