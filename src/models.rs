use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::time::parse_server_instant;
use crate::schemas::quiz::{AnswerPayload, QuestionPayload};
use crate::schemas::student::StudentPayload;

pub(crate) type QuestionId = i64;

const OPTION_SEPARATOR: &str = "||";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Question {
    pub(crate) id: QuestionId,
    pub(crate) prompt: String,
    pub(crate) options: Vec<String>,
    pub(crate) correct: BTreeSet<String>,
}

impl Question {
    pub(crate) fn from_payload(payload: QuestionPayload) -> Self {
        let options = payload
            .options
            .split(OPTION_SEPARATOR)
            .map(|option| option.trim().to_string())
            .filter(|option| !option.is_empty())
            .collect();
        let correct = payload
            .correct_answers
            .into_iter()
            .filter_map(|answer| normalize_letter(&answer.answer))
            .collect();

        Self { id: payload.id, prompt: payload.question_text, options, correct }
    }

    pub(crate) fn is_multi_select(&self) -> bool {
        self.correct.len() > 1
    }

    pub(crate) fn has_option(&self, letter: &str) -> bool {
        letter_index(letter).is_some_and(|index| index < self.options.len())
    }

    pub(crate) fn lettered_options(&self) -> impl Iterator<Item = (String, &str)> {
        self.options.iter().enumerate().map(|(index, option)| (option_letter(index), option.as_str()))
    }
}

pub(crate) fn option_letter(index: usize) -> String {
    char::from(b'A' + (index % 26) as u8).to_string()
}

/// Upper-cases a single option letter; anything else is rejected.
pub(crate) fn normalize_letter(raw: &str) -> Option<String> {
    let mut chars = raw.trim().chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_alphabetic() {
        return None;
    }
    Some(letter.to_ascii_uppercase().to_string())
}

fn letter_index(letter: &str) -> Option<usize> {
    let byte = *normalize_letter(letter)?.as_bytes().first()?;
    Some(usize::from(byte - b'A'))
}

/// The candidate's current choices. Unanswered questions have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AnswerSelection {
    selected: BTreeMap<QuestionId, BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PersistedAnswer {
    pub(crate) question_id: QuestionId,
    pub(crate) selected_answers: Vec<String>,
}

impl AnswerSelection {
    pub(crate) fn selected(&self, question_id: QuestionId) -> Option<&BTreeSet<String>> {
        self.selected.get(&question_id)
    }

    pub(crate) fn is_answered(&self, question_id: QuestionId) -> bool {
        self.selected.get(&question_id).is_some_and(|letters| !letters.is_empty())
    }

    pub(crate) fn answered_count(&self) -> usize {
        self.selected.values().filter(|letters| !letters.is_empty()).count()
    }

    /// Toggles `letter` for multi-select questions and replaces the choice otherwise.
    pub(crate) fn apply(&mut self, question: &Question, letter: String) {
        if question.is_multi_select() {
            let letters = self.selected.entry(question.id).or_default();
            if !letters.remove(&letter) {
                letters.insert(letter);
            }
            if letters.is_empty() {
                self.selected.remove(&question.id);
            }
        } else {
            self.selected.insert(question.id, BTreeSet::from([letter]));
        }
    }

    /// Keeps only the entries whose question is part of `questions`.
    pub(crate) fn restricted_to(&self, questions: &[Question]) -> Self {
        let selected = questions
            .iter()
            .filter_map(|question| {
                let letters: BTreeSet<String> = self
                    .selected
                    .get(&question.id)?
                    .iter()
                    .filter(|letter| question.has_option(letter))
                    .cloned()
                    .collect();
                (!letters.is_empty()).then_some((question.id, letters))
            })
            .collect();
        Self { selected }
    }

    /// One `(question, letter)` pair per chosen letter, in question order.
    pub(crate) fn to_payload(&self, questions: &[Question]) -> Vec<AnswerPayload> {
        questions
            .iter()
            .filter_map(|question| self.selected.get(&question.id).map(|letters| (question.id, letters)))
            .flat_map(|(question_id, letters)| {
                letters.iter().map(move |letter| AnswerPayload {
                    question_id,
                    selected_answer: letter.clone(),
                })
            })
            .collect()
    }

    /// 1-based positions of questions without a selection.
    pub(crate) fn unanswered_numbers(&self, questions: &[Question]) -> Vec<usize> {
        questions
            .iter()
            .enumerate()
            .filter(|(_, question)| !self.is_answered(question.id))
            .map(|(index, _)| index + 1)
            .collect()
    }

    pub(crate) fn to_persisted(&self) -> Vec<PersistedAnswer> {
        self.selected
            .iter()
            .filter(|(_, letters)| !letters.is_empty())
            .map(|(question_id, letters)| PersistedAnswer {
                question_id: *question_id,
                selected_answers: letters.iter().cloned().collect(),
            })
            .collect()
    }

    pub(crate) fn from_persisted(entries: Vec<PersistedAnswer>) -> Self {
        let selected = entries
            .into_iter()
            .map(|entry| {
                let letters: BTreeSet<String> =
                    entry.selected_answers.iter().filter_map(|letter| normalize_letter(letter)).collect();
                (entry.question_id, letters)
            })
            .filter(|(_, letters)| !letters.is_empty())
            .collect();
        Self { selected }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuizResult {
    pub(crate) score: f64,
    pub(crate) time_taken: i64,
    pub(crate) submitted_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StudentRecord {
    pub(crate) roll_no: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) tenth_percentage: Option<f64>,
    pub(crate) twelfth_percentage: Option<f64>,
    pub(crate) cgpa: Option<f64>,
    pub(crate) result: Option<QuizResult>,
}

impl StudentRecord {
    /// The server opens a result row when the quiz starts; it only counts as a
    /// result once `submitted_at` is set.
    pub(crate) fn from_payload(payload: StudentPayload) -> Self {
        let result = payload.result.and_then(|result| {
            let submitted_at = parse_server_instant(result.submitted_at.as_deref()?)?;
            Some(QuizResult {
                score: result.score.unwrap_or(0.0),
                time_taken: result.time_taken.unwrap_or(0),
                submitted_at,
            })
        });

        Self {
            roll_no: payload.roll_no,
            name: payload.full_name,
            email: payload.email,
            tenth_percentage: payload.tenth_percentage,
            twelfth_percentage: payload.twelfth_percentage,
            cgpa: payload.cgpa,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::quiz::CorrectAnswerPayload;
    use crate::schemas::student::ResultPayload;

    fn question(id: QuestionId, correct: &[&str]) -> Question {
        Question::from_payload(QuestionPayload {
            id,
            question_text: format!("Question {id}"),
            options: "first || second ||third||fourth".to_string(),
            correct_answers: correct
                .iter()
                .map(|answer| CorrectAnswerPayload { answer: answer.to_string() })
                .collect(),
        })
    }

    #[test]
    fn options_are_split_and_lettered() {
        let q = question(1, &["A"]);
        assert_eq!(q.options, vec!["first", "second", "third", "fourth"]);
        let lettered: Vec<_> = q.lettered_options().map(|(letter, _)| letter).collect();
        assert_eq!(lettered, vec!["A", "B", "C", "D"]);
        assert!(q.has_option("d"));
        assert!(!q.has_option("E"));
        assert!(!q.has_option("AB"));
    }

    #[test]
    fn single_select_replaces_choice() {
        let q = question(1, &["A"]);
        let mut answers = AnswerSelection::default();
        answers.apply(&q, "A".to_string());
        answers.apply(&q, "C".to_string());
        assert_eq!(answers.selected(1), Some(&BTreeSet::from(["C".to_string()])));
    }

    #[test]
    fn multi_select_toggles_membership() {
        let q = question(6, &["A", "C"]);
        assert!(q.is_multi_select());
        let mut answers = AnswerSelection::default();
        answers.apply(&q, "A".to_string());
        answers.apply(&q, "C".to_string());
        answers.apply(&q, "A".to_string());
        assert_eq!(answers.selected(6), Some(&BTreeSet::from(["C".to_string()])));

        answers.apply(&q, "C".to_string());
        assert!(!answers.is_answered(6));
        assert_eq!(answers.answered_count(), 0);
    }

    #[test]
    fn payload_flattens_multi_select_and_skips_unanswered() {
        let questions = vec![question(1, &["A"]), question(2, &["B", "C"]), question(3, &["D"])];
        let mut answers = AnswerSelection::default();
        answers.apply(&questions[0], "A".to_string());
        answers.apply(&questions[1], "B".to_string());
        answers.apply(&questions[1], "C".to_string());

        let payload = answers.to_payload(&questions);
        let pairs: Vec<_> =
            payload.iter().map(|a| (a.question_id, a.selected_answer.as_str())).collect();
        assert_eq!(pairs, vec![(1, "A"), (2, "B"), (2, "C")]);
        assert_eq!(answers.unanswered_numbers(&questions), vec![3]);
    }

    #[test]
    fn restore_drops_unknown_questions_and_letters() {
        let questions = vec![question(1, &["A"]), question(2, &["B", "C"])];
        let restored = AnswerSelection::from_persisted(vec![
            PersistedAnswer { question_id: 1, selected_answers: vec!["a".to_string()] },
            PersistedAnswer { question_id: 2, selected_answers: vec!["Z".to_string()] },
            PersistedAnswer { question_id: 99, selected_answers: vec!["B".to_string()] },
        ])
        .restricted_to(&questions);

        assert_eq!(restored.answered_count(), 1);
        assert_eq!(restored.selected(1), Some(&BTreeSet::from(["A".to_string()])));
    }

    #[test]
    fn started_but_unsubmitted_result_is_absent() {
        let payload = StudentPayload {
            id: Some(7),
            roll_no: "R7".to_string(),
            full_name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            cgpa: Some(8.0),
            tenth_percentage: Some(90.0),
            twelfth_percentage: Some(85.0),
            result: Some(ResultPayload { score: None, time_taken: None, submitted_at: None }),
        };
        assert!(StudentRecord::from_payload(payload.clone()).result.is_none());

        let submitted = StudentPayload {
            result: Some(ResultPayload {
                score: Some(20.0),
                time_taken: Some(300),
                submitted_at: Some("2025-01-02T10:20:30".to_string()),
            }),
            ..payload
        };
        let record = StudentRecord::from_payload(submitted);
        let result = record.result.expect("result");
        assert_eq!(result.score, 20.0);
        assert_eq!(result.time_taken, 300);
    }
}
