use crate::models::{QuizResult, StudentRecord};

pub(crate) const MAX_TIME_SECONDS: f64 = 1200.0;
pub(crate) const MAX_RAW_SCORE: f64 = 25.0;

const FREE_TIME_FRACTION: f64 = 0.25;
const PENALTY_TIME_FRACTION: f64 = 0.75;

const QUIZ_WEIGHT: f64 = 0.5;
const ACADEMIC_WEIGHT: f64 = 0.3;
const SPEED_WEIGHT: f64 = 0.2;

/// Intermediate terms of the ranking metric, exposed for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoreBreakdown {
    pub(crate) time_penalty: f64,
    pub(crate) speed_score: f64,
    pub(crate) academic_score: f64,
    pub(crate) quiz_score: f64,
    pub(crate) normalized: f64,
}

/// Composite ranking metric; `None` when the student has not submitted.
///
/// Always recomputed from the record, never stored.
pub(crate) fn normalized_score(record: &StudentRecord) -> Option<f64> {
    breakdown(record).map(|terms| terms.normalized)
}

pub(crate) fn breakdown(record: &StudentRecord) -> Option<ScoreBreakdown> {
    let result = record.result.as_ref()?;
    Some(compute(
        result,
        record.cgpa.unwrap_or(0.0),
        record.tenth_percentage.unwrap_or(0.0),
        record.twelfth_percentage.unwrap_or(0.0),
    ))
}

/// The first quarter of the allowed time is free; the remaining three quarters
/// scale the penalty linearly up to 100%.
///
/// A negative `time_taken` is not clamped here and yields a speed score above 100.
fn compute(result: &QuizResult, cgpa: f64, tenth: f64, twelfth: f64) -> ScoreBreakdown {
    let time_taken = result.time_taken as f64;
    let time_penalty = ((time_taken - FREE_TIME_FRACTION * MAX_TIME_SECONDS)
        / (PENALTY_TIME_FRACTION * MAX_TIME_SECONDS))
        .max(0.0);
    let speed_score = (1.0 - time_penalty) * 100.0;
    let academic_score = (cgpa * 10.0 + tenth + twelfth) / 3.0;
    let quiz_score = (result.score / MAX_RAW_SCORE) * 100.0;
    let normalized =
        quiz_score * QUIZ_WEIGHT + academic_score * ACADEMIC_WEIGHT + speed_score * SPEED_WEIGHT;

    ScoreBreakdown { time_penalty, speed_score, academic_score, quiz_score, normalized }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(result: Option<(f64, i64)>) -> StudentRecord {
        StudentRecord {
            roll_no: "R1".to_string(),
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            tenth_percentage: Some(90.0),
            twelfth_percentage: Some(85.0),
            cgpa: Some(8.0),
            result: result.map(|(score, time_taken)| QuizResult {
                score,
                time_taken,
                submitted_at: datetime!(2025-01-02 10:20:30 UTC),
            }),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn reference_example() {
        let terms = breakdown(&record(Some((20.0, 300)))).expect("breakdown");
        assert_close(terms.time_penalty, 0.0);
        assert_close(terms.speed_score, 100.0);
        assert_close(terms.academic_score, 85.0);
        assert_close(terms.quiz_score, 80.0);
        assert_close(terms.normalized, 85.5);
    }

    #[test]
    fn not_available_without_result() {
        assert_eq!(normalized_score(&record(None)), None);
    }

    #[test]
    fn penalty_scales_linearly_to_full_time() {
        let full = breakdown(&record(Some((25.0, 1200)))).expect("breakdown");
        assert_close(full.time_penalty, 1.0);
        assert_close(full.speed_score, 0.0);

        let half = breakdown(&record(Some((25.0, 750)))).expect("breakdown");
        assert_close(half.time_penalty, 0.5);
        assert_close(half.speed_score, 50.0);
    }

    #[test]
    fn missing_academic_fields_count_as_zero() {
        let mut student = record(Some((25.0, 0)));
        student.cgpa = None;
        student.tenth_percentage = None;
        student.twelfth_percentage = None;
        let terms = breakdown(&student).expect("breakdown");
        assert_close(terms.academic_score, 0.0);
        assert_close(terms.normalized, 100.0 * 0.5 + 100.0 * 0.2);
        assert!(terms.normalized.is_finite());
    }
}
