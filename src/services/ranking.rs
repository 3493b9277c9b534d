use std::cmp::Ordering;
use std::fmt::Write;

use crate::core::time::format_offset;
use crate::models::StudentRecord;
use crate::services::score_normalizer::{breakdown, normalized_score};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RankedStudent {
    /// 1-based; `None` for students without a submitted result.
    pub(crate) rank: Option<usize>,
    pub(crate) record: StudentRecord,
    pub(crate) normalized: Option<f64>,
}

/// Orders students by normalized score, best first. Students without a
/// result go last; ties are broken by name.
pub(crate) fn rank_students(
    records: Vec<StudentRecord>,
    is_admin: impl Fn(&str) -> bool,
) -> Vec<RankedStudent> {
    let mut rows: Vec<RankedStudent> = records
        .into_iter()
        .filter(|record| !is_admin(&record.email))
        .map(clamp_time_taken)
        .map(|record| {
            if let Some(terms) = breakdown(&record) {
                tracing::debug!(
                    roll_no = %record.roll_no,
                    time_penalty = terms.time_penalty,
                    speed_score = terms.speed_score,
                    academic_score = terms.academic_score,
                    quiz_score = terms.quiz_score,
                    normalized = terms.normalized,
                    "Score breakdown"
                );
            }
            let normalized = normalized_score(&record);
            RankedStudent { rank: None, record, normalized }
        })
        .collect();

    rows.sort_by(|a, b| {
        compare_scores(a.normalized, b.normalized)
            .then_with(|| a.record.name.to_lowercase().cmp(&b.record.name.to_lowercase()))
            .then_with(|| a.record.roll_no.cmp(&b.record.roll_no))
    });

    let mut next_rank = 1;
    for row in rows.iter_mut().filter(|row| row.normalized.is_some()) {
        row.rank = Some(next_rank);
        next_rank += 1;
    }

    rows
}

fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn clamp_time_taken(mut record: StudentRecord) -> StudentRecord {
    if let Some(result) = record.result.as_mut() {
        if result.time_taken < 0 {
            tracing::warn!(
                roll_no = %record.roll_no,
                time_taken = result.time_taken,
                "Clamping negative time_taken to zero"
            );
            result.time_taken = 0;
        }
    }
    record
}

fn format_optional(value: Option<f64>, precision: usize) -> String {
    value.map(|v| format!("{v:.precision$}")).unwrap_or_else(|| "N/A".to_string())
}

pub(crate) fn render_table(rows: &[RankedStudent]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<5} {:<12} {:<24} {:>6} {:>6} {:>6} {:>6} {:>8} {:>11}  {}",
        "Rank", "Roll No", "Name", "10th", "12th", "CGPA", "Score", "Time(s)", "Normalized", "Submitted"
    );

    for row in rows {
        let record = &row.record;
        let result = record.result.as_ref();
        let _ = writeln!(
            out,
            "{:<5} {:<12} {:<24} {:>6} {:>6} {:>6} {:>6} {:>8} {:>11}  {}",
            row.rank.map(|rank| rank.to_string()).unwrap_or_else(|| "-".to_string()),
            record.roll_no,
            record.name,
            format_optional(record.tenth_percentage, 1),
            format_optional(record.twelfth_percentage, 1),
            format_optional(record.cgpa, 2),
            format_optional(result.map(|r| r.score), 0),
            result.map(|r| r.time_taken.to_string()).unwrap_or_else(|| "N/A".to_string()),
            format_optional(row.normalized, 2),
            result.map(|r| format_offset(r.submitted_at)).unwrap_or_else(|| "N/A".to_string()),
        );
    }

    out
}
