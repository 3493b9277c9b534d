use time::{Duration, OffsetDateTime};

/// Length of the quiz period.
pub(crate) const QUIZ_DURATION_SECONDS: i64 = 1200;

/// Remaining time derived from a single fixed anchor instant.
///
/// `remaining_at` is recomputed from the anchor on every call and never
/// decremented from a previous value, so missed ticks or a suspended process
/// cannot make the countdown drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SessionClock {
    anchor: OffsetDateTime,
    duration: Duration,
}

impl SessionClock {
    pub(crate) fn from_anchor(anchor: OffsetDateTime) -> Self {
        Self { anchor, duration: Duration::seconds(QUIZ_DURATION_SECONDS) }
    }

    /// Reconstructs the anchor from the first observed remaining time as
    /// `now - (D - remaining)`.
    pub(crate) fn from_remaining(remaining_seconds: i64, now: OffsetDateTime) -> Self {
        let remaining = remaining_seconds.clamp(0, QUIZ_DURATION_SECONDS);
        Self::from_anchor(now - Duration::seconds(QUIZ_DURATION_SECONDS - remaining))
    }

    /// Anchor derived from the server-reported quiz start.
    pub(crate) fn from_server_start(started_at: OffsetDateTime, now: OffsetDateTime) -> Self {
        Self::from_remaining(remaining_between(started_at, now, QUIZ_DURATION_SECONDS), now)
    }

    pub(crate) fn anchor(&self) -> OffsetDateTime {
        self.anchor
    }

    pub(crate) fn deadline(&self) -> OffsetDateTime {
        self.anchor + self.duration
    }

    /// `max(0, D - (now - anchor))` in whole seconds.
    pub(crate) fn remaining_at(&self, now: OffsetDateTime) -> i64 {
        remaining_between(self.anchor, now, self.duration.whole_seconds())
    }
}

fn remaining_between(anchor: OffsetDateTime, now: OffsetDateTime, duration_seconds: i64) -> i64 {
    let elapsed = (now - anchor).whole_seconds();
    (duration_seconds - elapsed).clamp(0, duration_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const START: OffsetDateTime = datetime!(2025-01-02 10:00:00 UTC);

    #[test]
    fn remaining_counts_down_from_anchor() {
        let clock = SessionClock::from_anchor(START);
        assert_eq!(clock.remaining_at(START), 1200);
        assert_eq!(clock.remaining_at(START + Duration::seconds(1)), 1199);
        assert_eq!(clock.remaining_at(START + Duration::milliseconds(1999)), 1199);
        assert_eq!(clock.deadline(), START + Duration::seconds(1200));
    }

    #[test]
    fn suspended_clock_jumping_forward_reports_zero() {
        let clock = SessionClock::from_anchor(START);
        let mut now = START + Duration::seconds(5);
        assert_eq!(clock.remaining_at(now), 1195);

        // No ticks for an hour; the next observation is still exact.
        now += Duration::hours(1);
        assert_eq!(clock.remaining_at(now), 0);
        assert!(clock.deadline() < now);

        for extra in [0, 1, 59, 86_400] {
            assert_eq!(clock.remaining_at(START + Duration::seconds(1200 + extra)), 0);
        }
    }

    #[test]
    fn resumed_tab_reports_exact_remaining() {
        let clock = SessionClock::from_anchor(START);
        assert_eq!(clock.remaining_at(START + Duration::seconds(700)), 500);
    }

    #[test]
    fn anchor_is_reconstructed_from_remaining() {
        let now = START + Duration::seconds(300);
        let clock = SessionClock::from_remaining(900, now);
        assert_eq!(clock.anchor(), START);
        assert_eq!(clock.remaining_at(now), 900);
    }

    #[test]
    fn server_start_in_the_past_is_clamped() {
        let now = START + Duration::hours(2);
        let clock = SessionClock::from_server_start(START, now);
        assert_eq!(clock.remaining_at(now), 0);
        assert_eq!(clock.anchor(), now - Duration::seconds(1200));
    }

    #[test]
    fn server_start_slightly_in_the_future_does_not_extend_the_quiz() {
        let now = START;
        let clock = SessionClock::from_server_start(START + Duration::seconds(4), now);
        assert_eq!(clock.remaining_at(now), 1200);
    }
}
