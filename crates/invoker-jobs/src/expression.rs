//! Cron expression evaluation.
//!
//! Expressions use the six or seven field form `sec min hour dom month dow
//! [year]`. A standalone `?` (day-of-month / day-of-week placeholder) is
//! accepted and treated as `*`.
//!
//! Fields are matched against wall-clock time in the zone of the instant
//! passed in, so `0 0 2 * * ?` evaluated from a `DateTime<Local>` means 2 AM
//! on the host clock.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Timelike};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Upper bound on the one-second steps taken by [`CronExpression::next_invalid_after`].
const INVALID_SCAN_LIMIT: u32 = 86_400;

#[derive(Debug, Clone)]
pub struct CronExpression {
    source: String,
    schedule: Schedule,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self> {
        let normalized = expression
            .split_whitespace()
            .map(|field| if field == "?" { "*" } else { field })
            .collect::<Vec<_>>()
            .join(" ");
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: expression.to_string(),
            schedule,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First matching instant strictly after `after`.
    pub fn next_valid_after<Z: TimeZone>(&self, after: DateTime<Z>) -> Option<DateTime<Z>> {
        self.schedule.after(&after).next()
    }

    pub fn is_satisfied_by<Z: TimeZone>(&self, instant: DateTime<Z>) -> bool {
        instant.nanosecond() == 0
            && self.next_valid_after(instant.clone() - Duration::seconds(1)) == Some(instant)
    }

    /// First whole second strictly after `after` that does not match.
    /// `None` when every second of the next day matches.
    pub fn next_invalid_after<Z: TimeZone>(&self, after: DateTime<Z>) -> Option<DateTime<Z>> {
        let mut candidate =
            after.with_nanosecond(0).unwrap_or_else(|| after.clone()) + Duration::seconds(1);
        for _ in 0..INVALID_SCAN_LIMIT {
            if !self.is_satisfied_by(candidate.clone()) {
                return Some(candidate);
            }
            candidate = candidate + Duration::seconds(1);
        }
        None
    }

    /// Next execution instant for a job whose last plan was `previous`.
    ///
    /// When the instant computed from `now` is the one already planned (the job
    /// ran early), skip past the current matching window. The result is always
    /// strictly later than `previous`.
    pub fn plan_next<Z: TimeZone>(
        &self,
        now: DateTime<Z>,
        previous: Option<DateTime<Z>>,
    ) -> Option<DateTime<Z>> {
        let next = self.next_valid_after(now)?;
        if Some(&next) != previous.as_ref() {
            return Some(next);
        }
        self.next_invalid_after(next.clone())
            .and_then(|invalid| self.next_valid_after(invalid))
            .or_else(|| self.next_valid_after(next))
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn question_mark_fields_are_accepted() {
        let expr = CronExpression::parse("0 0 2 * * ?").expect("valid");
        assert_eq!(expr.next_valid_after(at(1, 0, 0)), Some(at(2, 0, 0)));
        assert_eq!(expr.to_string(), "0 0 2 * * ?");
    }

    #[test]
    fn fields_match_wall_clock_of_the_given_zone() {
        let expr = CronExpression::parse("0 0 2 * * ?").expect("valid");
        let paris = FixedOffset::east_opt(2 * 3_600).unwrap();
        let now = paris.with_ymd_and_hms(2024, 6, 1, 1, 0, 0).unwrap();

        let next = expr.next_valid_after(now).expect("next match");

        assert_eq!(next.hour(), 2);
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let err = CronExpression::parse("every tuesday").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn next_valid_is_strictly_after() {
        let expr = CronExpression::parse("0 0 12 * * *").unwrap();
        assert_eq!(expr.next_valid_after(at(12, 0, 0)), Some(at(12, 0, 0) + Duration::days(1)));
    }

    #[test]
    fn plan_without_previous_takes_next_match() {
        let expr = CronExpression::parse("0 0 12 * * *").unwrap();
        assert_eq!(expr.plan_next(at(11, 0, 0), None), Some(at(12, 0, 0)));
    }

    #[test]
    fn single_instant_dedup_moves_to_next_day() {
        let expr = CronExpression::parse("0 0 12 * * *").unwrap();
        let planned = at(12, 0, 0);

        // The job fired a little early and asks for its next slot.
        let next = expr.plan_next(at(11, 59, 58), Some(planned)).unwrap();

        assert!(next > planned);
        assert_eq!(next, planned + Duration::days(1));
    }

    #[test]
    fn every_minute_dedup_skips_one_window() {
        let expr = CronExpression::parse("0 * * * * *").unwrap();
        let planned = at(10, 15, 0);

        let next = expr.plan_next(at(10, 14, 59), Some(planned)).unwrap();

        assert_eq!(next, at(10, 16, 0));
    }

    #[test]
    fn every_second_dedup_is_still_strictly_later() {
        let expr = CronExpression::parse("* * * * * *").unwrap();
        let planned = at(8, 0, 1);

        let next = expr.plan_next(at(8, 0, 0), Some(planned)).unwrap();

        assert!(next > planned);
        assert_eq!(next, at(8, 0, 2));
    }

    #[test]
    fn next_invalid_after_finds_gap() {
        let expr = CronExpression::parse("0-9 0 12 * * *").unwrap();
        assert_eq!(expr.next_invalid_after(at(12, 0, 0)), Some(at(12, 0, 10)));
        assert!(expr.is_satisfied_by(at(12, 0, 9)));
        assert!(!expr.is_satisfied_by(at(12, 0, 10)));
    }

    #[test]
    fn past_only_expression_has_no_future_match() {
        let expr = CronExpression::parse("0 0 0 1 1 * 2000").unwrap();
        assert_eq!(expr.plan_next(Utc::now(), None), None);
    }
}
