//! Interval values such as `30s`, `5mn`, `1h30mn` or `2d`.

use std::time::Duration;

use crate::error::{Result, SchedulerError};

/// Parse an interval. Segments are summed; bare digits are seconds.
pub fn parse_period(value: &str) -> Result<Duration> {
    let invalid = |reason: &str| SchedulerError::InvalidInterval {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty value"));
    }

    let mut total: u64 = 0;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid("expected a number"));
        }
        let amount: u64 = rest[..digits]
            .parse()
            .map_err(|_| invalid("number out of range"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_len] {
            "" if total == 0 && unit_len == rest.len() => 1,
            "d" => 86_400,
            "h" => 3_600,
            "mn" | "min" => 60,
            "s" => 1,
            "" => return Err(invalid("missing unit")),
            _ => return Err(invalid("unknown unit (expected d, h, mn, min or s)")),
        };
        rest = &rest[unit_len..];

        total = amount
            .checked_mul(unit_secs)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| invalid("period too long"))?;
    }

    if total == 0 {
        return Err(invalid("period must be positive"));
    }
    Ok(Duration::from_secs(total))
}

/// `true` for the values that disable a schedule.
pub fn is_disabled(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("never")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_units() {
        assert_eq!(parse_period("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_period("5mn").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_period("5min").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_period("2h").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_period("1d").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn bare_digits_are_seconds() {
        assert_eq!(parse_period(" 45 ").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn segments_are_summed() {
        assert_eq!(parse_period("1h30mn").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_period("1d2h3mn4s").unwrap(), Duration::from_secs(93_784));
    }

    #[test]
    fn malformed_values_are_rejected() {
        for value in ["", "h", "10x", "1h30", "0s", "-5s", "1.5h"] {
            assert!(
                matches!(parse_period(value), Err(SchedulerError::InvalidInterval { .. })),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn never_disables() {
        assert!(is_disabled("never"));
        assert!(is_disabled("NEVER"));
        assert!(is_disabled("  "));
        assert!(!is_disabled("1h"));
    }
}
