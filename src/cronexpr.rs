//! Pure functions over standard 5-field cron expressions.
//!
//! Validation and "next firing after t" are the only entry points; nothing
//! here holds state. Firing times are computed against the local wall clock.

use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use cron::Schedule;

use crate::errors::Error;

/// Checks that `expr` is a valid 5-field cron expression
/// (minute, hour, day-of-month, month, day-of-week).
pub fn validate(expr: &str) -> Result<(), Error> {
    parse(expr).map(|_| ())
}

/// The first firing time of `expr` strictly after `after`.
pub fn next_after(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, Error> {
    let schedule = parse(expr)?;
    schedule
        .after(&after.with_timezone(&Local))
        .next()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| invalid(expr, "no upcoming firing time"))
}

fn parse(expr: &str) -> Result<Schedule, Error> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(
            expr,
            &format!("expected 5 fields, found {}", fields.len()),
        ));
    }

    // The cron crate wants a seconds field; pin it to zero so the 5-field
    // grammar keeps its standard meaning.
    let normalized = format!("0 {}", fields.join(" "));
    Schedule::from_str(&normalized).map_err(|e| invalid(expr, &e.to_string()))
}

fn invalid(expr: &str, reason: &str) -> Error {
    Error::InvalidCron {
        expr: expr.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use claims::{assert_err, assert_ok};

    #[test]
    fn accepts_standard_expressions() {
        assert_ok!(validate("* * * * *"));
        assert_ok!(validate("*/5 * * * *"));
        assert_ok!(validate("0 9 * * MON-FRI"));
        assert_ok!(validate("15 14 1 * *"));
        assert_ok!(validate("0 0,12 1-15 * *"));
    }

    #[test]
    fn rejects_wrong_field_counts() {
        assert_err!(validate(""));
        assert_err!(validate("* * * *"));
        assert_err!(validate("* * * * * *"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert_err!(validate("60 * * * *"));
        assert_err!(validate("* 24 * * *"));
    }

    #[test]
    fn next_fire_is_the_upcoming_minute_boundary() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 15).unwrap();
        let next = next_after("* * * * *", t).unwrap();
        assert_eq!(next, t + chrono::Duration::seconds(45));
    }

    #[test]
    fn successive_fires_advance_strictly() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let first = next_after("*/1 * * * *", t).unwrap();
        let second = next_after("*/1 * * * *", first).unwrap();
        assert!(first > t);
        assert_eq!(second - first, chrono::Duration::seconds(60));
    }
}
