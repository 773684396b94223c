//! Argument parsers shared by command handlers.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::CommandError;

/// `10`, `10m`, `2h`, `1.5h`, `1d`, `0.5d`.
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<value>\d+(?:\.\d+)?)(?P<unit>[mhd]?)$").expect("duration pattern is valid")
});

/// Upper bound for relative reminders.
const MAX_DURATION_MINUTES: f64 = 366.0 * 24.0 * 60.0;

/// Parse a relative delay. A bare number means minutes; `h` and `d` accept
/// decimals and are truncated to whole minutes. The result is at least one
/// minute.
pub fn parse_duration(raw: &str) -> Result<Duration, CommandError> {
    let invalid = || CommandError::validation("Invalid duration. Examples: 10, 10m, 2h, 1.5h, 1d");

    let s = raw.trim().to_ascii_lowercase();
    let caps = DURATION_RE.captures(&s).ok_or_else(invalid)?;
    let value = &caps["value"];
    let unit = &caps["unit"];

    let minutes = match unit {
        "" | "m" => {
            if value.contains('.') {
                return Err(invalid());
            }
            value.parse::<f64>().map_err(|_| invalid())?
        }
        "h" => value.parse::<f64>().map_err(|_| invalid())? * 60.0,
        "d" => value.parse::<f64>().map_err(|_| invalid())? * 60.0 * 24.0,
        _ => return Err(invalid()),
    }
    .trunc();

    if minutes < 1.0 {
        return Err(CommandError::validation("Duration must be at least one minute"));
    }
    if minutes > MAX_DURATION_MINUTES {
        return Err(CommandError::validation("Duration must be at most one year"));
    }
    Ok(Duration::minutes(minutes as i64))
}

/// Parse `YYYY-MM-DD` and `HH:MM` as a wall-clock time in `tz`.
///
/// Times skipped or repeated by a daylight-saving change are rejected rather
/// than guessed.
pub fn parse_local_datetime(date: &str, time: &str, tz: &Tz) -> Result<DateTime<Utc>, CommandError> {
    let invalid = || CommandError::validation("Invalid date/time. Example: 2025-01-31 14:30");

    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| invalid())?;
    let local = NaiveDateTime::new(date, time);

    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) => Ok(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(_, _) => Err(CommandError::validation(format!(
            "{local} happens twice in {tz} because of a clock change. Pick another time."
        ))),
        LocalResult::None => Err(CommandError::validation(format!(
            "{local} does not exist in {tz} because of a clock change. Pick another time."
        ))),
    }
}

/// Render a UTC instant as wall-clock time in `tz`.
pub fn format_local(at: DateTime<Utc>, tz: &Tz) -> String {
    at.with_timezone(tz).format("%Y-%m-%d %H:%M %:z").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_forms() {
        assert_eq!(parse_duration("10").unwrap(), Duration::minutes(10));
        assert_eq!(parse_duration("10m").unwrap(), Duration::minutes(10));
        assert_eq!(parse_duration(" 2H ").unwrap(), Duration::hours(2));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("1d").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("0.5d").unwrap(), Duration::hours(12));
    }

    #[test]
    fn duration_rejects_malformed_and_non_positive() {
        for raw in ["", "abc", "10s", "-5", "1.5m", "1.5", "h", "0", "0m", "0.001h"] {
            assert!(
                matches!(parse_duration(raw), Err(CommandError::Validation(_))),
                "{raw:?} should be rejected"
            );
        }
        assert!(parse_duration("400d").is_err());
    }

    #[test]
    fn local_datetime_converted_to_utc() {
        assert_eq!(
            parse_local_datetime("2024-01-01", "09:30", &Tz::UTC).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_local_datetime("2024-01-01", "01:00", &Tz::Asia__Tehran).unwrap(),
            Utc.with_ymd_and_hms(2023, 12, 31, 21, 30, 0).unwrap()
        );
    }

    #[test]
    fn local_datetime_follows_daylight_saving() {
        let paris = Tz::Europe__Paris;
        // Clocks jump from 02:00 to 03:00 on 2024-03-31.
        assert_eq!(
            parse_local_datetime("2024-03-31", "01:30", &paris).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 31, 0, 30, 0).unwrap()
        );
        assert_eq!(
            parse_local_datetime("2024-03-31", "03:30", &paris).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 31, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn local_datetime_rejects_gap_and_fold() {
        let paris = Tz::Europe__Paris;
        let gap = parse_local_datetime("2024-03-31", "02:30", &paris).unwrap_err();
        assert!(gap.to_string().contains("does not exist"), "{gap}");

        // Clocks fall back from 03:00 to 02:00 on 2024-10-27.
        let fold = parse_local_datetime("2024-10-27", "02:30", &paris).unwrap_err();
        assert!(fold.to_string().contains("happens twice"), "{fold}");
        assert!(matches!(fold, CommandError::Validation(_)));
    }

    #[test]
    fn local_datetime_rejects_bad_input() {
        assert!(parse_local_datetime("2024-02-30", "09:30", &Tz::UTC).is_err());
        assert!(parse_local_datetime("2024-01-01", "25:00", &Tz::UTC).is_err());
        assert!(parse_local_datetime("01/01/2024", "09:30", &Tz::UTC).is_err());
    }

    #[test]
    fn formats_in_timezone() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();
        assert_eq!(format_local(at, &Tz::Europe__Paris), "2024-01-02 00:30 +01:00");

        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 23, 30, 0).unwrap();
        assert_eq!(format_local(summer, &Tz::Europe__Paris), "2024-07-02 01:30 +02:00");
    }
}
