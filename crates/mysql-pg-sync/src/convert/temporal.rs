//! Text parsers for temporal column kinds.
//!
//! Inputs are trimmed before parsing. Blank text parses as `None`; the
//! converter maps it to NULL before it gets here.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse the first 10 characters as `YYYY-MM-DD`; anything after is ignored.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let head = leading_chars(text.trim(), 10);
    NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
}

/// Parse the first 19 characters as `YYYY-MM-DD HH:MM:SS`.
///
/// Fractional seconds and zone suffixes fall outside the prefix and are
/// dropped.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let head = leading_chars(text.trim(), 19);
    NaiveDateTime::parse_from_str(head, TIMESTAMP_FORMAT).ok()
}

/// Parse `[-]H:MM:SS[.ffffff]` into a duration.
///
/// Hours are unbounded (MySQL `TIME` reaches 838 hours). The fraction is
/// right-padded or truncated to microseconds. A leading `-` negates the whole
/// duration.
pub fn parse_interval(text: &str) -> Option<TimeDelta> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut parts = body.split(':');
    let (h, m, sec) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (whole, fraction) = match sec.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (sec, None),
    };

    let hours = parse_unsigned(h)?;
    let minutes = parse_unsigned(m)?;
    let seconds = parse_unsigned(whole)?;
    let micros = match fraction {
        Some(f) => parse_micros(f)?,
        None => 0,
    };

    let delta = TimeDelta::try_hours(hours)?
        .checked_add(&TimeDelta::try_minutes(minutes)?)?
        .checked_add(&TimeDelta::try_seconds(seconds)?)?
        .checked_add(&TimeDelta::microseconds(micros))?;

    Some(if negative { -delta } else { delta })
}

/// Duration since midnight for a time-of-day value.
pub fn time_to_interval(time: &NaiveTime) -> TimeDelta {
    TimeDelta::seconds(i64::from(time.num_seconds_from_midnight()))
        + TimeDelta::microseconds(i64::from(time.nanosecond() / 1_000))
}

/// Truncate to whole seconds.
pub fn truncate_to_seconds(dt: &NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).unwrap_or(*dt)
}

fn parse_unsigned(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_micros(fraction: &str) -> Option<i64> {
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = fraction.chars().take(6).collect();
    while digits.len() < 6 {
        digits.push('0');
    }
    digits.parse().ok()
}

/// Prefix of at most `n` characters, never splitting a code point.
fn leading_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hms(h: i64, m: i64, s: i64) -> TimeDelta {
        TimeDelta::hours(h) + TimeDelta::minutes(m) + TimeDelta::seconds(s)
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("02:10:30"), Some(hms(2, 10, 30)));
        assert_eq!(
            parse_interval("00:00:01.500000"),
            Some(TimeDelta::milliseconds(1500))
        );
    }

    #[test]
    fn test_parse_interval_fraction_padding() {
        assert_eq!(parse_interval("00:00:01.5"), Some(TimeDelta::milliseconds(1500)));
        assert_eq!(
            parse_interval("00:00:00.1234567"),
            Some(TimeDelta::microseconds(123_456))
        );
        assert_eq!(parse_interval("00:00:02."), Some(TimeDelta::seconds(2)));
    }

    #[test]
    fn test_parse_interval_long_and_negative() {
        assert_eq!(parse_interval("838:59:59"), Some(hms(838, 59, 59)));
        assert_eq!(parse_interval("-01:30:00"), Some(-hms(1, 30, 0)));
        assert_eq!(parse_interval(" 1:02:03 "), Some(hms(1, 2, 3)));
    }

    #[test]
    fn test_parse_interval_rejects_malformed() {
        assert_eq!(parse_interval(""), None);
        assert_eq!(parse_interval("10:30"), None);
        assert_eq!(parse_interval("1:2:3:4"), None);
        assert_eq!(parse_interval("aa:00:00"), None);
        assert_eq!(parse_interval("01:-5:00"), None);
        assert_eq!(parse_interval("01:00:00.x"), None);
    }

    #[test]
    fn test_parse_date_prefix() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(parse_date("2024-02-29"), Some(d));
        assert_eq!(parse_date("2024-02-29 13:45:00"), Some(d));
        assert_eq!(parse_date("  2024-02-29T00:00"), Some(d));
        assert_eq!(parse_date("2023-02-29"), None);
        assert_eq!(parse_date("29/02/2024"), None);
    }

    #[test]
    fn test_parse_timestamp_prefix() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 5, 9)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-01 08:05:09"), Some(dt));
        assert_eq!(parse_timestamp("2024-03-01 08:05:09.999"), Some(dt));
        assert_eq!(parse_timestamp("2024-03-01"), None);
    }

    #[test]
    fn test_multibyte_prefix_does_not_panic() {
        assert_eq!(parse_date("ñññññññññññññ"), None);
        assert_eq!(parse_timestamp("日付日付日付日付日付日付日付日付日付日付"), None);
    }

    #[test]
    fn test_time_to_interval() {
        let t = NaiveTime::from_hms_micro_opt(1, 2, 3, 250_000).unwrap();
        assert_eq!(
            time_to_interval(&t),
            hms(1, 2, 3) + TimeDelta::milliseconds(250)
        );
    }

    #[test]
    fn test_truncate_to_seconds() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(8, 5, 9, 750)
            .unwrap();
        assert_eq!(truncate_to_seconds(&dt).nanosecond(), 0);
        assert_eq!(truncate_to_seconds(&dt).second(), 9);
    }
}
