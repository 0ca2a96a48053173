//! Time formatting used in envelopes, notifications and the state history.

use chrono::{Local, NaiveDateTime};

/// Format used for persisted timestamps and the `time` envelope field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time as `YYYY-mm-dd HH:MM:SS`.
pub fn now_str() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Current local time with microseconds, used for notification ordering.
pub fn now_str_precise() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Parse a timestamp written by [`now_str`].
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()
}

/// Render a duration in whole seconds as `H:MM:SS`, prefixed with
/// `N day(s), ` once it exceeds a day.
pub fn elapsed_to_str(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let rem = total_secs % 86_400;
    let hours = rem / 3600;
    let minutes = (rem % 3600) / 60;
    let seconds = rem % 60;

    let clock = format!("{}:{:02}:{:02}", hours, minutes, seconds);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_to_str_under_a_day() {
        assert_eq!(elapsed_to_str(0), "0:00:00");
        assert_eq!(elapsed_to_str(59), "0:00:59");
        assert_eq!(elapsed_to_str(3661), "1:01:01");
        assert_eq!(elapsed_to_str(86_399), "23:59:59");
    }

    #[test]
    fn test_elapsed_to_str_days() {
        assert_eq!(elapsed_to_str(86_400), "1 day, 0:00:00");
        assert_eq!(elapsed_to_str(2 * 86_400 + 5), "2 days, 0:00:05");
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let now = now_str();
        let parsed = parse_timestamp(&now).unwrap();
        assert_eq!(parsed.format(TIMESTAMP_FORMAT).to_string(), now);
        assert!(parse_timestamp("not a time").is_none());
    }
}
