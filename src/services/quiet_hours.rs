//! Quiet hours: the operator-configured window in which the agent runs
//! observation-only. The gateway still enforces its own policy; quiet
//! hours only swap the agent's system prompt.

use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Parse "HH:MM" into minutes since midnight.
fn parse_hhmm(value: &str) -> Option<u32> {
    let (h, m) = value.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Core window check, separated from the clock for testability.
///
/// `start <= end` is a same-day window `[start, end)`; otherwise the window
/// spans midnight.
pub fn within_window(current_minutes: u32, start_minutes: u32, end_minutes: u32) -> bool {
    if start_minutes <= end_minutes {
        start_minutes <= current_minutes && current_minutes < end_minutes
    } else {
        current_minutes >= start_minutes || current_minutes < end_minutes
    }
}

/// Return true if the current time falls inside the configured quiet-hours
/// window. Disabled (always false) unless both bounds are set.
pub fn is_quiet_hours(start: Option<&str>, end: Option<&str>, tz_name: &str) -> bool {
    let (Some(start), Some(end)) = (start, end) else {
        return false;
    };
    let (Some(start_minutes), Some(end_minutes)) = (parse_hhmm(start), parse_hhmm(end)) else {
        warn!(start, end, "invalid quiet hours bounds, treating as disabled");
        return false;
    };

    let now = match tz_name.parse::<Tz>() {
        Ok(tz) => {
            let local = Utc::now().with_timezone(&tz);
            local.hour() * 60 + local.minute()
        }
        Err(_) => {
            warn!(tz = tz_name, "invalid quiet_hours_tz, defaulting to UTC");
            let utc = Utc::now();
            utc.hour() * 60 + utc.minute()
        }
    };

    within_window(now, start_minutes, end_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(h: u32, m: u32) -> u32 {
        h * 60 + m
    }

    #[test]
    fn test_same_day_window() {
        let start = minutes(9, 0);
        let end = minutes(17, 0);
        assert!(within_window(minutes(9, 0), start, end));
        assert!(within_window(minutes(12, 30), start, end));
        assert!(!within_window(minutes(17, 0), start, end));
        assert!(!within_window(minutes(8, 59), start, end));
    }

    #[test]
    fn test_overnight_window() {
        // 22:00 - 06:00 spans midnight
        let start = minutes(22, 0);
        let end = minutes(6, 0);
        assert!(within_window(minutes(23, 0), start, end));
        assert!(within_window(minutes(3, 0), start, end));
        assert!(!within_window(minutes(12, 0), start, end));
        assert!(!within_window(minutes(6, 0), start, end));
        assert!(within_window(minutes(22, 0), start, end));
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("22:00"), Some(1320));
        assert_eq!(parse_hhmm("06:30"), Some(390));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("aa:bb"), None);
        assert_eq!(parse_hhmm("2200"), None);
    }

    #[test]
    fn test_disabled_without_bounds() {
        assert!(!is_quiet_hours(None, None, "UTC"));
        assert!(!is_quiet_hours(Some("22:00"), None, "UTC"));
        assert!(!is_quiet_hours(None, Some("06:00"), "UTC"));
    }

    #[test]
    fn test_invalid_bounds_disable() {
        assert!(!is_quiet_hours(Some("25:00"), Some("06:00"), "UTC"));
    }

    #[test]
    fn test_unknown_tz_falls_back_to_utc() {
        // Whatever the clock says, the UTC fallback must agree with the
        // explicit UTC evaluation rather than disabling the window.
        let with_bad_tz = is_quiet_hours(Some("22:00"), Some("06:00"), "Not/AZone");
        let with_utc = is_quiet_hours(Some("22:00"), Some("06:00"), "UTC");
        assert_eq!(with_bad_tz, with_utc);
    }
}
