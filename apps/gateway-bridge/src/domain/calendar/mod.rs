//! Venue Trading Hours
//!
//! Decides whether the venue is open at a given instant. The gateway only
//! treats authentication failures as fatal while the venue is open, and the
//! session token expires daily once it closes.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

/// Default venue timezone.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Trading session window in venue-local time, Monday through Friday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueHours {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for VenueHours {
    /// US equities extended session, 04:00 to 20:00 New York time.
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            open: NaiveTime::from_hms_opt(4, 0, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl VenueHours {
    /// Create a custom window.
    ///
    /// # Errors
    ///
    /// Returns an error if `open` is not strictly before `close`.
    pub fn new(timezone: Tz, open: NaiveTime, close: NaiveTime) -> Result<Self, CalendarError> {
        if open >= close {
            return Err(CalendarError::EmptyWindow { open, close });
        }
        Ok(Self {
            timezone,
            open,
            close,
        })
    }

    /// Parse a window from configuration strings (`America/New_York`, `04:00`, `20:00`).
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown timezone, a malformed time, or an empty window.
    pub fn parse(timezone: &str, open: &str, close: &str) -> Result<Self, CalendarError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| CalendarError::UnknownTimezone(timezone.to_string()))?;
        Self::new(tz, parse_clock(open)?, parse_clock(close)?)
    }

    /// Whether the venue is open at `at`.
    #[must_use]
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        time >= self.open && time < self.close
    }

    /// Venue timezone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Session open, venue-local.
    #[must_use]
    pub const fn open(&self) -> NaiveTime {
        self.open
    }

    /// Session close, venue-local.
    #[must_use]
    pub const fn close(&self) -> NaiveTime {
        self.close
    }
}

fn parse_clock(value: &str) -> Result<NaiveTime, CalendarError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| CalendarError::InvalidTime(value.to_string()))
}

/// Calendar configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    /// Timezone name not in the tz database.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    /// Time of day not in `HH:MM` or `HH:MM:SS` form.
    #[error("invalid time of day: {0}")]
    InvalidTime(String),
    /// Open is not before close.
    #[error("session window is empty: open {open} is not before close {close}")]
    EmptyWindow {
        /// Configured open.
        open: NaiveTime,
        /// Configured close.
        close: NaiveTime,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    // 2024-03-15 is a Friday; New York is on EDT (UTC-4).
    #[test_case(utc(2024, 3, 15, 7, 59), false ; "before extended open")]
    #[test_case(utc(2024, 3, 15, 8, 0), true ; "at extended open")]
    #[test_case(utc(2024, 3, 15, 13, 30), true ; "regular session")]
    #[test_case(utc(2024, 3, 15, 23, 59), true ; "late extended session")]
    #[test_case(utc(2024, 3, 16, 0, 0), false ; "at close")]
    #[test_case(utc(2024, 3, 16, 14, 0), false ; "saturday")]
    #[test_case(utc(2024, 3, 17, 14, 0), false ; "sunday")]
    fn default_window(at: DateTime<Utc>, expected: bool) {
        assert_eq!(VenueHours::default().is_open_at(at), expected);
    }

    #[test]
    fn follows_daylight_saving() {
        // January: EST (UTC-5), so 08:30 UTC is 03:30 local.
        let hours = VenueHours::default();
        assert!(!hours.is_open_at(utc(2024, 1, 10, 8, 30)));
        assert!(hours.is_open_at(utc(2024, 1, 10, 9, 0)));
    }

    #[test]
    fn parse_custom_window() {
        let hours = VenueHours::parse("Europe/London", "08:00", "16:30").unwrap();
        assert_eq!(hours.timezone(), chrono_tz::Europe::London);
        assert_eq!(hours.close(), NaiveTime::from_hms_opt(16, 30, 0).unwrap());
        assert!(hours.is_open_at(utc(2024, 1, 10, 12, 0)));
        assert!(!hours.is_open_at(utc(2024, 1, 10, 17, 0)));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            VenueHours::parse("Mars/Olympus", "04:00", "20:00"),
            Err(CalendarError::UnknownTimezone(_))
        ));
        assert!(matches!(
            VenueHours::parse("America/New_York", "4am", "20:00"),
            Err(CalendarError::InvalidTime(_))
        ));
        assert!(matches!(
            VenueHours::parse("America/New_York", "20:00", "04:00"),
            Err(CalendarError::EmptyWindow { .. })
        ));
    }
}
