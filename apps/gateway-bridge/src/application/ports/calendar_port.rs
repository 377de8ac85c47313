//! Trading Calendar Port (Driven Port)

use chrono::{DateTime, Utc};

use crate::domain::calendar::VenueHours;

/// Answers whether the venue is trading.
#[cfg_attr(test, mockall::automock)]
pub trait TradingCalendar: Send + Sync {
    /// Whether the venue is open at `at`.
    fn is_open(&self, at: DateTime<Utc>) -> bool;

    /// Whether the venue is open right now.
    fn is_open_now(&self) -> bool {
        self.is_open(Utc::now())
    }
}

impl TradingCalendar for VenueHours {
    fn is_open(&self, at: DateTime<Utc>) -> bool {
        self.is_open_at(at)
    }
}
