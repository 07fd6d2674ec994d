//! Date window for date-bounded queries.

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::model::DateWindow;

/// Look-back length of every window.
pub const LOOKBACK_DAYS: i64 = 7;

/// Seven days ending today. On Saturday and Sunday the window ends on the
/// preceding Friday instead, since weekend feeds are sparse.
pub fn date_window(now: DateTime<Utc>) -> DateWindow {
    let today = now.date_naive();
    let from_monday = today.weekday().num_days_from_monday() as i64;
    let weekend = from_monday >= 5;
    let to = if weekend {
        today - Duration::days(from_monday - 4)
    } else {
        today
    };
    DateWindow {
        from: to - Duration::days(LOOKBACK_DAYS),
        to,
        weekend,
    }
}
