//! Duration strings used by operator settings.
//!
//! Two syntaxes are accepted:
//!
//! - plain durations such as `15m`, `1h30m` or `3600s`;
//! - a single count with a calendar unit (`d`, `w`, `M`, `y`), measured
//!   forwards from the current UTC instant so month and year lengths follow
//!   the calendar instead of a fixed average.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Days, Months, Utc};
use regex::Regex;

use crate::error::ConfigError;

static CALENDAR_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([dwMy])$").expect("calendar unit pattern compiles"));

/// Parses an interval relative to the current UTC time.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    parse_interval_at(input, Utc::now())
}

/// Parses an interval relative to `now`.
pub fn parse_interval_at(input: &str, now: DateTime<Utc>) -> Result<Duration, ConfigError> {
    let input = input.trim();
    let Some(captures) = CALENDAR_UNIT.captures(input) else {
        return humantime::parse_duration(input)
            .map_err(|err| ConfigError::invalid("duration", format!("{input:?}: {err}")));
    };

    let count: u32 = captures[1]
        .parse()
        .map_err(|_| ConfigError::invalid("duration", format!("{input:?}: count out of range")))?;

    let then = match &captures[2] {
        "d" => now.checked_add_days(Days::new(u64::from(count))),
        "w" => now.checked_add_days(Days::new(u64::from(count) * 7)),
        "M" => now.checked_add_months(Months::new(count)),
        _ => count
            .checked_mul(12)
            .and_then(|months| now.checked_add_months(Months::new(months))),
    }
    .ok_or_else(|| ConfigError::invalid("duration", format!("{input:?}: out of range")))?;

    (then - now)
        .to_std()
        .map_err(|err| ConfigError::invalid("duration", format!("{input:?}: {err}")))
}
