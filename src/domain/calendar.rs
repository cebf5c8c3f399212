//! Wire formats for appointment dates and times.
//!
//! The backend stores `date` as an ISO calendar date and `time` as a
//! time-of-day that may or may not carry seconds.

use serde::Serializer;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Time};

use super::error::DomainError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");
const TIME_WITH_SECONDS_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");

pub fn parse_date(value: &str) -> Result<Date, DomainError> {
    Date::parse(value.trim(), DATE_FORMAT)
        .map_err(|err| DomainError::validation(format!("invalid date `{value}`: {err}")))
}

pub fn parse_time(value: &str) -> Result<Time, DomainError> {
    let trimmed = value.trim();
    Time::parse(trimmed, TIME_WITH_SECONDS_FORMAT)
        .or_else(|_| Time::parse(trimmed, TIME_FORMAT))
        .map_err(|err| DomainError::validation(format!("invalid time `{value}`: {err}")))
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn format_time(time: Time) -> String {
    time.format(TIME_FORMAT)
        .unwrap_or_else(|_| time.to_string())
}

/// Absent dates serialize as `""`, like every other missing text field.
pub(crate) fn serialize_optional_date<S: Serializer>(
    date: &Option<Date>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.map(format_date).unwrap_or_default())
}

pub(crate) fn serialize_optional_time<S: Serializer>(
    time: &Option<Time>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.map(format_time).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use time::macros::{date, time};

    use super::*;

    #[test]
    fn time_accepts_backend_seconds_and_form_minutes() {
        assert_eq!(parse_time("09:30:00").expect("seconds"), time!(09:30));
        assert_eq!(parse_time("09:30").expect("minutes"), time!(09:30));
        assert!(parse_time("9.30").is_err());
    }

    #[test]
    fn dates_round_trip_through_iso_text() {
        let parsed = parse_date("2024-03-05").expect("iso date");
        assert_eq!(parsed, date!(2024 - 03 - 05));
        assert_eq!(format_date(parsed), "2024-03-05");
        assert!(parse_date("05/03/2024").is_err());
        assert!(parse_date("").is_err());
    }
}
