// src/ingest/dates.rs
//! Publication date handling for search results.
//!
//! Bing reports ages relative to now (`"5m"`, `"3h"`, `"2d"`, `"4mon"`, `"1y"`), Google News
//! reports absolute timestamps in a handful of formats. Both collapse to a calendar date;
//! anything unreadable becomes "today" rather than dropping the article.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeAge {
    Minutes(i64),
    Hours(i64),
    Days(i64),
    Months(i64),
    Years(i64),
}

impl RelativeAge {
    /// `None` when the age does not fit in a `Duration`.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            RelativeAge::Minutes(n) => Duration::try_minutes(n),
            RelativeAge::Hours(n) => Duration::try_hours(n),
            RelativeAge::Days(n) => Duration::try_days(n),
            RelativeAge::Months(n) => Duration::try_days(n.checked_mul(30)?),
            RelativeAge::Years(n) => Duration::try_days(n.checked_mul(365)?),
        }
    }
}

const DATETIME_FORMATS: &[&str] = &["%m/%d/%Y, %I:%M %p, +0000 UTC", "%m/%d/%Y, %I:%M %p"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

pub fn parse_relative(s: &str) -> Option<RelativeAge> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = s.split_at(split);
    let n: i64 = num.parse().ok()?;
    match unit.trim() {
        "m" | "min" => Some(RelativeAge::Minutes(n)),
        "h" => Some(RelativeAge::Hours(n)),
        "d" => Some(RelativeAge::Days(n)),
        "mon" => Some(RelativeAge::Months(n)),
        "y" => Some(RelativeAge::Years(n)),
        _ => None,
    }
}

pub fn parse_absolute(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok().map(|dt| dt.date()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        })
}

/// Resolve a provider date to a calendar date. Missing or unparseable → `now`'s date.
pub fn parse_published(raw: Option<&str>, now: NaiveDateTime) -> NaiveDate {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return now.date();
    };
    if let Some(age) = parse_relative(s) {
        return age
            .as_duration()
            .and_then(|d| now.checked_sub_signed(d))
            .map_or_else(|| now.date(), |dt| dt.date());
    }
    parse_absolute(s).unwrap_or_else(|| now.date())
}

/// Whether a Bing relative age is inside the current search window.
/// Minutes and hours always are; days only within a week unless backfilling;
/// months only when backfilling; years only when backfilling and under two.
pub fn relative_in_window(s: &str, backfill: bool) -> bool {
    match parse_relative(s) {
        Some(RelativeAge::Minutes(_)) | Some(RelativeAge::Hours(_)) => true,
        Some(RelativeAge::Days(d)) => backfill || d < 8,
        Some(RelativeAge::Months(_)) => backfill,
        Some(RelativeAge::Years(y)) => backfill && y < 2,
        None => false,
    }
}

pub fn iso_week_label(date: NaiveDate) -> String {
    let w = date.iso_week();
    format!("{}-W{:02}", w.year(), w.week())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn relative_units_parse() {
        assert_eq!(parse_relative("5m"), Some(RelativeAge::Minutes(5)));
        assert_eq!(parse_relative("3h"), Some(RelativeAge::Hours(3)));
        assert_eq!(parse_relative("2d"), Some(RelativeAge::Days(2)));
        assert_eq!(parse_relative("4mon"), Some(RelativeAge::Months(4)));
        assert_eq!(parse_relative("1y"), Some(RelativeAge::Years(1)));
        assert_eq!(parse_relative("d"), None);
        assert_eq!(parse_relative("yesterday"), None);
    }

    #[test]
    fn published_dates_resolve_against_now() {
        let d = |s| parse_published(Some(s), now());
        assert_eq!(d("2d"), NaiveDate::from_ymd_opt(2025, 3, 8).unwrap());
        assert_eq!(d("1mon"), NaiveDate::from_ymd_opt(2025, 2, 8).unwrap());
        assert_eq!(
            d("11/12/2024, 09:03 AM, +0000 UTC"),
            NaiveDate::from_ymd_opt(2024, 11, 12).unwrap()
        );
        assert_eq!(d("2024-01-15"), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(d("31/01/2024"), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    }

    #[test]
    fn unparseable_or_missing_dates_fall_back_to_today() {
        assert_eq!(parse_published(None, now()), now().date());
        assert_eq!(parse_published(Some("  "), now()), now().date());
        assert_eq!(parse_published(Some("last spring"), now()), now().date());
    }

    #[test]
    fn out_of_range_relative_ages_fall_back_to_today() {
        for s in ["99999999d", "9223372036854775807d", "99999999999mon", "99999999999y", "9223372036854775807m"] {
            assert_eq!(parse_published(Some(s), now()), now().date(), "{s}");
        }
        // still counted as relative, so window rules apply unchanged
        assert!(relative_in_window("99999999d", true));
        assert!(!relative_in_window("99999999d", false));
    }

    #[test]
    fn window_rules_follow_mode() {
        assert!(relative_in_window("30m", false));
        assert!(relative_in_window("7d", false));
        assert!(!relative_in_window("8d", false));
        assert!(relative_in_window("40d", true));
        assert!(!relative_in_window("3mon", false));
        assert!(relative_in_window("3mon", true));
        assert!(relative_in_window("1y", true));
        assert!(!relative_in_window("2y", true));
        assert!(!relative_in_window("", true));
    }

    #[test]
    fn iso_week_uses_iso_year() {
        // 2024-12-30 belongs to ISO week 1 of 2025
        let d = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        assert_eq!(iso_week_label(d), "2025-W01");
        let d = NaiveDate::from_ymd_opt(2025, 2, 12).unwrap();
        assert_eq!(iso_week_label(d), "2025-W07");
    }
}
