/// Sample timestamp normalization.
///
/// Sample start and end times are stored in UTC together with the timezone
/// code the sample was collected under and a flag saying whether local
/// daylight-saving time applied. This module turns them back into local
/// clock time.
///
/// # Rules
/// - The zone's standard offset is always applied.
/// - One extra hour is added only when the flag is set, the zone observes
///   daylight time, and the instant falls inside the US daylight-saving
///   window for that year.
/// - A missing or unrecognized timezone code leaves the timestamp as is.
/// - A missing flag means standard time.
///
/// Only the two sample times are converted. Creation, modification and lab
/// dates stay in UTC, matching the legacy tabular exports.

use chrono::{Datelike, Duration, Month, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::model::Sample;

/// A zone's standard offset and whether it observes daylight time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeZoneCode {
    pub std_offset_minutes: i32,
    pub observes_dst: bool,
}

const fn zone(std_offset_minutes: i32, observes_dst: bool) -> TimeZoneCode {
    TimeZoneCode {
        std_offset_minutes,
        observes_dst,
    }
}

/// Abbreviations in use in the sample tables. Daylight abbreviations are
/// fixed offsets: the daylight hour is already part of the code.
const ZONE_ABBREVIATIONS: &[(&str, TimeZoneCode)] = &[
    ("UTC", zone(0, false)),
    ("GMT", zone(0, false)),
    ("Z", zone(0, false)),
    ("AST", zone(-240, true)),
    ("ADT", zone(-180, false)),
    ("EST", zone(-300, true)),
    ("EDT", zone(-240, false)),
    ("CST", zone(-360, true)),
    ("CDT", zone(-300, false)),
    ("MST", zone(-420, true)),
    ("MDT", zone(-360, false)),
    ("PST", zone(-480, true)),
    ("PDT", zone(-420, false)),
    ("AKST", zone(-540, true)),
    ("AKDT", zone(-480, false)),
    ("HST", zone(-600, false)),
    ("SST", zone(-660, false)),
    ("CHST", zone(600, false)),
];

/// Parses a timezone code.
///
/// Accepts the abbreviations above (case-insensitive) and POSIX forms such
/// as `MST7MDT`, `EST5EDT` or `HST10`, where the number is hours west of UTC
/// and a trailing daylight name means the zone observes daylight time.
pub fn parse_tz_code(code: &str) -> Option<TimeZoneCode> {
    let code = code.trim().to_ascii_uppercase();
    if code.is_empty() {
        return None;
    }
    if let Some((_, tz)) = ZONE_ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == code) {
        return Some(*tz);
    }
    parse_posix(&code)
}

fn parse_posix(code: &str) -> Option<TimeZoneCode> {
    let name_len = code.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if name_len < 3 {
        return None;
    }
    let rest = &code[name_len..];

    let (sign, rest) = match rest.as_bytes().first() {
        Some(b'-') => (-1, &rest[1..]),
        Some(b'+') => (1, &rest[1..]),
        _ => (1, rest),
    };
    let offset_len = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ':')
        .count();
    if offset_len == 0 {
        return None;
    }
    let (offset, dst_name) = rest.split_at(offset_len);

    let mut parts = offset.split(':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    if hours > 14 || minutes >= 60 || parts.next().is_some() {
        return None;
    }
    if !dst_name.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    // POSIX offsets count hours west of Greenwich.
    Some(TimeZoneCode {
        std_offset_minutes: -sign * (hours * 60 + minutes),
        observes_dst: !dst_name.is_empty(),
    })
}

fn nth_sunday(year: i32, month: u32, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Sun, n)
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = next_month.pred_opt()?;
    let back = last_day.weekday().num_days_from_sunday();
    Some(last_day - Duration::days(i64::from(back)))
}

/// US daylight-saving window for `year`, expressed in local standard time:
/// from 02:00 on the start date to 01:00 (02:00 daylight) on the end date.
pub fn us_dst_window(year: i32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let (start, end) = match year {
        2007.. => (
            nth_sunday(year, Month::March.number_from_month(), 2)?,
            nth_sunday(year, Month::November.number_from_month(), 1)?,
        ),
        1987..=2006 => (nth_sunday(year, 4, 1)?, last_sunday(year, 10)?),
        1967..=1986 => (last_sunday(year, 4)?, last_sunday(year, 10)?),
        _ => return None,
    };
    Some((
        start.and_time(NaiveTime::from_hms_opt(2, 0, 0)?),
        end.and_time(NaiveTime::from_hms_opt(1, 0, 0)?),
    ))
}

/// Converts a stored UTC timestamp to local clock time.
pub fn to_local(utc: NaiveDateTime, tz_cd: Option<&str>, dst_flag: Option<bool>) -> NaiveDateTime {
    let Some(tz) = tz_cd.and_then(parse_tz_code) else {
        return utc;
    };
    let standard = utc + Duration::minutes(i64::from(tz.std_offset_minutes));
    if dst_flag != Some(true) || !tz.observes_dst {
        return standard;
    }
    match us_dst_window(standard.year()) {
        Some((start, end)) if standard >= start && standard < end => standard + Duration::hours(1),
        _ => standard,
    }
}

/// Rewrites a sample's start and end times into local time, each with its
/// own timezone code and flag.
pub fn normalize_sample_times(sample: &mut Sample) {
    if let Some(start) = sample.sample_start_dt {
        sample.sample_start_dt = Some(to_local(
            start,
            sample.sample_start_tz_cd.as_deref(),
            sample.sample_start_local_tm_fg,
        ));
    }
    if let Some(end) = sample.sample_end_dt {
        sample.sample_end_dt = Some(to_local(
            end,
            sample.sample_end_tz_cd.as_deref(),
            sample.sample_end_local_tm_fg,
        ));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
