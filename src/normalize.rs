//! Normalisation helpers shared by every source: identifier derivation,
//! date parsing and status inference.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::model::{EventStatus, MatchStatus, SCORE_TBD};

/// Timestamp formats, tried in order before the date-only formats.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %I:%M %p",
];

/// Date-only formats, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%Y-%m-%d",
    "%a, %B %e, %Y",
    "%a, %b %e, %Y",
    "%Y/%m/%d",
];

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static LIVE_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\blive\b").unwrap());
static RANGE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+-\s+|\s*[–—]\s*").unwrap());
static TRAILING_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})$").unwrap());
static LEADING_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z]+)\s").unwrap());

/// Derive a stable identifier from a human-readable name.
///
/// `"Team Liquid!"` becomes `"team-liquid"`.
pub fn slugify(name: &str) -> String {
    NON_ALNUM
        .replace_all(&name.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Turn a derived id back into a display name: `"team-liquid"` -> `"Team Liquid"`.
pub fn title_case(id: &str) -> String {
    id.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a timestamp or a bare date, trying every known format in priority
/// order. Bare dates resolve to midnight. Returns `None` rather than guessing.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(&text, f).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(&text)
                .ok()
                .map(|d| d.naive_utc())
        })
        .or_else(|| parse_day(&text).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parse a date-only string with the known date formats.
pub fn parse_day(text: &str) -> Option<NaiveDate> {
    let text = collapse_whitespace(text);
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(&text, f).ok())
}

/// Start and end of an event, either of which may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Parse a composite range such as `"Apr 15 - Apr 30, 2025"`.
///
/// The year of the second half is applied to the first half when the first
/// half has none. A range crossing new year (`"Dec 28 - Jan 4, 2026"`) puts
/// the start in the previous year. Unparsable halves stay `None`.
pub fn parse_date_range(text: &str) -> DateRange {
    let text = collapse_whitespace(text);
    let mut halves = RANGE_SEPARATOR.splitn(&text, 2);
    let first = halves.next().unwrap_or_default().trim();
    let Some(second) = halves.next().map(str::trim) else {
        return DateRange {
            start: parse_day(first),
            end: None,
        };
    };

    // "Apr 15 - 30, 2025": the second half borrows the month.
    let second = match (second.chars().next(), LEADING_MONTH.captures(first)) {
        (Some(c), Some(month)) if c.is_ascii_digit() => format!("{} {second}", &month[1]),
        _ => second.to_string(),
    };
    let end = parse_day(&second);

    let start = if TRAILING_YEAR.is_match(first) {
        parse_day(first)
    } else {
        TRAILING_YEAR
            .captures(&second)
            .and_then(|year| parse_day(&format!("{first}, {}", &year[1])))
    };
    let start = match (start, end) {
        (Some(s), Some(e)) if s > e => s.with_year(s.year() - 1).or(Some(s)),
        _ => start,
    };

    DateRange { start, end }
}

/// Whether a score string carries an actual result.
pub fn is_numeric_score(score: &str) -> bool {
    let score = score.trim();
    !score.is_empty() && score != SCORE_TBD && score.chars().any(|c| c.is_ascii_digit())
}

/// Join two per-team score cells into `"a-b"`, or [`SCORE_TBD`] when either
/// side is not a number.
pub fn format_score(team1: &str, team2: &str) -> String {
    match (team1.trim().parse::<u32>(), team2.trim().parse::<u32>()) {
        (Ok(a), Ok(b)) => format!("{a}-{b}"),
        _ => SCORE_TBD.to_string(),
    }
}

/// Classify a match from its date/time text and its score.
///
/// A LIVE marker wins over everything, so a live match with a partial score
/// is not taken for a finished one. Otherwise a numeric score means the match
/// is completed.
pub fn infer_match_status(date_text: &str, score: &str) -> MatchStatus {
    if LIVE_MARKER.is_match(date_text) {
        MatchStatus::Live
    } else if is_numeric_score(score) {
        MatchStatus::Completed
    } else {
        MatchStatus::Upcoming
    }
}

/// Classify an event from its date range relative to `today`.
pub fn infer_event_status(range: DateRange, today: NaiveDate) -> EventStatus {
    match (range.start, range.end) {
        (Some(start), _) if today < start => EventStatus::Upcoming,
        (Some(_), Some(end)) if today > end => EventStatus::Completed,
        (Some(_), Some(_)) => EventStatus::Ongoing,
        _ => EventStatus::Upcoming,
    }
}
