//! Timestamp parsing for model output
//!
//! Order of attempts: strict ISO 8601 / RFC 3339, then a list of common
//! calendar layouts, then relative expressions ("yesterday", "last 3 days").
//! Anything without an explicit offset is taken as UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use nom::branch::alt;
use nom::bytes::complete::tag_no_case;
use nom::character::complete::{digit1, multispace0, multispace1};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::sequence::delimited;
use nom::{IResult, Parser};

use crate::core::types::Timestamp;

/// Which end of a range a timestamp field denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// A relative date expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeExpr {
    Now,
    Today,
    Yesterday,
    LastWeek,
    LastMonth,
    LastDays(u32),
}

impl RelativeExpr {
    /// Resolve against `reference` into a `(start, end)` pair
    ///
    /// Open-ended ranges ("today", "last week") end at the reference instant
    /// rather than at midnight, so they never reach past available data.
    /// `None` when the range falls outside the representable calendar, e.g.
    /// "last 4000000000 days".
    pub fn range(&self, reference: Timestamp) -> Option<(Timestamp, Timestamp)> {
        let midnight = |ts: Timestamp| {
            Utc.from_utc_datetime(&ts.date_naive().and_time(NaiveTime::MIN))
        };
        let days_back = |n: i64| {
            reference
                .checked_sub_signed(Duration::try_days(n)?)
                .map(midnight)
        };

        match self {
            RelativeExpr::Now => Some((reference, reference)),
            RelativeExpr::Today => Some((midnight(reference), reference)),
            RelativeExpr::Yesterday => {
                let start = days_back(1)?;
                Some((start, start.checked_add_signed(Duration::try_seconds(86_399)?)?))
            }
            RelativeExpr::LastWeek => Some((days_back(7)?, reference)),
            RelativeExpr::LastMonth => Some((days_back(30)?, reference)),
            RelativeExpr::LastDays(n) => Some((days_back(i64::from(*n))?, reference)),
        }
    }
}

const OFFSET_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %H:%M",
];

const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y%m%d",
];

/// Strict calendar timestamp: RFC 3339, or ISO 8601 without an offset
pub fn parse_strict(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Permissive fallback over common calendar layouts
pub fn parse_permissive(raw: &str) -> Option<Timestamp> {
    let mut raw = raw.trim();
    let mut zulu = false;
    if let Some(stripped) = raw.strip_suffix(['Z', 'z']) {
        raw = stripped.trim_end();
        zulu = true;
    }

    if !zulu {
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for layout in OFFSET_LAYOUTS {
            if let Ok(dt) = DateTime::parse_from_str(raw, layout) {
                return Some(dt.with_timezone(&Utc));
            }
        }
    }

    if let Some(ts) = parse_strict(raw) {
        return Some(ts);
    }

    for layout in DATETIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for layout in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, layout) {
            return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
    }

    None
}

fn last_n_days(input: &str) -> IResult<&str, RelativeExpr> {
    map(
        delimited(
            (tag_no_case("last"), multispace1),
            map_res(digit1, |s: &str| s.parse::<u32>()),
            (multispace1, tag_no_case("day"), opt(tag_no_case("s"))),
        ),
        RelativeExpr::LastDays,
    )
    .parse(input)
}

fn relative_expr(input: &str) -> IResult<&str, RelativeExpr> {
    alt((
        value(RelativeExpr::Now, tag_no_case("now")),
        value(RelativeExpr::Today, tag_no_case("today")),
        value(RelativeExpr::Yesterday, tag_no_case("yesterday")),
        last_n_days,
        value(
            RelativeExpr::LastWeek,
            (tag_no_case("last"), multispace1, tag_no_case("week")),
        ),
        value(
            RelativeExpr::LastMonth,
            (tag_no_case("last"), multispace1, tag_no_case("month")),
        ),
    ))
    .parse(input)
}

/// Recognize a whole-string relative date expression
pub fn parse_relative(raw: &str) -> Option<RelativeExpr> {
    all_consuming(delimited(multispace0, relative_expr, multispace0))
        .parse(raw)
        .ok()
        .map(|(_, expr)| expr)
}

/// Parse a timestamp field, falling through strict, permissive and relative forms
pub fn parse_timestamp(raw: &str, bound: Bound, reference: Timestamp) -> Option<Timestamp> {
    parse_strict(raw)
        .or_else(|| parse_permissive(raw))
        .or_else(|| {
            let (start, end) = parse_relative(raw)?.range(reference)?;
            Some(match bound {
                Bound::Start => start,
                Bound::End => end,
            })
        })
}
