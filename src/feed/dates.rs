//! Published-date normalization for RSS items.
//!
//! Feeds in the wild disagree on date syntax. [`normalize_published`] tries a
//! fixed, ordered list of formats and returns the first match as UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Raised when a non-empty date string matches none of [`FeedDateFormat::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized published date: {input:?}")]
pub struct DateFormatError {
    pub input: String,
}

/// Accepted date syntaxes, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDateFormat {
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Numeric,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123Named,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Numeric,
    /// `02 Jan 06 15:04 MST`
    Rfc822Named,
    /// `2006-01-02T15:04:05Z07:00`
    Rfc3339,
    /// `2006-01-02 15:04:05`, read as UTC
    SqlDateTime,
}

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

impl FeedDateFormat {
    /// Every format, earliest wins when a string fits more than one.
    pub const ALL: [FeedDateFormat; 6] = [
        FeedDateFormat::Rfc1123Numeric,
        FeedDateFormat::Rfc1123Named,
        FeedDateFormat::Rfc822Numeric,
        FeedDateFormat::Rfc822Named,
        FeedDateFormat::Rfc3339,
        FeedDateFormat::SqlDateTime,
    ];

    /// Parse `s` strictly as this format.
    pub fn parse(self, s: &str) -> Option<DateTime<FixedOffset>> {
        match self {
            FeedDateFormat::Rfc1123Numeric => strip_weekday(s)
                .and_then(|rest| DateTime::parse_from_str(rest, "%d %b %Y %H:%M:%S %z").ok()),
            FeedDateFormat::Rfc1123Named => {
                strip_weekday(s).and_then(|rest| parse_named_zone(rest, "%d %b %Y %H:%M:%S"))
            }
            FeedDateFormat::Rfc822Numeric => DateTime::parse_from_str(s, "%d %b %y %H:%M %z").ok(),
            FeedDateFormat::Rfc822Named => parse_named_zone(s, "%d %b %y %H:%M"),
            FeedDateFormat::Rfc3339 => DateTime::parse_from_rfc3339(s).ok(),
            FeedDateFormat::SqlDateTime => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset()),
        }
    }
}

/// Normalize a raw `<pubDate>` value.
///
/// - empty or whitespace-only input is `Ok(None)`: the item has no date
/// - otherwise the first format in [`FeedDateFormat::ALL`] that parses wins
///
/// # Errors
///
/// [`DateFormatError`] when no format matches. Callers treat it as "no date"
/// rather than dropping the item.
pub fn normalize_published(raw: &str) -> Result<Option<DateTime<Utc>>, DateFormatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    FeedDateFormat::ALL
        .iter()
        .find_map(|format| {
            format.parse(trimmed).map(|dt| {
                tracing::trace!(?format, raw = trimmed, "Parsed published date");
                dt.with_timezone(&Utc)
            })
        })
        .map(Some)
        .ok_or_else(|| DateFormatError {
            input: raw.to_string(),
        })
}

/// Drop a leading `Mon, ` style weekday. The name is checked for syntax only,
/// never for agreement with the date that follows.
fn strip_weekday(s: &str) -> Option<&str> {
    let (day, rest) = s.split_once(',')?;
    WEEKDAYS
        .iter()
        .any(|w| w.eq_ignore_ascii_case(day))
        .then(|| rest.trim_start())
}

fn parse_named_zone(s: &str, layout: &str) -> Option<DateTime<FixedOffset>> {
    let (head, zone) = s.rsplit_once(' ')?;
    let offset = FixedOffset::east_opt(zone_offset_seconds(zone)?)?;
    let naive = NaiveDateTime::parse_from_str(head, layout).ok()?;
    offset.from_local_datetime(&naive).single()
}

/// RFC 822 zone names. Any other alphabetic abbreviation of three or more
/// letters is read as UTC.
fn zone_offset_seconds(zone: &str) -> Option<i32> {
    if zone.is_empty() || zone.len() > 5 || !zone.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let hours = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ if zone.len() >= 3 => 0,
        _ => return None,
    };
    Some(hours * 3600)
}
