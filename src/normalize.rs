//! Date parsing and field defaults.
//!
//! Listing sites print dates for humans: `Sat, May 4, 7:00 PM`, `1st June`,
//! `3 May - 9 Jun 2024`, `Until 30 Jun`. Parsing is best-effort. Text that yields
//! no date leaves `date` as `None` and keeps the raw text in `date_text`, so the
//! outcome is the same for the same input on every run.

use crate::constants::{DEFAULT_LOCATION, DEFAULT_PRICE, DEFAULT_TIME};
use crate::types::{NormalizedEvent, RawEvent};
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})").expect("valid regex"));
static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2}|\d{4}))?\b").expect("valid regex")
});
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"));
static CLOCK_12H: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:[:.](\d{2}))?\s*([ap])\.?m\.?\b").expect("valid regex")
});
static CLOCK_24H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\b|T)([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid regex"));
static RANGE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+(?:-|–|—|to)\s+|–|—").expect("valid regex"));

/// How far back a year-less date may fall before it is read as next year's
const YEAR_ROLLOVER_DAYS: i64 = 60;

const FILLER_WORDS: [&str; 8] = ["until", "from", "on", "starts", "ends", "every", "daily", "and"];

fn month_number(token: &str) -> Option<u32> {
    let month = match token.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn is_weekday(token: &str) -> bool {
    ["mon", "tue", "wed", "thu", "fri", "sat", "sun"]
        .iter()
        .any(|d| token.starts_with(d))
        && token.len() <= "wednesday".len()
        && month_number(token).is_none()
}

fn strip_ordinal(token: &str) -> &str {
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(num) = token.strip_suffix(suffix) {
            if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
                return num;
            }
        }
    }
    token
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    reference: NaiveDate,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::today()
    }
}

impl Normalizer {
    /// `reference` decides the year of dates printed without one
    pub fn new(reference: NaiveDate) -> Self {
        Self { reference }
    }

    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn normalize(&self, raw: RawEvent) -> NormalizedEvent {
        let date_text = raw
            .date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TIME)
            .to_string();
        let date = raw.date.as_deref().and_then(|d| self.parse_date(d));
        let time = raw
            .time
            .filter(|t| !t.trim().is_empty())
            .or_else(|| raw.date.as_deref().and_then(parse_time))
            .unwrap_or_else(|| DEFAULT_TIME.to_string());

        NormalizedEvent {
            title: raw.title.trim().to_string(),
            description: raw.description.unwrap_or_default(),
            date,
            date_text,
            time,
            location: raw.location.unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            price: raw.price.unwrap_or_else(|| DEFAULT_PRICE.to_string()),
            image_url: raw.image_url,
            source_url: raw.source_url.unwrap_or_default(),
            source: raw.source,
        }
    }

    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(c) = ISO_DATE.captures(text) {
            return NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        }

        // for ranges the first date is the one that matters; its month and year
        // may only be printed on the last
        let mut segments = RANGE_SPLIT.split(text);
        let first = segments.next().unwrap_or(text);
        let trailing_year = YEAR
            .find_iter(text)
            .last()
            .and_then(|m| m.as_str().parse::<i32>().ok());

        if let Some(c) = NUMERIC_DATE.captures(first) {
            let day: u32 = c[1].parse().ok()?;
            let month: u32 = c[2].parse().ok()?;
            let year = match c.get(3) {
                Some(y) if y.as_str().len() == 2 => Some(2000 + y.as_str().parse::<i32>().ok()?),
                Some(y) => Some(y.as_str().parse().ok()?),
                None => trailing_year,
            };
            return self.complete(year, month, day);
        }

        let (year, mut month, day) = date_parts(first);
        if month.is_none() {
            month = segments.find_map(|segment| date_parts(segment).1);
        }

        self.complete(year.or(trailing_year), month?, day?)
    }

    fn complete(&self, year: Option<i32>, month: u32, day: u32) -> Option<NaiveDate> {
        if let Some(year) = year {
            return NaiveDate::from_ymd_opt(year, month, day);
        }
        let this_year = NaiveDate::from_ymd_opt(self.reference.year(), month, day);
        match this_year {
            Some(d) if d >= self.reference - Duration::days(YEAR_ROLLOVER_DAYS) => Some(d),
            _ => NaiveDate::from_ymd_opt(self.reference.year() + 1, month, day),
        }
    }
}

/// Year, month and day words found in one segment of date text
fn date_parts(segment: &str) -> (Option<i32>, Option<u32>, Option<u32>) {
    let mut year = None;
    let mut month = None;
    let mut day = None;
    let lowered = segment.to_lowercase().replace([',', '.'], " ");
    for token in lowered.split_whitespace() {
        if CLOCK_12H.is_match(token) || token.contains(':') || is_weekday(token) {
            continue;
        }
        if FILLER_WORDS.contains(&token) {
            continue;
        }
        // `12-14` is a day range; keep the first day
        let token = strip_ordinal(token.split('-').next().unwrap_or(token));
        if let Ok(n) = token.parse::<u32>() {
            if token.len() == 4 {
                year = year.or(Some(n as i32));
            } else if (1..=31).contains(&n) {
                day = day.or(Some(n));
            }
        } else if let Some(m) = month_number(token) {
            month = month.or(Some(m));
        }
    }
    (year, month, day)
}

/// Finds a clock time in free text and renders it as `7:00 PM`
pub fn parse_time(text: &str) -> Option<String> {
    let time = if let Some(c) = CLOCK_12H.captures(text) {
        let hour: u32 = c[1].parse().ok()?;
        let minute: u32 = c.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let pm = c[3].eq_ignore_ascii_case("p");
        let hour24 = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        NaiveTime::from_hms_opt(hour24, minute, 0)?
    } else {
        let c = CLOCK_24H.captures(text)?;
        NaiveTime::from_hms_opt(c[1].parse().ok()?, c[2].parse().ok()?, 0)?
    };
    Some(time.format("%-I:%M %p").to_string())
}
