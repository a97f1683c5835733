use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::warn;

use crate::record::Author;

static SEQUENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"NO\.\s*:\s*(\d+)").unwrap());
static BARE_INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*$").unwrap());
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+)").unwrap());
static COORD_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\d+°[A-Z]").unwrap());
static REGION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{3}\s+.*)").unwrap());
static PARENS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());
static PLACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of\s+([^(]+?)(?:\s*\(|$)").unwrap());
static INT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());
static MAGNITUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]+)\s+(\d+\.\d+)").unwrap());
static UPPER_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Z]+)").unwrap());

// Tried in order; the first that parses wins.
const DATETIME_FORMATS: [&str; 8] = [
    "%d %b %Y %I:%M:%S %p",
    "%d %b %Y %I:%M %p",
    "%d %B %Y %I:%M:%S %p",
    "%d %B %Y %I:%M %p",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
];

const IMAGE_EXTENSIONS: [&str; 3] = [".png", ".jpg", ".gif"];

pub fn parse_sequence_number(text: &str) -> Option<i64> {
    SEQUENCE_RE
        .captures(text)
        .or_else(|| BARE_INT_RE.captures(text))
        .and_then(|caps| caps[1].parse().ok())
}

/// `"28 July 2022 - 04:02:42 PM"` style, date and time split on the first dash.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let (date, time) = text.split_once('-')?;
    let joined = format!("{} {}", date.trim(), time.trim());
    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&joined, fmt).ok());
    if parsed.is_none() {
        warn!("Failed to parse datetime: {:?}", joined);
    }
    parsed
}

/// `"17.52°N"` → 17.52, south and west negated.
pub fn parse_coordinate(text: &str) -> Option<f64> {
    let caps = DECIMAL_RE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    if text.contains('S') || text.contains('W') {
        Some(-value)
    } else {
        Some(value)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct LocationBlock {
    pub latitude_str: String,
    pub longitude_str: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub region: String,
}

pub fn parse_location_block(text: &str) -> LocationBlock {
    let tokens: Vec<&str> = COORD_TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect();
    let mut block = LocationBlock::default();
    if let [lat, lon, ..] = tokens.as_slice() {
        block.latitude_str = lat.to_string();
        block.longitude_str = lon.to_string();
        block.latitude = parse_coordinate(lat);
        block.longitude = parse_coordinate(lon);
    }
    block.region = REGION_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default();
    block
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RegionParts {
    pub location: String,
    pub municipality: String,
    pub province: String,
}

/// `"015 km N 28° W of San Francisco (Anao-aon) (Surigao Del Norte)"`:
/// the last parenthesised group is the province, the one before it the
/// municipality.
pub fn parse_region(region: &str) -> RegionParts {
    let groups: Vec<&str> = PARENS_RE
        .captures_iter(region)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    let mut parts = RegionParts::default();
    if let Some(last) = groups.last() {
        parts.province = last.to_string();
    }
    if groups.len() >= 2 {
        parts.municipality = groups[groups.len() - 2].to_string();
    }
    if let Some(caps) = PLACE_RE.captures(region) {
        parts.location = caps[1].trim().to_string();
    }
    parts
}

pub fn parse_depth(text: &str) -> Option<i64> {
    INT_RE.captures(text).and_then(|caps| caps[1].parse().ok())
}

pub fn parse_magnitude(text: &str) -> (Option<String>, Option<f64>) {
    let Some(caps) = MAGNITUDE_RE.captures(text) else {
        warn!("Invalid magnitude format: {:?}", text);
        return (None, None);
    };
    match caps[2].parse::<f64>() {
        Ok(value) => (Some(caps[1].to_string()), Some(value)),
        Err(_) => (None, None),
    }
}

/// `"JDC / RMP"` → `auth_1 = JDC`, `auth_2 = RMP`.
pub fn parse_authors(text: &str) -> Vec<Author> {
    text.split('/')
        .enumerate()
        .map(|(i, name)| Author {
            slot: format!("auth_{}", i + 1),
            name: name.trim().to_string(),
        })
        .collect()
}

pub fn parse_damage(text: &str) -> String {
    text.to_uppercase()
}

pub fn parse_aftershocks(text: &str) -> String {
    let upper = text.to_uppercase();
    if upper == "YES" || upper == "NO" {
        return upper;
    }
    UPPER_RUN_RE
        .captures(text)
        .map(|caps| caps[1].to_uppercase())
        .unwrap_or_default()
}

/// Map image source with its extension removed.
pub fn map_filename(src: &str) -> String {
    let src = src.trim();
    IMAGE_EXTENSIONS
        .iter()
        .find_map(|ext| src.strip_suffix(ext))
        .unwrap_or(src)
        .to_string()
}
