use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

static KEY_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}_\d{4}_\d{4})").unwrap());
static BULLETIN_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_B.*$").unwrap());
static NON_KEY_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").unwrap());

/// One published bulletin version, as extracted from an event page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventRecord {
    pub sequence_number: Option<i64>,
    pub occurred_at: Option<NaiveDateTime>,
    pub issued_at: Option<NaiveDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude_str: String,
    pub longitude_str: String,
    pub region: String,
    pub location: String,
    pub municipality: String,
    pub province: String,
    pub depth_km: Option<i64>,
    pub depth_str: String,
    pub origin: String,
    pub magnitude_type: Option<String>,
    pub magnitude_value: Option<f64>,
    pub magnitude_str: String,
    pub source_filename: String,
    pub authors: Vec<Author>,
    pub expecting_damage: String,
    pub expecting_aftershocks: String,
    pub intensities: Vec<IntensityObservation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub slot: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityKind {
    Reported,
    Instrumental,
}

impl IntensityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntensityKind::Reported => "reported",
            IntensityKind::Instrumental => "instrumental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reported" => Some(IntensityKind::Reported),
            "instrumental" => Some(IntensityKind::Instrumental),
            _ => None,
        }
    }
}

/// Shaking intensity at a single place. Owned by its event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityObservation {
    pub kind: IntensityKind,
    pub value: String,
    pub location: String,
}

impl EventRecord {
    /// Sequence number and origin time are both required before a record
    /// may reach the store.
    pub fn is_valid(&self) -> bool {
        self.sequence_number.is_some() && self.occurred_at.is_some()
    }

    /// `{YYYY_MMDD_HHMM}_{Province_Name}`, stable across bulletin revisions.
    pub fn business_key(&self) -> Result<String, KeyError> {
        // Map sources sometimes carry a directory; only the file name counts.
        let name = self
            .source_filename
            .trim()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();

        let prefix = match KEY_PREFIX_RE.captures(name) {
            Some(caps) => caps[1].to_string(),
            None => BULLETIN_SUFFIX_RE.replace(name, "").into_owned(),
        };
        if prefix.is_empty() {
            return Err(KeyError::MalformedFilename(self.source_filename.clone()));
        }

        let province = self.province.trim().replace(' ', "_");
        let province = NON_KEY_CHARS_RE.replace_all(&province, "");
        if province.is_empty() {
            return Err(KeyError::MissingProvince(prefix));
        }

        Ok(format!("{}_{}", prefix, province))
    }
}

/// Bulk-load tie break: a candidate only replaces the current pick when it
/// carries a strictly higher sequence number, or the current one has none.
pub fn is_better_version(new: &EventRecord, current: &EventRecord) -> bool {
    match (new.sequence_number, current.sequence_number) {
        (None, None) => false,
        (None, Some(_)) => false,
        (Some(_), None) => true,
        (Some(n), Some(c)) => n > c,
    }
}
