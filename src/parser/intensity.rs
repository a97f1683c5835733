use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::record::{IntensityKind, IntensityObservation};

static HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Intensity\s+([IVXLCDM]+)\s*[-:]?\s*").unwrap());
static REPORTED_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(instrumental.*|this is.*|expecting.*)").unwrap());
static INSTRUMENTAL_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(this is.*|expecting.*)").unwrap());

const SPLIT_MARKERS: [&str; 2] = ["Instrumental Intensities:", "Instrumental Intensity:"];
const STOP_WORDS: [&str; 4] = ["Intensity", "Instrumental", "This is", "Expecting"];

/// Explode an intensity block into one observation per place.
pub fn parse_intensities(text: &str) -> Vec<IntensityObservation> {
    let (reported, instrumental) = split_sections(text);

    let mut out = Vec::new();
    for (value, places) in scan(reported, &REPORTED_TAIL_RE) {
        push_places(&mut out, IntensityKind::Reported, &value, places);
    }
    for (value, places) in scan(instrumental, &INSTRUMENTAL_TAIL_RE) {
        push_places(&mut out, IntensityKind::Instrumental, &value, places);
    }
    debug!(
        "Extracted {} reported and {} instrumental observations",
        out.iter().filter(|o| o.kind == IntensityKind::Reported).count(),
        out.iter().filter(|o| o.kind == IntensityKind::Instrumental).count(),
    );
    out
}

fn push_places(
    out: &mut Vec<IntensityObservation>,
    kind: IntensityKind,
    value: &str,
    places: Vec<String>,
) {
    out.extend(places.into_iter().map(|location| IntensityObservation {
        kind,
        value: value.to_string(),
        location,
    }));
}

// Plural marker wins over singular.
fn split_sections(text: &str) -> (&str, &str) {
    for marker in SPLIT_MARKERS {
        if let Some((head, tail)) = text.split_once(marker) {
            return (head, tail);
        }
    }
    (text, "")
}

/// `(roman value, places)` per `Intensity <roman>` head, in order.
fn scan(segment: &str, tail_re: &Regex) -> Vec<(String, Vec<String>)> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(caps) = HEAD_RE.captures_at(segment, pos) {
        let head = caps.get(0).map_or(pos..pos, |m| m.range());
        let start = head.end;
        pos = head.end.max(pos + 1);

        let rest = &segment[start..];
        let Some(first) = rest.chars().next().filter(|c| *c != '\n') else {
            continue;
        };
        let end = start + first.len_utf8() + stop_offset(&rest[first.len_utf8()..]);
        pos = end;

        let places = split_places(&segment[start..end], tail_re);
        if !places.is_empty() {
            found.push((caps[1].to_string(), places));
        }
    }
    found
}

// Distance to the next newline or stop word, or the end of `s`.
fn stop_offset(s: &str) -> usize {
    let newline = s.find('\n');
    STOP_WORDS
        .iter()
        .filter_map(|w| s.find(w))
        .chain(newline)
        .min()
        .unwrap_or(s.len())
}

fn split_places(raw: &str, tail_re: &Regex) -> Vec<String> {
    let cleaned = tail_re.replace_all(raw.trim(), "");
    let mut places: Vec<String> = Vec::new();
    for group in cleaned.split(';') {
        for place in group.split(',') {
            let place = place.trim();
            if !place.is_empty() && !places.iter().any(|p| p == place) {
                places.push(place.to_string());
            }
        }
    }
    places
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(obs: &[IntensityObservation], kind: IntensityKind) -> Vec<(&str, &str)> {
        obs.iter()
            .filter(|o| o.kind == kind)
            .map(|o| (o.value.as_str(), o.location.as_str()))
            .collect()
    }

    #[test]
    fn reported_and_instrumental_split() {
        let text = "Reported Intensities:\nIntensity V - San Francisco, Surigao Del Norte\n\
                    Intensity III - Surigao City; Placer, Surigao City\n\n\
                    Instrumental Intensities:\nIntensity IV - Surigao City\nIntensity II - Gingoog City\n";
        let obs = parse_intensities(text);
        assert_eq!(
            pairs(&obs, IntensityKind::Reported),
            vec![
                ("V", "San Francisco"),
                ("V", "Surigao Del Norte"),
                ("III", "Surigao City"),
                ("III", "Placer"),
            ]
        );
        assert_eq!(
            pairs(&obs, IntensityKind::Instrumental),
            vec![("IV", "Surigao City"), ("II", "Gingoog City")]
        );
    }

    #[test]
    fn singular_marker_and_inline_heads() {
        let text = "Intensity IV: Vigan City Intensity II: Laoag City \
                    Instrumental Intensity: Intensity III - Batac City";
        let obs = parse_intensities(text);
        assert_eq!(
            pairs(&obs, IntensityKind::Reported),
            vec![("IV", "Vigan City"), ("II", "Laoag City")]
        );
        assert_eq!(
            pairs(&obs, IntensityKind::Instrumental),
            vec![("III", "Batac City")]
        );
    }

    #[test]
    fn advisory_text_dropped() {
        let text = "Intensity III - Davao City; this is an automatic report\n\
                    Instrumental Intensities:\nIntensity I - Digos City Expecting damage: none";
        let obs = parse_intensities(text);
        assert_eq!(pairs(&obs, IntensityKind::Reported), vec![("III", "Davao City")]);
        assert_eq!(pairs(&obs, IntensityKind::Instrumental), vec![("I", "Digos City")]);
    }

    #[test]
    fn empty_block_yields_nothing() {
        assert!(parse_intensities("").is_empty());
        assert!(parse_intensities("No reported intensities").is_empty());
    }
}
