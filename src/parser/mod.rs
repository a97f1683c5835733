pub mod fields;
pub mod intensity;
pub mod locate;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::record::EventRecord;

/// Where a field lives on an event page: its marker comment and the label
/// of the table cell used when the marker is missing.
struct FieldSpec {
    marker: &'static str,
    label: LazyLock<Regex>,
}

macro_rules! field {
    ($name:ident, $marker:literal, $label:literal) => {
        static $name: FieldSpec = FieldSpec {
            marker: $marker,
            label: LazyLock::new(|| Regex::new($label).unwrap()),
        };
    };
}

field!(SEQUENCE, "EQInfo-Data", r"EARTHQUAKE\sINFORMATION\sNO\.\s:");
field!(DATETIME, "DateTime-Data", r"Date/Time");
field!(LOCATION, "Location-Data", r"Location");
field!(DEPTH, "Depth-Data", r"^Depth\s+of\s+Focus");
field!(ORIGIN, "Origin-Data", r"Origin");
field!(MAGNITUDE, "Magnitude-Data", r"Magnitude");
field!(MAP, "Map-Data", r"(?i)^map\b");
field!(INTENSITY, "Intensity-Data", r"Reported\s+Intensities");
field!(ISSUED, "IssuedDT-Data", r"Issued\s+On");
field!(AUTHORS, "PreparedBy-Data", r"Prepared\s+by");
field!(DAMAGE, "Damage-Data", r"Expecting\s+Damage");
field!(AFTERSHOCK, "Aftershock-Data", r"Expecting\sAftershock");

fn find<'a>(doc: &'a Html, spec: &FieldSpec) -> Option<ElementRef<'a>> {
    locate::locate(doc, spec.marker, &spec.label)
}

fn text_of(doc: &Html, spec: &FieldSpec) -> Option<String> {
    let text = locate::element_text(find(doc, spec)?);
    if text.is_empty() {
        debug!("{} located but empty", spec.marker);
        None
    } else {
        Some(text)
    }
}

/// Best-effort extraction of one bulletin page. Missing fields stay empty.
pub fn extract_event(doc: &Html) -> EventRecord {
    let mut record = EventRecord::default();

    if let Some(text) = text_of(doc, &SEQUENCE) {
        record.sequence_number = fields::parse_sequence_number(&text);
    }

    if let Some(text) = text_of(doc, &DATETIME) {
        record.occurred_at = fields::parse_datetime(&text);
    }

    if let Some(text) = text_of(doc, &LOCATION) {
        let block = fields::parse_location_block(&text);
        let parts = fields::parse_region(&block.region);
        record.latitude = block.latitude;
        record.longitude = block.longitude;
        record.latitude_str = block.latitude_str;
        record.longitude_str = block.longitude_str;
        record.region = block.region;
        record.location = parts.location;
        record.municipality = parts.municipality;
        record.province = parts.province;
    }

    if let Some(text) = text_of(doc, &DEPTH) {
        record.depth_km = fields::parse_depth(&text);
        record.depth_str = text;
    }

    if let Some(text) = text_of(doc, &ORIGIN) {
        record.origin = text;
    }

    if let Some(text) = text_of(doc, &MAGNITUDE) {
        let (kind, value) = fields::parse_magnitude(&text);
        record.magnitude_type = kind;
        record.magnitude_value = value;
        record.magnitude_str = text;
    }

    if let Some(src) = find(doc, &MAP).and_then(locate::first_img_src) {
        record.source_filename = fields::map_filename(&src);
    }

    if let Some(el) = find(doc, &INTENSITY) {
        record.intensities = intensity::parse_intensities(&locate::element_lines(el));
    }

    if let Some(text) = text_of(doc, &ISSUED) {
        record.issued_at = fields::parse_datetime(&text);
    }

    if let Some(text) = text_of(doc, &AUTHORS) {
        record.authors = fields::parse_authors(&text);
    }

    if let Some(text) = text_of(doc, &DAMAGE) {
        record.expecting_damage = fields::parse_damage(&text);
    }

    if let Some(text) = text_of(doc, &AFTERSHOCK) {
        record.expecting_aftershocks = fields::parse_aftershocks(&text);
    }

    record
}

/// Parse raw page HTML. The parsed tree never leaves this call.
pub fn parse_event_page(html: &str) -> EventRecord {
    let doc = Html::parse_document(html);
    extract_event(&doc)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::IntensityKind;
    use chrono::NaiveDate;

    fn fixture(name: &str) -> EventRecord {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        parse_event_page(&html)
    }

    #[test]
    fn marker_page() {
        let r = fixture("event_markers");
        assert_eq!(r.sequence_number, Some(3));
        assert_eq!(
            r.occurred_at,
            NaiveDate::from_ymd_opt(2025, 8, 3).unwrap().and_hms_opt(1, 47, 0)
        );
        assert_eq!(r.latitude, Some(9.85));
        assert_eq!(r.longitude, Some(125.97));
        assert_eq!(r.location, "San Francisco");
        assert_eq!(r.municipality, "Anao-aon");
        assert_eq!(r.province, "Surigao Del Norte");
        assert_eq!(r.depth_km, Some(10));
        assert_eq!(r.origin, "Tectonic");
        assert_eq!(r.magnitude_type.as_deref(), Some("Ms"));
        assert_eq!(r.magnitude_value, Some(4.2));
        assert_eq!(r.source_filename, "2025_0803_0147_B2");
        assert_eq!(
            r.issued_at,
            NaiveDate::from_ymd_opt(2025, 8, 3).unwrap().and_hms_opt(2, 10, 0)
        );
        assert_eq!(r.authors.len(), 2);
        assert_eq!(r.authors[1].name, "RMP");
        assert_eq!(r.expecting_damage, "NO");
        assert_eq!(r.expecting_aftershocks, "YES");
        assert!(r.is_valid());
        assert_eq!(r.business_key().unwrap(), "2025_0803_0147_Surigao_Del_Norte");
    }

    #[test]
    fn marker_page_intensities() {
        let r = fixture("event_markers");
        let reported = r.intensities.iter().filter(|o| o.kind == IntensityKind::Reported).count();
        let instrumental = r
            .intensities
            .iter()
            .filter(|o| o.kind == IntensityKind::Instrumental)
            .collect::<Vec<_>>();
        assert_eq!(reported, 4);
        assert_eq!(instrumental.len(), 2);
        assert_eq!(instrumental[0].value, "IV");
        assert_eq!(instrumental[1].location, "Gingoog City");
    }

    #[test]
    fn label_page() {
        let r = fixture("event_labels");
        assert_eq!(r.sequence_number, Some(2));
        assert_eq!(
            r.occurred_at,
            NaiveDate::from_ymd_opt(2022, 7, 28).unwrap().and_hms_opt(16, 2, 42)
        );
        assert_eq!(r.latitude, Some(17.52));
        assert_eq!(r.longitude, Some(120.81));
        assert_eq!(r.location, "Tayum");
        assert_eq!(r.province, "Abra");
        assert_eq!(r.depth_km, Some(17));
        assert_eq!(r.depth_str, "017");
        assert_eq!(r.magnitude_value, Some(7.0));
        assert_eq!(r.source_filename, "2022_0728_1602_B2F");
        assert_eq!(r.expecting_aftershocks, "YES");
        assert_eq!(r.business_key().unwrap(), "2022_0728_1602_Abra");
        assert!(r
            .intensities
            .iter()
            .any(|o| o.kind == IntensityKind::Reported && o.value == "VII" && o.location == "Bangued"));
    }

    #[test]
    fn empty_page_is_invalid() {
        let r = parse_event_page("<html><body><p>Not found</p></body></html>");
        assert_eq!(r, EventRecord::default());
        assert!(!r.is_valid());
    }
}
