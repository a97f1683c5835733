use anyhow::Result;
use chrono::{Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::regions;
use super::Store;

const MAX_ROWS: usize = 5_000;
const OVERRIDE_MAGNITUDE: f64 = 2.0;
const OVERRIDE_SPAN_DAYS: i64 = 180;
const OVERRIDE_REASON: &str =
    "Performance protection: magnitude ≤2.0 + date range >6 months → limited to current month";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub magnitude_min: Option<f64>,
    pub magnitude_max: Option<f64>,
    pub region: Option<String>,
    pub origin: Option<String>,
    pub lat_min: Option<f64>,
    pub lat_max: Option<f64>,
    pub lon_min: Option<f64>,
    pub lon_max: Option<f64>,
}

impl EventFilter {
    fn region(&self) -> Option<&str> {
        self.region.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn origin(&self) -> Option<&str> {
        self.origin.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        Some((self.lat_min?, self.lat_max?, self.lon_min?, self.lon_max?))
    }

    /// Low-magnitude floor over a long explicit range gets re-scoped.
    fn needs_override(&self) -> bool {
        let low_floor = self.magnitude_min.is_some_and(|m| m <= OVERRIDE_MAGNITUDE);
        match (self.date_from, self.date_to) {
            (Some(from), Some(to)) => low_floor && (to - from).num_days() > OVERRIDE_SPAN_DAYS,
            _ => false,
        }
    }
}

/// One row of a query result, with the strongest intensities folded in.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub sequence_number: i64,
    pub occurred_at: Option<NaiveDateTime>,
    pub region: String,
    pub province: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude_str: String,
    pub longitude_str: String,
    pub depth_str: String,
    pub origin: String,
    pub magnitude_value: Option<f64>,
    pub magnitude_str: String,
    pub max_reported_intensity: Option<String>,
    pub max_reported_location: Option<String>,
    pub max_instrumental_intensity: Option<String>,
    pub max_instrumental_location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResult {
    pub events: Vec<EventSummary>,
    pub total_count: usize,
    pub override_applied: bool,
    pub override_reason: Option<String>,
    pub filter_description: String,
    pub current_date_range: Option<String>,
}

/// `[first of month 00:00, first of next month 00:00)` around `today`.
pub(crate) fn month_bounds(today: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let first = today - Days::new(u64::from(today.day0()));
    let next = first + Months::new(1);
    (first.and_time(NaiveTime::MIN), next.and_time(NaiveTime::MIN))
}

fn roman_rank(value: &str) -> u8 {
    match value {
        "I" => 1,
        "II" => 2,
        "III" => 3,
        "IV" => 4,
        "V" => 5,
        "VI" => 6,
        "VII" => 7,
        "VIII" => 8,
        "IX" => 9,
        "X" => 10,
        _ => 0,
    }
}

/// Strongest value (first seen at the top rank) and every place at that rank.
fn strongest(rows: &[(String, String)]) -> Option<(String, String)> {
    let top = rows.iter().map(|(v, _)| roman_rank(v)).max()?;
    let at_top: Vec<&(String, String)> = rows.iter().filter(|(v, _)| roman_rank(v) == top).collect();
    let value = at_top.first()?.0.clone();
    let places = at_top
        .iter()
        .map(|(_, loc)| loc.as_str())
        .filter(|loc| !loc.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    Some((value, places))
}

impl Store {
    pub fn query(&self, filter: &EventFilter) -> Result<QueryResult> {
        self.query_at(filter, Local::now().date_naive())
    }

    /// [`Store::query`] with "today" supplied by the caller.
    pub fn query_at(&self, filter: &EventFilter, today: NaiveDate) -> Result<QueryResult> {
        let (month_start, month_end) = month_bounds(today);
        let override_applied = filter.needs_override();

        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        let default_scope = filter.date_from.is_none() && filter.date_to.is_none();
        if override_applied || default_scope {
            conditions.push(format!(
                "occurred_at >= ?{} AND occurred_at < ?{}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(Box::new(month_start));
            params.push(Box::new(month_end));
        } else {
            if let Some(from) = filter.date_from {
                conditions.push(format!("occurred_at >= ?{}", params.len() + 1));
                params.push(Box::new(from.and_time(NaiveTime::MIN)));
            }
            if let Some(end) = filter.date_to.and_then(|to| to.and_hms_opt(23, 59, 59)) {
                conditions.push(format!("occurred_at <= ?{}", params.len() + 1));
                params.push(Box::new(end));
            }
        }

        if !override_applied {
            if let Some(min) = filter.magnitude_min {
                conditions.push(format!("magnitude_value >= ?{}", params.len() + 1));
                params.push(Box::new(min));
            }
        }
        if let Some(max) = filter.magnitude_max {
            conditions.push(format!("magnitude_value <= ?{}", params.len() + 1));
            params.push(Box::new(max));
        }

        if let Some(region) = filter.region() {
            let provinces = regions::provinces_for(region);
            if !provinces.is_empty() {
                let slots: Vec<String> = provinces
                    .iter()
                    .map(|p| {
                        params.push(Box::new(p.to_lowercase()));
                        format!("?{}", params.len())
                    })
                    .collect();
                conditions.push(format!("LOWER(province) IN ({})", slots.join(", ")));
            }
        }

        if let Some(origin) = filter.origin() {
            conditions.push(format!("LOWER(origin) LIKE ?{}", params.len() + 1));
            params.push(Box::new(format!("%{}%", origin.to_lowercase())));
        }

        if let Some((lat_min, lat_max, lon_min, lon_max)) = filter.bbox() {
            let n = params.len();
            conditions.push(format!(
                "latitude >= ?{} AND latitude <= ?{} AND longitude >= ?{} AND longitude <= ?{}",
                n + 1,
                n + 2,
                n + 3,
                n + 4
            ));
            params.push(Box::new(lat_min));
            params.push(Box::new(lat_max));
            params.push(Box::new(lon_min));
            params.push(Box::new(lon_max));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT id, sequence_number, occurred_at, COALESCE(region,''), COALESCE(province,''),
                    latitude, longitude, COALESCE(latitude_str,''), COALESCE(longitude_str,''),
                    COALESCE(depth_str,''), COALESCE(origin,''), magnitude_value,
                    COALESCE(magnitude_str,'')
             FROM seismic_events{}
             ORDER BY occurred_at DESC
             LIMIT {}",
            where_clause, MAX_ROWS
        );

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    EventSummary {
                        sequence_number: row.get(1)?,
                        occurred_at: row.get(2)?,
                        region: row.get(3)?,
                        province: row.get(4)?,
                        latitude: row.get(5)?,
                        longitude: row.get(6)?,
                        latitude_str: row.get(7)?,
                        longitude_str: row.get(8)?,
                        depth_str: row.get(9)?,
                        origin: row.get(10)?,
                        magnitude_value: row.get(11)?,
                        magnitude_str: row.get(12)?,
                        max_reported_intensity: None,
                        max_reported_location: None,
                        max_instrumental_intensity: None,
                        max_instrumental_location: None,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut intensity_stmt = conn.prepare(
            "SELECT kind, intensity_value, location FROM intensities WHERE event_id = ?1 ORDER BY id",
        )?;
        let mut events = Vec::with_capacity(rows.len());
        for (id, mut summary) in rows {
            let mut reported = Vec::new();
            let mut instrumental = Vec::new();
            let observations = intensity_stmt
                .query_map(rusqlite::params![id], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (kind, value, location) in observations {
                match kind.as_str() {
                    "reported" => reported.push((value, location)),
                    "instrumental" => instrumental.push((value, location)),
                    _ => {}
                }
            }
            if let Some((value, places)) = strongest(&reported) {
                summary.max_reported_intensity = Some(value);
                summary.max_reported_location = Some(places);
            }
            if let Some((value, places)) = strongest(&instrumental) {
                summary.max_instrumental_intensity = Some(value);
                summary.max_instrumental_location = Some(places);
            }
            events.push(summary);
        }

        let month_last = (month_end.date() - Days::new(1)).format("%Y-%m-%d");
        let month_first = month_start.date().format("%Y-%m-%d");
        let current_date_range = override_applied.then(|| format!("{} to {}", month_first, month_last));

        let filter_description = describe(filter, override_applied, current_date_range.as_deref());
        info!(
            "Retrieved {} earthquakes with filters: {}",
            events.len(),
            filter_description
        );

        Ok(QueryResult {
            total_count: events.len(),
            events,
            override_applied,
            override_reason: override_applied.then(|| OVERRIDE_REASON.to_string()),
            filter_description,
            current_date_range,
        })
    }
}

fn describe(filter: &EventFilter, override_applied: bool, month_range: Option<&str>) -> String {
    let mut parts = Vec::new();

    match (month_range, filter.date_from, filter.date_to) {
        (Some(range), _, _) => parts.push(format!("date range {}", range)),
        (None, None, None) => parts.push("current month (default)".to_string()),
        (None, Some(from), Some(to)) => parts.push(format!("date range {} to {}", from, to)),
        (None, Some(from), None) => parts.push(format!("from {}", from)),
        (None, None, Some(to)) => parts.push(format!("until {}", to)),
    }

    if override_applied {
        parts.push("performance override applied".to_string());
    } else if filter.magnitude_min.is_some() || filter.magnitude_max.is_some() {
        let mut range = Vec::new();
        if let Some(min) = filter.magnitude_min {
            range.push(format!("≥{}", min));
        }
        if let Some(max) = filter.magnitude_max {
            range.push(format!("≤{}", max));
        }
        parts.push(format!("magnitude {}", range.join(" and ")));
    }

    if let Some(region) = filter.region() {
        parts.push(format!("region '{}'", region));
    }
    if let Some(origin) = filter.origin() {
        parts.push(format!("origin contains '{}'", origin));
    }
    if let Some((lat_min, lat_max, lon_min, lon_max)) = filter.bbox() {
        parts.push(format!(
            "geographic bounds ({},{}) to ({},{})",
            lat_min, lon_min, lat_max, lon_max
        ));
    }

    if parts.is_empty() {
        "no filters".to_string()
    } else {
        parts.join(", ")
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{observation, sample_record, temp_store};
    use crate::record::{EventRecord, IntensityKind};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(stamp: &str, day: NaiveDate, magnitude: f64, province: &str) -> EventRecord {
        let mut r = sample_record(1);
        r.source_filename = format!("{}_B1", stamp);
        r.occurred_at = day.and_hms_opt(8, 30, 0);
        r.magnitude_value = Some(magnitude);
        r.magnitude_str = format!("Ms {:.1}", magnitude);
        r.province = province.to_string();
        r
    }

    /// August 2025 "today", with events spread over the year.
    fn seeded() -> Store {
        let store = temp_store();
        for r in [
            event("2025_0803_0830", date(2025, 8, 3), 1.8, "Surigao Del Norte"),
            event("2025_0831_0830", date(2025, 8, 31), 4.6, "Batangas"),
            event("2025_0715_0830", date(2025, 7, 15), 1.9, "Abra"),
            event("2025_0301_0830", date(2025, 3, 1), 3.1, "Leyte"),
            event("2025_0901_0830", date(2025, 9, 1), 5.0, "Cebu"),
        ] {
            assert_eq!(store.upsert(&r), crate::db::UpsertOutcome::Inserted);
        }
        store
    }

    fn today() -> NaiveDate {
        date(2025, 8, 15)
    }

    fn provinces(result: &QueryResult) -> Vec<&str> {
        result.events.iter().map(|e| e.province.as_str()).collect()
    }

    #[test]
    fn month_bounds_cover_calendar_month() {
        let (start, end) = month_bounds(date(2024, 12, 31));
        assert_eq!(start, date(2024, 12, 1).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(end, date(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn default_scope_is_current_month() {
        let store = seeded();
        let result = store.query_at(&EventFilter::default(), today()).unwrap();
        assert_eq!(provinces(&result), vec!["Batangas", "Surigao Del Norte"]);
        assert!(!result.override_applied);
        assert_eq!(result.filter_description, "current month (default)");
    }

    #[test]
    fn explicit_range_is_inclusive_to_end_of_day() {
        let store = seeded();
        let filter = EventFilter {
            date_from: Some(date(2025, 7, 15)),
            date_to: Some(date(2025, 8, 3)),
            ..Default::default()
        };
        let result = store.query_at(&filter, today()).unwrap();
        assert_eq!(provinces(&result), vec!["Surigao Del Norte", "Abra"]);
        assert_eq!(result.filter_description, "date range 2025-07-15 to 2025-08-03");
    }

    #[test]
    fn long_low_magnitude_range_is_overridden() {
        let store = seeded();
        let filter = EventFilter {
            date_from: Some(date(2025, 1, 1)),
            date_to: Some(date(2025, 7, 20)),
            magnitude_min: Some(1.5),
            magnitude_max: Some(4.0),
            ..Default::default()
        };
        let result = store.query_at(&filter, today()).unwrap();
        assert!(result.override_applied);
        assert_eq!(result.override_reason.as_deref(), Some(OVERRIDE_REASON));
        assert_eq!(result.current_date_range.as_deref(), Some("2025-08-01 to 2025-08-31"));
        // Current month only, magnitude_max still applied.
        assert_eq!(provinces(&result), vec!["Surigao Del Norte"]);
        assert_eq!(
            result.filter_description,
            "date range 2025-08-01 to 2025-08-31, performance override applied"
        );
    }

    #[test]
    fn short_low_magnitude_range_is_honoured() {
        let store = seeded();
        let filter = EventFilter {
            date_from: Some(date(2025, 5, 1)),
            date_to: Some(date(2025, 7, 30)),
            magnitude_min: Some(1.5),
            ..Default::default()
        };
        let result = store.query_at(&filter, today()).unwrap();
        assert!(!result.override_applied);
        assert!(result.current_date_range.is_none());
        assert_eq!(provinces(&result), vec!["Abra"]);
    }

    #[test]
    fn region_matches_provinces_case_insensitively() {
        let store = seeded();
        let filter = EventFilter {
            region: Some("Region XIII".into()),
            ..Default::default()
        };
        let result = store.query_at(&filter, today()).unwrap();
        assert_eq!(provinces(&result), vec!["Surigao Del Norte"]);
        assert_eq!(
            result.filter_description,
            "current month (default), region 'Region XIII'"
        );
    }

    #[test]
    fn origin_and_bbox_filters() {
        let store = seeded();
        let filter = EventFilter {
            origin: Some("tecto".into()),
            lat_min: Some(9.0),
            lat_max: Some(10.0),
            lon_min: Some(125.0),
            lon_max: Some(126.0),
            ..Default::default()
        };
        let result = store.query_at(&filter, today()).unwrap();
        assert_eq!(result.total_count, 2);

        let partial_box = EventFilter {
            lat_min: Some(50.0),
            ..Default::default()
        };
        let result = store.query_at(&partial_box, today()).unwrap();
        assert_eq!(result.total_count, 2);
    }

    #[test]
    fn strongest_intensity_per_kind() {
        let store = temp_store();
        let mut r = event("2025_0810_0100", date(2025, 8, 10), 5.2, "Leyte");
        r.intensities = vec![
            observation(IntensityKind::Reported, "V", "Ormoc"),
            observation(IntensityKind::Reported, "VII", "Tacloban"),
            observation(IntensityKind::Reported, "VII", "Palo"),
            observation(IntensityKind::Reported, "?", "Nowhere"),
            observation(IntensityKind::Instrumental, "IV", "Tacloban"),
        ];
        store.upsert(&r);

        let result = store.query_at(&EventFilter::default(), today()).unwrap();
        let e = &result.events[0];
        assert_eq!(e.max_reported_intensity.as_deref(), Some("VII"));
        assert_eq!(e.max_reported_location.as_deref(), Some("Tacloban; Palo"));
        assert_eq!(e.max_instrumental_intensity.as_deref(), Some("IV"));
        assert_eq!(e.max_instrumental_location.as_deref(), Some("Tacloban"));
    }

    #[test]
    fn strongest_of_nothing_is_none() {
        assert!(strongest(&[]).is_none());
    }
}
