pub mod query;
pub mod regions;
pub mod upsert;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::record::{Author, EventRecord, IntensityKind, IntensityObservation};

pub use query::EventFilter;
pub use upsert::UpsertOutcome;

/// SQLite-backed event store. Every operation opens its own connection and
/// drops it before returning.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<Connection> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }

    pub fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS seismic_events (
                id                    INTEGER PRIMARY KEY,
                business_key          TEXT UNIQUE NOT NULL,
                sequence_number       INTEGER NOT NULL,
                occurred_at           TEXT,
                issued_at             TEXT,
                latitude              REAL,
                longitude             REAL,
                latitude_str          TEXT,
                longitude_str         TEXT,
                region                TEXT,
                location              TEXT,
                municipality          TEXT,
                province              TEXT,
                depth_km              INTEGER,
                depth_str             TEXT,
                origin                TEXT,
                magnitude_type        TEXT,
                magnitude_value       REAL,
                magnitude_str         TEXT,
                source_filename       TEXT,
                authors               TEXT NOT NULL DEFAULT '[]',
                expecting_damage      TEXT,
                expecting_aftershocks TEXT,
                created_at            TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at            TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_events_occurred ON seismic_events(occurred_at);
            CREATE INDEX IF NOT EXISTS idx_events_province ON seismic_events(province);
            CREATE INDEX IF NOT EXISTS idx_events_origin ON seismic_events(origin);
            CREATE INDEX IF NOT EXISTS idx_events_lat_lon ON seismic_events(latitude, longitude);
            CREATE INDEX IF NOT EXISTS idx_events_province_occurred
                ON seismic_events(province, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_events_magnitude_occurred
                ON seismic_events(magnitude_value, occurred_at);

            CREATE TABLE IF NOT EXISTS intensities (
                id              INTEGER PRIMARY KEY,
                event_id        INTEGER NOT NULL REFERENCES seismic_events(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL CHECK(kind IN ('reported','instrumental')),
                intensity_value TEXT NOT NULL,
                location        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_intensities_event ON intensities(event_id);
            ",
        )?;
        Ok(())
    }

    pub fn ping(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
        Ok(())
    }

    /// Stored row for `business_key`, intensities included.
    pub fn fetch_event(&self, business_key: &str) -> Result<Option<StoredEvent>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT id, business_key, sequence_number, occurred_at, issued_at,
                        latitude, longitude, COALESCE(latitude_str,''), COALESCE(longitude_str,''),
                        COALESCE(region,''), COALESCE(location,''), COALESCE(municipality,''),
                        COALESCE(province,''), depth_km, COALESCE(depth_str,''), COALESCE(origin,''),
                        magnitude_type, magnitude_value, COALESCE(magnitude_str,''),
                        COALESCE(source_filename,''), authors,
                        COALESCE(expecting_damage,''), COALESCE(expecting_aftershocks,''),
                        created_at, updated_at
                 FROM seismic_events WHERE business_key = ?1",
                rusqlite::params![business_key],
                |r| {
                    let authors: String = r.get(20)?;
                    Ok((
                        StoredEvent {
                            id: r.get(0)?,
                            business_key: r.get(1)?,
                            record: EventRecord {
                                sequence_number: r.get(2)?,
                                occurred_at: r.get(3)?,
                                issued_at: r.get(4)?,
                                latitude: r.get(5)?,
                                longitude: r.get(6)?,
                                latitude_str: r.get(7)?,
                                longitude_str: r.get(8)?,
                                region: r.get(9)?,
                                location: r.get(10)?,
                                municipality: r.get(11)?,
                                province: r.get(12)?,
                                depth_km: r.get(13)?,
                                depth_str: r.get(14)?,
                                origin: r.get(15)?,
                                magnitude_type: r.get(16)?,
                                magnitude_value: r.get(17)?,
                                magnitude_str: r.get(18)?,
                                source_filename: r.get(19)?,
                                authors: Vec::new(),
                                expecting_damage: r.get(21)?,
                                expecting_aftershocks: r.get(22)?,
                                intensities: Vec::new(),
                            },
                            created_at: r.get(23)?,
                            updated_at: r.get(24)?,
                        },
                        authors,
                    ))
                },
            )
            .optional()?;

        let Some((mut event, authors)) = row else {
            return Ok(None);
        };
        event.record.authors = serde_json::from_str::<Vec<Author>>(&authors)
            .with_context(|| format!("Corrupt authors for {}", business_key))?;
        event.record.intensities = load_intensities(&conn, event.id)?;
        Ok(Some(event))
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.connect()?;
        let (month_start, month_end) = query::month_bounds(chrono::Local::now().date_naive());

        let total_events: usize =
            conn.query_row("SELECT COUNT(*) FROM seismic_events", [], |r| r.get(0))?;
        let total_intensities: usize =
            conn.query_row("SELECT COUNT(*) FROM intensities", [], |r| r.get(0))?;
        let events_this_month: usize = conn.query_row(
            "SELECT COUNT(*) FROM seismic_events WHERE occurred_at >= ?1 AND occurred_at < ?2",
            rusqlite::params![month_start, month_end],
            |r| r.get(0),
        )?;
        let with_coordinates: usize = conn.query_row(
            "SELECT COUNT(*) FROM seismic_events WHERE latitude IS NOT NULL AND longitude IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let with_intensities: usize = conn.query_row(
            "SELECT COUNT(DISTINCT event_id) FROM intensities",
            [],
            |r| r.get(0),
        )?;
        let (earliest, latest): (Option<NaiveDateTime>, Option<NaiveDateTime>) = conn.query_row(
            "SELECT MIN(occurred_at), MAX(occurred_at) FROM seismic_events",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let latest_event = conn
            .query_row(
                "SELECT sequence_number, occurred_at, COALESCE(region,''), COALESCE(magnitude_str,'')
                 FROM seismic_events
                 WHERE occurred_at IS NOT NULL
                 ORDER BY occurred_at DESC LIMIT 1",
                [],
                |r| {
                    Ok(LatestEvent {
                        sequence_number: r.get(0)?,
                        occurred_at: r.get(1)?,
                        region: r.get(2)?,
                        magnitude_str: r.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(StoreStats {
            total_events,
            total_intensities,
            events_this_month,
            with_coordinates,
            with_intensities,
            earliest,
            latest,
            latest_event,
        })
    }

    pub fn date_coverage(&self) -> Result<DateCoverage> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT date(occurred_at) FROM seismic_events
             WHERE occurred_at IS NOT NULL
             ORDER BY 1",
        )?;
        let dates = stmt
            .query_map([], |r| r.get::<_, NaiveDate>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DateCoverage {
            min: dates.first().copied(),
            max: dates.last().copied(),
            dates,
        })
    }
}

pub(crate) fn load_intensities(conn: &Connection, event_id: i64) -> Result<Vec<IntensityObservation>> {
    let mut stmt = conn.prepare(
        "SELECT kind, intensity_value, location FROM intensities WHERE event_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![event_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(kind, value, location)| -> Result<IntensityObservation> {
            let kind = IntensityKind::parse(&kind)
                .with_context(|| format!("Unknown intensity kind {:?}", kind))?;
            Ok(IntensityObservation { kind, value, location })
        })
        .collect()
}

/// An event as persisted, with the store-managed columns.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub business_key: String,
    pub record: EventRecord,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct LatestEvent {
    pub sequence_number: i64,
    pub occurred_at: NaiveDateTime,
    pub region: String,
    pub magnitude_str: String,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total_events: usize,
    pub total_intensities: usize,
    pub events_this_month: usize,
    pub with_coordinates: usize,
    pub with_intensities: usize,
    pub earliest: Option<NaiveDateTime>,
    pub latest: Option<NaiveDateTime>,
    pub latest_event: Option<LatestEvent>,
}

#[derive(Debug, Serialize)]
pub struct DateCoverage {
    pub min: Option<NaiveDate>,
    pub max: Option<NaiveDate>,
    pub dates: Vec<NaiveDate>,
}

// ── Test helpers ──


#[cfg(test)]
mod tests {
    use super::testing::{sample_record, temp_store};
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let store = temp_store();
        store.init_schema().unwrap();
        store.ping().unwrap();
    }

    #[test]
    fn fetch_round_trips_record() {
        let store = temp_store();
        let record = sample_record(1);
        assert_eq!(store.upsert(&record), UpsertOutcome::Inserted);

        let stored = store
            .fetch_event("2025_0803_0147_Surigao_del_Norte")
            .unwrap()
            .unwrap();
        assert_eq!(stored.record, record);
        assert!(store.fetch_event("missing").unwrap().is_none());
    }

    #[test]
    fn stats_and_coverage() {
        let store = temp_store();
        let mut other = sample_record(1);
        other.source_filename = "2025_0805_1200_B1".into();
        other.occurred_at = NaiveDate::from_ymd_opt(2025, 8, 5).unwrap().and_hms_opt(12, 0, 0);
        other.latitude = None;
        other.intensities.clear();
        store.upsert(&sample_record(1));
        store.upsert(&other);

        let s = store.stats().unwrap();
        assert_eq!(s.total_events, 2);
        assert_eq!(s.total_intensities, 2);
        assert_eq!(s.with_coordinates, 1);
        assert_eq!(s.with_intensities, 1);
        assert_eq!(s.latest, other.occurred_at);
        assert_eq!(s.latest_event.unwrap().occurred_at, other.occurred_at.unwrap());

        let cov = store.date_coverage().unwrap();
        assert_eq!(cov.dates.len(), 2);
        assert_eq!(cov.min, NaiveDate::from_ymd_opt(2025, 8, 3));
        assert_eq!(cov.max, NaiveDate::from_ymd_opt(2025, 8, 5));
    }
}
