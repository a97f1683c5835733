use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::Store;
use crate::record::{is_better_version, EventRecord, IntensityObservation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
    Failed(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BulkLoadReport {
    pub total_loaded: usize,
    pub duplicates_removed: usize,
    pub failed_business_keys: usize,
    pub processed_successfully: usize,
    pub successful_inserts: usize,
    pub skipped: usize,
    pub failed_inserts: usize,
}

impl Store {
    /// Insert, replace or skip one event by its business key. The whole
    /// decision runs in a single transaction.
    pub fn upsert(&self, record: &EventRecord) -> UpsertOutcome {
        let key = match record.business_key() {
            Ok(key) => key,
            Err(e) => {
                warn!("Rejected EQ #{:?}: {}", record.sequence_number, e);
                return UpsertOutcome::Failed(e.to_string());
            }
        };
        let Some(sequence_number) = record.sequence_number else {
            warn!("Rejected {}: missing sequence number", key);
            return UpsertOutcome::Failed(format!("{} has no sequence number", key));
        };

        let result = self
            .connect()
            .and_then(|conn| upsert_in(&conn, &key, sequence_number, record));
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Upsert of {} failed: {:#}", key, e);
                UpsertOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    /// Deduplicate a batch by business key, then upsert each survivor.
    pub fn bulk_load(&self, records: Vec<EventRecord>) -> BulkLoadReport {
        let mut report = BulkLoadReport {
            total_loaded: records.len(),
            ..Default::default()
        };
        info!("Loaded {} earthquake records", records.len());

        let batch = dedupe_by_key(records, &mut report);
        report.processed_successfully = batch.len();
        info!(
            "After deduplication: {} unique earthquakes, {} duplicates removed, {} without a key",
            batch.len(),
            report.duplicates_removed,
            report.failed_business_keys
        );

        for record in &batch {
            match self.upsert(record) {
                UpsertOutcome::Inserted | UpsertOutcome::Updated => report.successful_inserts += 1,
                UpsertOutcome::Skipped => report.skipped += 1,
                UpsertOutcome::Failed(_) => report.failed_inserts += 1,
            }
        }
        report
    }
}

/// Keep one record per business key, chosen by [`is_better_version`], in
/// first-seen key order.
pub fn dedupe_by_key(records: Vec<EventRecord>, report: &mut BulkLoadReport) -> Vec<EventRecord> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<EventRecord> = Vec::new();

    for record in records {
        let key = match record.business_key() {
            Ok(key) => key,
            Err(e) => {
                warn!("Failed to generate business key: {}", e);
                report.failed_business_keys += 1;
                continue;
            }
        };
        match slots.get(&key) {
            None => {
                slots.insert(key, kept.len());
                kept.push(record);
            }
            Some(&idx) => {
                report.duplicates_removed += 1;
                if is_better_version(&record, &kept[idx]) {
                    debug!(
                        "Kept EQ #{:?} over #{:?} for {}",
                        record.sequence_number, kept[idx].sequence_number, key
                    );
                    kept[idx] = record;
                }
            }
        }
    }
    kept
}

fn upsert_in(
    conn: &Connection,
    key: &str,
    sequence_number: i64,
    record: &EventRecord,
) -> Result<UpsertOutcome> {
    let tx = conn.unchecked_transaction()?;

    let existing: Option<(i64, i64)> = tx
        .query_row(
            "SELECT id, sequence_number FROM seismic_events WHERE business_key = ?1",
            rusqlite::params![key],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let outcome = match existing {
        None => {
            let id = insert_event(&tx, key, record)?;
            insert_intensities(&tx, id, &record.intensities)?;
            info!("Inserted {} (EQ #{})", key, sequence_number);
            UpsertOutcome::Inserted
        }
        Some((id, stored)) if sequence_number > stored => {
            update_event(&tx, id, record)?;
            tx.execute("DELETE FROM intensities WHERE event_id = ?1", rusqlite::params![id])?;
            insert_intensities(&tx, id, &record.intensities)?;
            info!("Updated {} from EQ #{} to #{}", key, stored, sequence_number);
            UpsertOutcome::Updated
        }
        Some((_, stored)) => {
            info!(
                "Skipping {}: stored EQ #{}, incoming #{}",
                key, stored, sequence_number
            );
            return Ok(UpsertOutcome::Skipped);
        }
    };

    tx.commit()?;
    Ok(outcome)
}

fn insert_event(conn: &Connection, key: &str, r: &EventRecord) -> Result<i64> {
    let authors = serde_json::to_string(&r.authors)?;
    conn.execute(
        "INSERT INTO seismic_events
         (business_key, sequence_number, occurred_at, issued_at, latitude, longitude,
          latitude_str, longitude_str, region, location, municipality, province,
          depth_km, depth_str, origin, magnitude_type, magnitude_value, magnitude_str,
          source_filename, authors, expecting_damage, expecting_aftershocks)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22)",
        rusqlite::params![
            key, r.sequence_number, r.occurred_at, r.issued_at, r.latitude, r.longitude,
            r.latitude_str, r.longitude_str, r.region, r.location, r.municipality, r.province,
            r.depth_km, r.depth_str, r.origin, r.magnitude_type, r.magnitude_value,
            r.magnitude_str, r.source_filename, authors, r.expecting_damage,
            r.expecting_aftershocks,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn update_event(conn: &Connection, id: i64, r: &EventRecord) -> Result<()> {
    let authors = serde_json::to_string(&r.authors)?;
    conn.execute(
        "UPDATE seismic_events SET
            sequence_number = ?2, occurred_at = ?3, issued_at = ?4, latitude = ?5,
            longitude = ?6, latitude_str = ?7, longitude_str = ?8, region = ?9,
            location = ?10, municipality = ?11, province = ?12, depth_km = ?13,
            depth_str = ?14, origin = ?15, magnitude_type = ?16, magnitude_value = ?17,
            magnitude_str = ?18, source_filename = ?19, authors = ?20,
            expecting_damage = ?21, expecting_aftershocks = ?22,
            updated_at = datetime('now')
         WHERE id = ?1",
        rusqlite::params![
            id, r.sequence_number, r.occurred_at, r.issued_at, r.latitude, r.longitude,
            r.latitude_str, r.longitude_str, r.region, r.location, r.municipality, r.province,
            r.depth_km, r.depth_str, r.origin, r.magnitude_type, r.magnitude_value,
            r.magnitude_str, r.source_filename, authors, r.expecting_damage,
            r.expecting_aftershocks,
        ],
    )?;
    Ok(())
}

fn insert_intensities(conn: &Connection, event_id: i64, rows: &[IntensityObservation]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO intensities (event_id, kind, intensity_value, location)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for o in rows {
        stmt.execute(rusqlite::params![event_id, o.kind.as_str(), o.value, o.location])?;
    }
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{observation, sample_record, temp_store};
    use crate::record::IntensityKind;

    const KEY: &str = "2025_0803_0147_Surigao_del_Norte";

    #[test]
    fn insert_then_skip_is_idempotent() {
        let store = temp_store();
        let record = sample_record(1);

        assert_eq!(store.upsert(&record), UpsertOutcome::Inserted);
        let first = store.fetch_event(KEY).unwrap().unwrap();

        assert_eq!(store.upsert(&record), UpsertOutcome::Skipped);
        let second = store.fetch_event(KEY).unwrap().unwrap();

        assert_eq!(first.record, second.record);
        assert_eq!(first.updated_at, second.updated_at);
        assert_eq!(store.stats().unwrap().total_events, 1);
    }

    #[test]
    fn higher_sequence_replaces_fields_and_intensities() {
        let store = temp_store();
        let older = sample_record(1);
        let mut newer = sample_record(2);
        newer.magnitude_value = Some(4.5);
        newer.magnitude_str = "Mw 4.5".into();
        newer.intensities = vec![
            observation(IntensityKind::Reported, "VI", "Placer"),
            observation(IntensityKind::Reported, "VI", "Claver"),
        ];

        assert_eq!(store.upsert(&older), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&newer), UpsertOutcome::Updated);

        let stored = store.fetch_event(KEY).unwrap().unwrap();
        assert_eq!(stored.record, newer);
        assert_eq!(store.stats().unwrap().total_intensities, 2);

        // Replaying the older bulletin changes nothing.
        assert_eq!(store.upsert(&older), UpsertOutcome::Skipped);
        assert_eq!(store.fetch_event(KEY).unwrap().unwrap().record, newer);
    }

    #[test]
    fn equal_sequence_is_skipped() {
        let store = temp_store();
        let record = sample_record(3);
        let mut same = sample_record(3);
        same.origin = "Volcanic".into();
        store.upsert(&record);
        assert_eq!(store.upsert(&same), UpsertOutcome::Skipped);
        assert_eq!(store.fetch_event(KEY).unwrap().unwrap().record.origin, "Tectonic");
    }

    #[test]
    fn key_failure_never_touches_store() {
        let store = temp_store();
        let mut record = sample_record(1);
        record.province.clear();
        assert!(matches!(store.upsert(&record), UpsertOutcome::Failed(_)));

        let mut record = sample_record(1);
        record.sequence_number = None;
        assert!(matches!(store.upsert(&record), UpsertOutcome::Failed(_)));
        assert_eq!(store.stats().unwrap().total_events, 0);
    }

    #[test]
    fn bulk_load_keeps_highest_sequence_per_key() {
        let store = temp_store();
        let mut other = sample_record(1);
        other.source_filename = "2025_0810_0900_B1".into();
        let mut keyless = sample_record(9);
        keyless.province.clear();

        let report = store.bulk_load(vec![
            sample_record(2),
            sample_record(5),
            other,
            sample_record(3),
            keyless,
        ]);

        assert_eq!(report.total_loaded, 5);
        assert_eq!(report.failed_business_keys, 1);
        assert_eq!(report.duplicates_removed, 2);
        assert_eq!(report.processed_successfully, 2);
        assert_eq!(report.successful_inserts, 2);
        assert_eq!(report.failed_inserts, 0);

        let stored = store.fetch_event(KEY).unwrap().unwrap();
        assert_eq!(stored.record.sequence_number, Some(5));
    }

    #[test]
    fn bulk_load_over_existing_rows_skips_stale() {
        let store = temp_store();
        store.upsert(&sample_record(4));
        let report = store.bulk_load(vec![sample_record(2)]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.successful_inserts, 0);
    }

    #[test]
    fn dedupe_tie_keeps_first_seen() {
        let mut report = BulkLoadReport::default();
        let mut first = sample_record(2);
        first.origin = "first".into();
        let mut second = sample_record(2);
        second.origin = "second".into();
        let mut unnumbered = sample_record(7);
        unnumbered.sequence_number = None;

        let kept = dedupe_by_key(vec![first, second, unnumbered], &mut report);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].origin, "first");
        assert_eq!(report.duplicates_removed, 2);
    }
}
