//! File-backed store behaviour across reopen

use celims_store::repo::{audit, custody, reference, samples};
use celims_store::seed::seed_reference_data;
use celims_store::store::DEFAULT_BUSY_TIMEOUT;
use celims_store::{AuditAction, NewAuditEntry, NewCustody, NewSample, Store, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_718_000_000, 250_000_000).unwrap_or_default()
}

#[test]
fn sample_audit_and_custody_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("celims.db");
    let day = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();

    let code = {
        let mut store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        store
            .write(|tx| -> Result<String, StoreError> {
                seed_reference_data(tx, now())?;
                let ahmed = reference::find_user_by_username(tx, "ahmed")?
                    .ok_or(StoreError::NotFound { entity: "user", id: 0 })?;
                let project = reference::list_active_projects(tx)?[0].id;
                let code = samples::next_code(tx, day, 0)?;
                let sample = samples::insert(
                    tx,
                    &code,
                    &NewSample {
                        project_id: project,
                        material_type: "Concrete".into(),
                        ..NewSample::default()
                    },
                    ahmed.id,
                    now(),
                )?;
                custody::record(
                    tx,
                    &NewCustody {
                        sample_id: sample,
                        from_person: None,
                        to_person: ahmed.id,
                        location: Some("Site".into()),
                        purpose: Some("Sample Collection".into()),
                        condition: None,
                        notes: None,
                    },
                    now(),
                )?;
                audit::append(
                    tx,
                    &NewAuditEntry {
                        table_name: "samples",
                        record_id: sample.0,
                        action: AuditAction::Insert,
                        old_values: None,
                        new_values: Some(json!({"sample_code": code, "status": "registered"})),
                        changed_by: ahmed.id,
                        changed_at: now(),
                        request_id: None,
                    },
                )?;
                Ok(code)
            })
            .unwrap()
    };
    assert_eq!(code, "S-2024-06-10-001");

    let store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let conn = store.conn();
    let sample = samples::find_by_code(conn, &code).unwrap().unwrap();
    assert_eq!(sample.created_at, now());
    assert_eq!(custody::chain(conn, sample.id).unwrap().len(), 1);

    let trail = audit::trail(conn, "samples", sample.id.0).unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].changed_at, now());
    assert!(audit::verify(conn).unwrap().is_intact());
    assert_eq!(samples::next_code(conn, day, 0).unwrap(), "S-2024-06-10-002");
}

#[test]
fn reopening_does_not_reseed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("celims.db");
    {
        let mut store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert!(store.write(|tx| seed_reference_data(tx, now())).unwrap());
    }
    let mut store = Store::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert!(!store.write(|tx| seed_reference_data(tx, now())).unwrap());
}
