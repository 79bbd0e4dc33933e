use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::models::{Group, RosterImport, WeekKey};
use crate::store::{Change, MemoryStore, RecordStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn load_store(pool: &PgPool) -> anyhow::Result<MemoryStore> {
    let rows = sqlx::query("SELECT key, value FROM attendance_ledger.records")
        .fetch_all(pool)
        .await
        .context("failed to read ledger records (run init-db first)")?;

    let records = rows
        .into_iter()
        .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")));
    Ok(MemoryStore::from_records(records))
}

/// Writes pending changes in one transaction and returns how many were applied.
pub async fn flush(pool: &PgPool, changes: Vec<Change>) -> anyhow::Result<usize> {
    if changes.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for (key, value) in &changes {
        match value {
            Some(value) => {
                sqlx::query(
                    r#"
                    INSERT INTO attendance_ledger.records (key, value)
                    VALUES ($1, $2)
                    ON CONFLICT (key) DO UPDATE
                    SET value = EXCLUDED.value, updated_at = now()
                    "#,
                )
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to write record {key}"))?;
            }
            None => {
                sqlx::query("DELETE FROM attendance_ledger.records WHERE key = $1")
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("failed to delete record {key}"))?;
            }
        }
    }
    tx.commit().await?;

    Ok(changes.len())
}

/// Reads the JSON file backend; a missing file is an empty ledger.
pub fn load_file(path: &Path) -> anyhow::Result<MemoryStore> {
    if !path.exists() {
        return Ok(MemoryStore::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: BTreeMap<String, String> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a ledger file", path.display()))?;
    Ok(MemoryStore::from_records(records))
}

pub fn save_file(path: &Path, store: &MemoryStore) -> anyhow::Result<()> {
    let encoded = serde_json::to_string_pretty(store.records())?;
    std::fs::write(path, encoded).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn parse_roster_csv<R: io::Read>(reader: R) -> anyhow::Result<Vec<RosterImport>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<RosterImport>().enumerate() {
        rows.push(result.with_context(|| format!("invalid roster row {}", line + 1))?);
    }
    Ok(rows)
}

pub fn read_roster_csv(csv_path: &Path) -> anyhow::Result<Vec<RosterImport>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    parse_roster_csv(file)
}

/// Records a small January 2025 history. Weeks that already exist are left alone.
pub fn seed<S: RecordStore>(ledger: &mut Ledger<S>) -> Result<usize, LedgerError> {
    let weeks: [(u32, [&str; 3], [usize; 3]); 3] = [
        (5, ["3", "1", "2"], [2, 1, 1]),
        (12, ["2", "2", "1"], [1, 2, 0]),
        (19, ["4", "1", "3"], [2, 1, 2]),
    ];
    let students = [["민준", "서연"], ["지호", "하은"], ["도윤", "수아"]];

    let mut seeded = 0;
    for (day, prayers, attended) in weeks {
        let Some(key) = WeekKey::from_ymd(2025, 1, day) else {
            continue;
        };
        if ledger.is_created(key)? {
            continue;
        }
        ledger.create_week(key)?;
        ledger.update_roster(key, |week| {
            for group in Group::ordered() {
                let idx = group.index();
                for (slot, name) in students[idx].iter().enumerate() {
                    week.set_student(group, 0, slot, name)?;
                }
                for slot in 0..attended[idx] {
                    week.toggle_attendance(group, 0, slot)?;
                }
                week.set_score_value(group, 0, "기도회", prayers[idx])?;
            }
            Ok(())
        })?;
        ledger.update_offerings(key, |week| week.set_offering_amount("주일헌금", "50,000"))?;
        seeded += 1;
    }

    info!(weeks = seeded, "seed data recorded");
    Ok(seeded)
}
