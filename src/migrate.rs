use serde_json::{Map, Value};
use tracing::info;

use crate::store::{
    self, RecordStore, StoreError, OFFERING_TABLE_PREFIX, SCHEMA_VERSION, SCORE_ROWS_PREFIX,
    SCORE_SETTINGS_PREFIX, TABLES_PREFIX,
};

pub const CURRENT_VERSION: u32 = 1;

/// Fixed score fields of the first record layout and the criterion labels they stood for.
const LEGACY_SCORE_FIELDS: [(&str, &str); 6] = [
    ("pray", "기도회"),
    ("call", "전화심방"),
    ("dim5", "5차원"),
    ("evangel", "전도"),
    ("bible", "성경읽기"),
    ("internal", "내면화"),
];

/// Rewrites records written in the legacy layout into the current schema.
/// Runs once per store; unreadable records are left for the load-time fallback.
pub fn run<S: RecordStore + ?Sized>(store: &mut S) -> Result<usize, StoreError> {
    let version: u32 = store::load_json(store, SCHEMA_VERSION)?.unwrap_or(0);
    if version >= CURRENT_VERSION {
        return Ok(0);
    }

    let mut migrated = 0;
    for key in store.keys()? {
        let Some(raw) = store.get(&key)? else {
            continue;
        };
        let Ok(original) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };

        let mut value = original.clone();
        if key.starts_with(TABLES_PREFIX) {
            migrate_tables(&mut value);
        } else if key.starts_with(SCORE_SETTINGS_PREFIX) {
            migrate_settings(&mut value);
        } else if key.starts_with(SCORE_ROWS_PREFIX) {
            migrate_scores(&mut value);
        } else if key.starts_with(OFFERING_TABLE_PREFIX) {
            migrate_offerings(&mut value);
        } else {
            continue;
        }

        if value != original {
            store::save_json(store, &key, &value)?;
            migrated += 1;
        }
    }

    store::save_json(store, SCHEMA_VERSION, &CURRENT_VERSION)?;
    info!(records = migrated, version = CURRENT_VERSION, "record schema up to date");
    Ok(migrated)
}

fn migrate_tables(value: &mut Value) {
    let Some(groups) = value.as_array_mut() else {
        return;
    };
    for group in groups {
        let Some(rows) = group.get_mut("rows").and_then(Value::as_array_mut) else {
            continue;
        };
        for row in rows.iter_mut().filter_map(Value::as_object_mut) {
            rename(row, "class", "className");
            rename(row, "teacher", "teacherName");
            row.remove("total");
            row.remove("attend");
        }
    }
}

fn migrate_settings(value: &mut Value) {
    let Some(entries) = value.as_array_mut() else {
        return;
    };
    for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
        rename(entry, "value", "multiplier");
        if let Some(multiplier) = entry.get_mut("multiplier") {
            *multiplier = as_text(multiplier.take());
        }
    }
}

fn migrate_scores(value: &mut Value) {
    let Some(items) = value.as_array_mut() else {
        return;
    };
    // Flat row lists predate per-group nesting.
    if items.iter().any(Value::is_object) {
        let flat = std::mem::take(items);
        items.push(Value::Array(flat));
        items.push(Value::Array(Vec::new()));
        items.push(Value::Array(Vec::new()));
    }

    for group in items.iter_mut().filter_map(Value::as_array_mut) {
        for row in group.iter_mut().filter_map(Value::as_object_mut) {
            migrate_score_row(row);
        }
    }
}

fn migrate_score_row(row: &mut Map<String, Value>) {
    rename(row, "class", "className");
    rename(row, "teacher", "teacherName");
    rename(row, "total", "rollCount");
    rename(row, "attend", "attendanceCount");

    if let Some(roll) = row.get_mut("rollCount") {
        *roll = as_count(roll.take());
    }
    if let Some(attendance) = row.get_mut("attendanceCount") {
        *attendance = as_text(attendance.take());
    }
    if let Some(sum) = row.get_mut("sum") {
        *sum = as_text(sum.take());
    }

    let mut values = match row.remove("criterionValues") {
        Some(Value::Object(values)) => values,
        _ => Map::new(),
    };
    for (field, label) in LEGACY_SCORE_FIELDS {
        if let Some(raw) = row.remove(field) {
            values.entry(label).or_insert_with(|| as_text(raw));
        }
    }
    row.insert("criterionValues".to_string(), Value::Object(values));
}

fn migrate_offerings(value: &mut Value) {
    let Some(rows) = value.get_mut("rows").and_then(Value::as_array_mut) else {
        return;
    };
    for row in rows.iter_mut().filter_map(Value::as_object_mut) {
        rename(row, "type", "category");
    }
}

fn rename(object: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = object.remove(from) {
        if !object.contains_key(to) {
            object.insert(to.to_string(), value);
        }
    }
}

fn as_text(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        Value::Null => Value::String(String::new()),
        Value::Number(number) => Value::String(number.to_string()),
        Value::Bool(flag) => Value::String(flag.to_string()),
        other => Value::String(other.to_string()),
    }
}

fn as_count(value: Value) -> Value {
    let count = match &value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Value::String(text) => text.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    };
    Value::from(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScoreSettings, WeekKey};
    use crate::store::MemoryStore;
    use crate::week::Week;

    fn legacy_store() -> MemoryStore {
        MemoryStore::from_records([
            (
                "tables_2025.01.05".to_string(),
                r#"[{"rows":[{"class":"1반","teacher":"교사1","students":["Tom"],"attends":[true],"total":"","attend":""}],"edit":false},{"rows":[],"edit":false},{"rows":[],"edit":false}]"#
                    .to_string(),
            ),
            (
                "scoreSettings_2025.01.05".to_string(),
                r#"[{"label":"출석","value":"10"},{"label":"기도회","value":5}]"#.to_string(),
            ),
            (
                "scoreRows_2025.01.05".to_string(),
                r#"[{"class":"1반","teacher":"교사1","total":1,"attend":"1","pray":"2","call":"","dim5":"","evangel":"","bible":"","internal":"","sum":20}]"#
                    .to_string(),
            ),
            (
                "offeringTable_2025.01.05".to_string(),
                r#"{"rows":[{"type":"십일조","names":[],"amount":"1000"}]}"#.to_string(),
            ),
        ])
    }

    #[test]
    fn legacy_records_load_in_current_schema() {
        let mut store = legacy_store();
        let migrated = run(&mut store).expect("migration runs");
        assert_eq!(migrated, 4);

        let key = WeekKey::from_ymd(2025, 1, 5).expect("valid date");
        let week = Week::load(&store, key).expect("loads");
        let row = &week.tables[0].rows[0];
        assert_eq!(row.class_name, "1반");
        assert_eq!(row.students.len(), 10);
        assert!(row.attends[0]);

        assert_eq!(week.settings.attendance_multiplier, "10");
        assert_eq!(week.settings.criteria[0].multiplier, "5");
        assert_ne!(week.settings, ScoreSettings::standard());

        let score = &week.scores[0][0];
        assert_eq!(score.teacher_name, "교사1");
        assert_eq!(score.roll_count, 1);
        assert_eq!(score.attendance_count, "1");
        assert_eq!(score.value("기도회"), "2");
        assert_eq!(score.sum, "20");
        assert!(week.scores[1].is_empty());

        assert_eq!(week.offerings.rows[2].amount, "1000");
    }

    #[test]
    fn migration_runs_once() {
        let mut store = legacy_store();
        run(&mut store).expect("first run");
        store
            .set("tables_2025.01.12", r#"[{"rows":[{"class":"x"}]}]"#.to_string())
            .expect("set");
        assert_eq!(run(&mut store).expect("second run"), 0);
        let raw = store.get("tables_2025.01.12").expect("get").expect("present");
        assert!(raw.contains("\"class\""));
    }

    #[test]
    fn malformed_records_are_left_alone() {
        let mut store = MemoryStore::from_records([(
            "scoreRows_2025.01.05".to_string(),
            "{broken".to_string(),
        )]);
        assert_eq!(run(&mut store).expect("runs"), 0);
        assert_eq!(
            store.get("scoreRows_2025.01.05").expect("get").as_deref(),
            Some("{broken")
        );
    }
}
