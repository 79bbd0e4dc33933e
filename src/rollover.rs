use crate::models::{
    ClassTable, OfferingTable, RosterRow, RosterTable, ScoreCriterion, ScoreGroups, ScoreRow,
    ScoreSettings, VisitorTable, WeekKey, GROUP_COUNT,
};
use crate::scoring;
use crate::store::{
    self, RecordStore, StoreError, SCORE_ROWS_PREFIX, SCORE_SETTINGS_PREFIX, TABLES_PREFIX,
    VISITOR_TABLES_PREFIX,
};
use crate::week::Week;

/// Whatever the week seven days earlier left behind. Each part falls back
/// to its own default independently.
#[derive(Debug, Clone, Default)]
pub struct PreviousWeek {
    pub settings: Option<ScoreSettings>,
    pub tables: Option<Vec<ClassTable>>,
    pub visitors: Option<VisitorTable>,
    pub scores: Option<ScoreGroups>,
}

impl PreviousWeek {
    pub fn load<S: RecordStore + ?Sized>(store: &S, key: WeekKey) -> Result<Self, StoreError> {
        Ok(Self {
            settings: store::load_json::<Vec<ScoreCriterion>, _>(
                store,
                &store::week_key(SCORE_SETTINGS_PREFIX, key),
            )?
            .map(ScoreSettings::from_records),
            tables: store::load_json(store, &store::week_key(TABLES_PREFIX, key))?,
            visitors: store::load_json::<Vec<VisitorTable>, _>(
                store,
                &store::week_key(VISITOR_TABLES_PREFIX, key),
            )?
            .map(|tables| tables.into_iter().next().unwrap_or_default()),
            scores: store::load_json(store, &store::week_key(SCORE_ROWS_PREFIX, key))?,
        })
    }
}

/// Roster used when no previous week exists: one placeholder class per group.
pub fn default_tables() -> Vec<ClassTable> {
    (1..=GROUP_COUNT)
        .map(|n| RosterTable::new(vec![RosterRow::named(&format!("{n}반"), &format!("교사{n}"))]))
        .collect()
}

/// Copies names forward with every attendance flag cleared.
pub fn carry_tables(previous: &[ClassTable]) -> Vec<ClassTable> {
    let mut tables: Vec<ClassTable> = previous
        .iter()
        .map(|table| RosterTable::new(table.rows.iter().map(RosterRow::carried_forward).collect()))
        .collect();
    tables.resize_with(GROUP_COUNT, ClassTable::default);
    tables
}

pub fn carry_visitors(previous: &VisitorTable) -> VisitorTable {
    RosterTable::new(previous.rows.iter().map(|row| row.carried_forward()).collect())
}

/// Keeps class, teacher and counts; entered values and sums start blank.
pub fn carry_scores(previous: &ScoreGroups) -> ScoreGroups {
    let mut groups: ScoreGroups = previous
        .iter()
        .map(|rows| {
            rows.iter()
                .map(|row| ScoreRow {
                    class_name: row.class_name.clone(),
                    teacher_name: row.teacher_name.clone(),
                    roll_count: row.roll_count,
                    attendance_count: row.attendance_count.clone(),
                    ..ScoreRow::default()
                })
                .collect()
        })
        .collect();
    groups.resize_with(GROUP_COUNT, Vec::new);
    groups
}

/// Re-reads counts from the carried roster, whose attendance is already cleared.
fn recount(scores: &mut ScoreGroups, tables: &[ClassTable]) {
    for (rows, table) in scores.iter_mut().zip(tables) {
        for (score, roster) in rows.iter_mut().zip(&table.rows) {
            score.roll_count = scoring::roll_count(roster);
            score.attendance_count = scoring::attendance_count(roster).to_string();
        }
    }
}

/// Builds the first state of a week from the week before it.
pub fn seed_week(key: WeekKey, previous: PreviousWeek) -> Week {
    let settings = previous.settings.unwrap_or_else(ScoreSettings::standard);
    let tables = match &previous.tables {
        Some(tables) => carry_tables(tables),
        None => default_tables(),
    };
    let visitors = previous
        .visitors
        .as_ref()
        .map(carry_visitors)
        .unwrap_or_default();
    let scores = match &previous.scores {
        Some(scores) => {
            let mut carried = carry_scores(scores);
            recount(&mut carried, &tables);
            carried
        }
        None => tables
            .iter()
            .map(|table| table.rows.iter().map(scoring::seeded_score_row).collect())
            .collect(),
    };

    Week {
        key,
        tables,
        visitors,
        settings,
        scores,
        offerings: OfferingTable::fresh(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisitorRosterRow;

    fn key() -> WeekKey {
        WeekKey::from_ymd(2025, 1, 12).expect("valid date")
    }

    fn previous_roster() -> Vec<ClassTable> {
        let mut row = RosterRow::named("1반", "교사1");
        row.students[0] = "Tom".to_string();
        row.students[1] = "Ann".to_string();
        row.attends[0] = true;
        row.attends[1] = true;
        let mut faith = RosterTable::new(vec![row]);
        faith.edit = true;
        vec![faith, RosterTable::default(), RosterTable::default()]
    }

    #[test]
    fn empty_history_seeds_defaults() {
        let week = seed_week(key(), PreviousWeek::default());
        assert_eq!(week.tables.len(), 3);
        assert_eq!(week.tables[1].rows[0].class_name, "2반");
        assert_eq!(week.tables[2].rows[0].teacher_name, "교사3");
        assert!(week.visitors.rows.is_empty());
        assert_eq!(week.settings, ScoreSettings::standard());
        assert_eq!(week.scores[0][0].class_name, "1반");
        assert_eq!(week.scores[0][0].attendance_count, "0");
        assert_eq!(week.scores[0][0].sum, "");
        assert_eq!(week.offerings, OfferingTable::fresh());
    }

    #[test]
    fn roster_carries_names_and_resets_attendance() {
        let previous = PreviousWeek {
            tables: Some(previous_roster()),
            ..PreviousWeek::default()
        };
        let week = seed_week(key(), previous);
        let row = &week.tables[0].rows[0];
        assert_eq!(row.class_name, "1반");
        assert_eq!(row.students[..2], ["Tom".to_string(), "Ann".to_string()]);
        assert!(row.attends.iter().all(|flag| !flag));
        assert!(!week.tables[0].edit);
        assert_eq!(week.scores[0][0].roll_count, 2);
        assert_eq!(week.scores[0][0].attendance_count, "0");
    }

    #[test]
    fn formula_carries_but_entered_scores_do_not() {
        let settings = ScoreSettings {
            attendance_multiplier: "10".to_string(),
            criteria: vec![
                ScoreCriterion::new("pray", "5"),
                ScoreCriterion::new("call", ""),
                ScoreCriterion::new("bible", "2"),
            ],
        };
        let mut score = ScoreRow {
            class_name: "1반".to_string(),
            teacher_name: "교사1".to_string(),
            roll_count: 2,
            attendance_count: "2".to_string(),
            sum: "30".to_string(),
            ..ScoreRow::default()
        };
        score
            .criterion_values
            .insert("pray".to_string(), "2".to_string());
        let previous = PreviousWeek {
            settings: Some(settings.clone()),
            tables: Some(previous_roster()),
            scores: Some(vec![vec![score]]),
            ..PreviousWeek::default()
        };

        let week = seed_week(key(), previous);
        assert_eq!(week.settings, settings);
        let carried = &week.scores[0][0];
        assert_eq!(carried.value("pray"), "");
        assert_eq!(carried.sum, "");
        assert_eq!(carried.roll_count, 2);
        assert_eq!(carried.attendance_count, "0");
        assert_eq!(carried.class_name, "1반");
        assert_eq!(week.scores.len(), 3);
    }

    #[test]
    fn visitors_carry_names_only() {
        let mut visitor = VisitorRosterRow::blank();
        visitor.students[0] = "New".to_string();
        visitor.attends[0] = true;
        let previous = PreviousWeek {
            visitors: Some(RosterTable::new(vec![visitor])),
            ..PreviousWeek::default()
        };
        let week = seed_week(key(), previous);
        assert_eq!(week.visitors.rows[0].students[0], "New");
        assert!(!week.visitors.rows[0].attends[0]);
    }
}
