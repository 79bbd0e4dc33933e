use tracing::debug;

use crate::error::LedgerError;
use crate::models::{
    ClassTable, Group, OfferingRow, OfferingTable, RosterImport, RosterRow, ScoreCriterion,
    ScoreGroups, ScoreRow, ScoreSettings, VisitorRosterRow, VisitorTable, WeekKey, GROUP_COUNT,
    OFFERING_NAME_COLUMNS, SLOT_COUNT,
};
use crate::scoring::{self, WeekStats};
use crate::store::{
    self, RecordStore, StoreError, OFFERING_TABLE_PREFIX, SCORE_ROWS_PREFIX,
    SCORE_SETTINGS_PREFIX, TABLES_PREFIX, VISITOR_TABLES_PREFIX,
};

/// The separately persisted records of one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Tables,
    Visitors,
    Settings,
    Scores,
    Offerings,
}

impl Partition {
    pub const fn all() -> [Self; 5] {
        [
            Self::Tables,
            Self::Visitors,
            Self::Settings,
            Self::Scores,
            Self::Offerings,
        ]
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Tables => TABLES_PREFIX,
            Self::Visitors => VISITOR_TABLES_PREFIX,
            Self::Settings => SCORE_SETTINGS_PREFIX,
            Self::Scores => SCORE_ROWS_PREFIX,
            Self::Offerings => OFFERING_TABLE_PREFIX,
        }
    }
}

/// Everything recorded for one week. Mutations keep the score rows in step
/// with the roster and the formula; persisting is left to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Week {
    pub key: WeekKey,
    pub tables: Vec<ClassTable>,
    pub visitors: VisitorTable,
    pub settings: ScoreSettings,
    pub scores: ScoreGroups,
    pub offerings: OfferingTable,
}

impl Week {
    /// Reads a week, substituting defaults for anything absent or unreadable.
    pub fn load<S: RecordStore + ?Sized>(store: &S, key: WeekKey) -> Result<Self, StoreError> {
        let mut tables: Vec<ClassTable> =
            store::load_json_or_default(store, &store::week_key(TABLES_PREFIX, key))?;
        tables.resize_with(GROUP_COUNT, ClassTable::default);
        for row in tables.iter_mut().flat_map(|table| table.rows.iter_mut()) {
            row.normalize();
        }

        let visitor_tables: Vec<VisitorTable> =
            store::load_json_or_default(store, &store::week_key(VISITOR_TABLES_PREFIX, key))?;
        let mut visitors = visitor_tables.into_iter().next().unwrap_or_default();
        for row in visitors.rows.iter_mut() {
            row.normalize();
        }

        let settings = store::load_json::<Vec<ScoreCriterion>, _>(
            store,
            &store::week_key(SCORE_SETTINGS_PREFIX, key),
        )?
        .map(ScoreSettings::from_records)
        .unwrap_or_else(ScoreSettings::standard);

        let mut scores: ScoreGroups =
            store::load_json_or_default(store, &store::week_key(SCORE_ROWS_PREFIX, key))?;
        scores.resize_with(GROUP_COUNT, Vec::new);

        let offerings = store::load_json::<OfferingTable, _>(
            store,
            &store::week_key(OFFERING_TABLE_PREFIX, key),
        )?
        .map(OfferingTable::merged)
        .unwrap_or_else(OfferingTable::fresh);

        Ok(Self {
            key,
            tables,
            visitors,
            settings,
            scores,
            offerings,
        })
    }

    pub fn save<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        partitions: &[Partition],
    ) -> Result<(), StoreError> {
        for partition in partitions {
            let key = store::week_key(partition.prefix(), self.key);
            match partition {
                Partition::Tables => store::save_json(store, &key, &self.tables)?,
                Partition::Visitors => {
                    store::save_json(store, &key, std::slice::from_ref(&self.visitors))?
                }
                Partition::Settings => {
                    store::save_json(store, &key, &self.settings.to_records())?
                }
                Partition::Scores => store::save_json(store, &key, &self.scores)?,
                Partition::Offerings => store::save_json(store, &key, &self.offerings)?,
            }
        }
        Ok(())
    }

    pub fn table(&self, group: Group) -> &ClassTable {
        &self.tables[group.index()]
    }

    pub fn score_row(&self, group: Group, row: usize) -> Option<&ScoreRow> {
        self.scores.get(group.index()).and_then(|rows| rows.get(row))
    }

    pub fn stats(&self) -> WeekStats {
        scoring::week_stats(&self.tables, &self.visitors)
    }

    /// Attendance can only be toggled while the group's table is not in edit mode.
    pub fn attendance_toggle_allowed(&self, group: Group) -> bool {
        !self.table(group).edit
    }

    pub fn visitor_toggle_allowed(&self) -> bool {
        !self.visitors.edit
    }

    pub fn set_edit_mode(&mut self, group: Group, edit: bool) {
        self.tables[group.index()].edit = edit;
    }

    pub fn set_visitor_edit_mode(&mut self, edit: bool) {
        self.visitors.edit = edit;
    }

    pub fn add_row(&mut self, group: Group) -> usize {
        let rows = &mut self.tables[group.index()].rows;
        rows.push(RosterRow::blank());
        let index = rows.len() - 1;
        self.refresh_row(group, index);
        index
    }

    pub fn delete_row(&mut self, group: Group, row: usize) -> Result<RosterRow, LedgerError> {
        let rows = &mut self.tables[group.index()].rows;
        if row >= rows.len() {
            return Err(row_out_of_range(group, row));
        }
        let removed = rows.remove(row);
        let scores = &mut self.scores[group.index()];
        if row < scores.len() {
            scores.remove(row);
        }
        self.align_scores();
        Ok(removed)
    }

    pub fn set_class_name(&mut self, group: Group, row: usize, name: &str) -> Result<(), LedgerError> {
        self.roster_row_mut(group, row)?.class_name = name.to_string();
        self.refresh_row(group, row);
        Ok(())
    }

    pub fn set_teacher_name(
        &mut self,
        group: Group,
        row: usize,
        name: &str,
    ) -> Result<(), LedgerError> {
        self.roster_row_mut(group, row)?.teacher_name = name.to_string();
        self.refresh_row(group, row);
        Ok(())
    }

    pub fn set_student(
        &mut self,
        group: Group,
        row: usize,
        slot: usize,
        name: &str,
    ) -> Result<(), LedgerError> {
        check_slot(slot)?;
        self.roster_row_mut(group, row)?.students[slot] = name.to_string();
        self.refresh_row(group, row);
        Ok(())
    }

    /// Flips one attendance flag and returns its new value. Callers are expected
    /// to check [`Week::attendance_toggle_allowed`] first.
    pub fn toggle_attendance(
        &mut self,
        group: Group,
        row: usize,
        slot: usize,
    ) -> Result<bool, LedgerError> {
        check_slot(slot)?;
        let roster = self.roster_row_mut(group, row)?;
        roster.attends[slot] = !roster.attends[slot];
        let attended = roster.attends[slot];
        self.refresh_row(group, row);
        Ok(attended)
    }

    /// Replaces the class roster wholesale. Score rows keep their entered values
    /// by position and get names, counts and sums refreshed.
    pub fn replace_roster(&mut self, tables: Vec<ClassTable>) {
        self.tables = tables;
        self.tables.resize_with(GROUP_COUNT, ClassTable::default);
        self.align_scores();
        for group in Group::ordered() {
            for row in 0..self.tables[group.index()].rows.len() {
                self.refresh_row(group, row);
            }
        }
    }

    /// Appends imported rows through the regular row operations. Every group
    /// is resolved up front so a bad line leaves the week untouched.
    pub fn import_roster_rows(&mut self, rows: &[RosterImport]) -> Result<usize, LedgerError> {
        let groups = rows
            .iter()
            .map(|import| import.group.parse::<Group>())
            .collect::<Result<Vec<_>, _>>()?;
        for (import, group) in rows.iter().zip(groups) {
            let row = self.add_row(group);
            self.set_class_name(group, row, import.class_name.trim())?;
            self.set_teacher_name(group, row, import.teacher_name.trim())?;
            for (slot, name) in import.student_names().into_iter().enumerate() {
                self.set_student(group, row, slot, name)?;
            }
        }
        Ok(rows.len())
    }

    pub fn add_visitor_row(&mut self) -> usize {
        self.visitors.rows.push(VisitorRosterRow::blank());
        self.visitors.rows.len() - 1
    }

    pub fn delete_visitor_row(&mut self, row: usize) -> Result<VisitorRosterRow, LedgerError> {
        if row >= self.visitors.rows.len() {
            return Err(LedgerError::RowOutOfRange {
                table: "visitor",
                row,
            });
        }
        Ok(self.visitors.rows.remove(row))
    }

    pub fn set_visitor_student(
        &mut self,
        row: usize,
        slot: usize,
        name: &str,
    ) -> Result<(), LedgerError> {
        check_slot(slot)?;
        self.visitor_row_mut(row)?.students[slot] = name.to_string();
        Ok(())
    }

    pub fn toggle_visitor_attendance(&mut self, row: usize, slot: usize) -> Result<bool, LedgerError> {
        check_slot(slot)?;
        let visitor = self.visitor_row_mut(row)?;
        visitor.attends[slot] = !visitor.attends[slot];
        Ok(visitor.attends[slot])
    }

    pub fn add_criterion(&mut self) -> usize {
        self.settings.criteria.push(ScoreCriterion::new("", ""));
        self.recompute_sums();
        self.settings.criteria.len() - 1
    }

    pub fn delete_criterion(&mut self, index: usize) -> Result<ScoreCriterion, LedgerError> {
        if index >= self.settings.criteria.len() {
            return Err(LedgerError::CriterionOutOfRange(index));
        }
        let removed = self.settings.criteria.remove(index);
        self.recompute_sums();
        Ok(removed)
    }

    /// Renames a criterion; values already entered under the old label follow it.
    pub fn set_criterion_label(&mut self, index: usize, label: &str) -> Result<(), LedgerError> {
        let criterion = self
            .settings
            .criteria
            .get_mut(index)
            .ok_or(LedgerError::CriterionOutOfRange(index))?;
        let previous = std::mem::replace(&mut criterion.label, label.to_string());
        if !previous.is_empty() && previous != label {
            for row in self.scores.iter_mut().flatten() {
                if let Some(value) = row.criterion_values.remove(&previous) {
                    row.criterion_values.insert(label.to_string(), value);
                }
            }
        }
        self.recompute_sums();
        Ok(())
    }

    pub fn set_criterion_multiplier(&mut self, index: usize, text: &str) -> Result<(), LedgerError> {
        self.settings
            .criteria
            .get_mut(index)
            .ok_or(LedgerError::CriterionOutOfRange(index))?
            .multiplier = text.to_string();
        self.recompute_sums();
        Ok(())
    }

    pub fn set_attendance_multiplier(&mut self, text: &str) {
        self.settings.attendance_multiplier = text.to_string();
        self.recompute_sums();
    }

    /// Records a raw criterion value for one class and returns the new sum.
    pub fn set_score_value(
        &mut self,
        group: Group,
        row: usize,
        label: &str,
        value: &str,
    ) -> Result<String, LedgerError> {
        if row >= self.tables[group.index()].rows.len() {
            return Err(row_out_of_range(group, row));
        }
        self.align_scores();
        self.scores[group.index()][row]
            .criterion_values
            .insert(label.to_string(), value.to_string());
        self.refresh_row(group, row);
        Ok(self.scores[group.index()][row].sum.clone())
    }

    pub fn set_offering_name(
        &mut self,
        category: &str,
        column: usize,
        line: usize,
        name: &str,
    ) -> Result<(), LedgerError> {
        if column >= OFFERING_NAME_COLUMNS || line >= SLOT_COUNT {
            return Err(LedgerError::OfferingCellOutOfRange { column, line });
        }
        let row = self.offering_row_mut(category)?;
        row.names[column][line] = name.to_string();
        Ok(())
    }

    pub fn set_offering_amount(&mut self, category: &str, amount: &str) -> Result<(), LedgerError> {
        self.offering_row_mut(category)?.amount = amount.to_string();
        Ok(())
    }

    /// Counts are re-read from the roster before every sum is recomputed.
    fn recompute_sums(&mut self) {
        self.align_scores();
        for (table, scores) in self.tables.iter().zip(self.scores.iter_mut()) {
            for (roster, score) in table.rows.iter().zip(scores.iter_mut()) {
                score.roll_count = scoring::roll_count(roster);
                score.attendance_count = scoring::attendance_count(roster).to_string();
            }
        }
        scoring::recompute_sums(&mut self.scores, &self.settings);
    }

    /// Re-derives one score row from its roster row.
    fn refresh_row(&mut self, group: Group, row: usize) {
        self.align_scores();
        let idx = group.index();
        let Some(roster) = self.tables[idx].rows.get(row) else {
            return;
        };
        let refreshed =
            scoring::derive_score_row(roster, self.scores[idx].get(row), &self.settings);
        debug!(week = %self.key, group = group.label(), row, sum = %refreshed.sum, "score row refreshed");
        self.scores[idx][row] = refreshed;
    }

    /// Gives every roster row a score row at the same position.
    fn align_scores(&mut self) {
        self.scores.resize_with(GROUP_COUNT, Vec::new);
        for (table, scores) in self.tables.iter().zip(self.scores.iter_mut()) {
            scores.truncate(table.rows.len());
            let missing = &table.rows[scores.len()..];
            let derived: Vec<ScoreRow> = missing
                .iter()
                .map(|roster| scoring::derive_score_row(roster, None, &self.settings))
                .collect();
            scores.extend(derived);
        }
    }

    fn roster_row_mut(&mut self, group: Group, row: usize) -> Result<&mut RosterRow, LedgerError> {
        self.tables[group.index()]
            .rows
            .get_mut(row)
            .ok_or_else(|| row_out_of_range(group, row))
    }

    fn visitor_row_mut(&mut self, row: usize) -> Result<&mut VisitorRosterRow, LedgerError> {
        self.visitors
            .rows
            .get_mut(row)
            .ok_or(LedgerError::RowOutOfRange {
                table: "visitor",
                row,
            })
    }

    fn offering_row_mut(&mut self, category: &str) -> Result<&mut OfferingRow, LedgerError> {
        self.offerings
            .rows
            .iter_mut()
            .find(|row| row.category == category)
            .ok_or_else(|| LedgerError::CategoryNotFound(category.to_string()))
    }
}

fn check_slot(slot: usize) -> Result<(), LedgerError> {
    if slot < SLOT_COUNT {
        Ok(())
    } else {
        Err(LedgerError::SlotOutOfRange(slot))
    }
}

fn row_out_of_range(group: Group, row: usize) -> LedgerError {
    LedgerError::RowOutOfRange {
        table: group.label(),
        row,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sample_week() -> Week {
        let key = WeekKey::from_ymd(2025, 1, 5).expect("valid date");
        Week::load(&MemoryStore::new(), key).expect("defaults load")
    }

    #[test]
    fn missing_records_load_as_defaults() {
        let week = sample_week();
        assert_eq!(week.tables.len(), GROUP_COUNT);
        assert!(week.tables.iter().all(|table| table.rows.is_empty()));
        assert_eq!(week.settings, ScoreSettings::standard());
        assert_eq!(week.offerings, OfferingTable::fresh());
        assert_eq!(week.scores.len(), GROUP_COUNT);
    }

    #[test]
    fn roster_edits_keep_score_rows_aligned() {
        let mut week = sample_week();
        week.set_attendance_multiplier("10");
        let first = week.add_row(Group::Hope);
        let second = week.add_row(Group::Hope);
        week.set_class_name(Group::Hope, second, "4반").expect("row exists");
        week.set_student(Group::Hope, second, 0, "Tom").expect("slot exists");
        week.set_student(Group::Hope, second, 1, "Ann").expect("slot exists");
        assert!(week.toggle_attendance(Group::Hope, second, 0).expect("toggle"));

        let row = week.score_row(Group::Hope, second).expect("score row");
        assert_eq!(row.class_name, "4반");
        assert_eq!(row.roll_count, 2);
        assert_eq!(row.attendance_count, "1");
        assert_eq!(row.sum, "10");

        week.delete_row(Group::Hope, first).expect("delete");
        assert_eq!(week.scores[Group::Hope.index()].len(), 1);
        assert_eq!(week.scores[Group::Hope.index()][0].class_name, "4반");
    }

    #[test]
    fn toggling_twice_restores_attendance() {
        let mut week = sample_week();
        let row = week.add_row(Group::Faith);
        week.set_student(Group::Faith, row, 3, "Kim").expect("slot");
        week.toggle_attendance(Group::Faith, row, 3).expect("toggle");
        assert!(!week.toggle_attendance(Group::Faith, row, 3).expect("toggle"));
        assert_eq!(week.score_row(Group::Faith, row).expect("row").attendance_count, "0");
    }

    #[test]
    fn out_of_range_edits_are_rejected() {
        let mut week = sample_week();
        let row = week.add_row(Group::Love);
        assert!(matches!(
            week.set_student(Group::Love, row, SLOT_COUNT, "x"),
            Err(LedgerError::SlotOutOfRange(10))
        ));
        assert!(matches!(
            week.delete_row(Group::Love, 5),
            Err(LedgerError::RowOutOfRange { row: 5, .. })
        ));
        assert!(matches!(
            week.delete_criterion(42),
            Err(LedgerError::CriterionOutOfRange(42))
        ));
        assert!(week.set_offering_amount("없는헌금", "1").is_err());
    }

    #[test]
    fn edit_mode_is_exposed_as_precondition() {
        let mut week = sample_week();
        assert!(week.attendance_toggle_allowed(Group::Faith));
        week.set_edit_mode(Group::Faith, true);
        assert!(!week.attendance_toggle_allowed(Group::Faith));
        assert!(week.attendance_toggle_allowed(Group::Hope));
    }

    #[test]
    fn formula_changes_recompute_every_sum() {
        let mut week = sample_week();
        let row = week.add_row(Group::Faith);
        week.set_score_value(Group::Faith, row, "기도회", "2")
            .expect("score set");
        let other = week.add_row(Group::Love);
        week.set_score_value(Group::Love, other, "기도회", "3")
            .expect("score set");

        week.set_criterion_multiplier(0, "5").expect("criterion exists");
        assert_eq!(week.score_row(Group::Faith, row).expect("row").sum, "10");
        assert_eq!(week.score_row(Group::Love, other).expect("row").sum, "15");

        week.delete_criterion(0).expect("criterion exists");
        assert_eq!(week.score_row(Group::Faith, row).expect("row").sum, "0");
        assert_eq!(week.score_row(Group::Faith, row).expect("row").value("기도회"), "2");
    }

    #[test]
    fn renaming_criterion_moves_entered_values() {
        let mut week = sample_week();
        let row = week.add_row(Group::Faith);
        week.set_score_value(Group::Faith, row, "전도", "4").expect("score set");
        week.set_criterion_label(3, "전도회").expect("criterion exists");

        let score = week.score_row(Group::Faith, row).expect("row");
        assert_eq!(score.value("전도"), "");
        assert_eq!(score.value("전도회"), "4");
        assert_eq!(score.sum, "4");
    }

    #[test]
    fn added_criterion_starts_blank() {
        let mut week = sample_week();
        let index = week.add_criterion();
        assert_eq!(index, 6);
        assert_eq!(week.settings.criteria[index], ScoreCriterion::new("", ""));
    }

    #[test]
    fn save_writes_visitor_table_as_single_group_array() {
        let mut week = sample_week();
        let row = week.add_visitor_row();
        week.set_visitor_student(row, 0, "New").expect("slot");
        assert!(week.toggle_visitor_attendance(row, 0).expect("toggle"));

        let mut store = MemoryStore::new();
        week.save(&mut store, &Partition::all()).expect("save");
        let raw = store
            .get("visitorTables_2025.01.05")
            .expect("get")
            .expect("written");
        assert!(raw.starts_with("[{\"rows\":["));

        let reloaded = Week::load(&store, week.key).expect("load");
        assert_eq!(reloaded, week);
    }

    #[test]
    fn imported_rows_are_appended_and_scored() {
        let mut week = sample_week();
        let rows = vec![
            RosterImport {
                group: "소망".to_string(),
                class_name: " 5반 ".to_string(),
                teacher_name: "교사5".to_string(),
                students: "Tom; Ann;;".to_string(),
            },
            RosterImport {
                group: "love".to_string(),
                class_name: "6반".to_string(),
                teacher_name: String::new(),
                students: String::new(),
            },
        ];
        assert_eq!(week.import_roster_rows(&rows).expect("imported"), 2);

        let row = &week.table(Group::Hope).rows[0];
        assert_eq!(row.class_name, "5반");
        assert_eq!(row.students[..3], ["Tom".to_string(), "Ann".to_string(), String::new()]);
        assert_eq!(week.score_row(Group::Hope, 0).expect("score").roll_count, 2);
        assert_eq!(week.table(Group::Love).rows[0].class_name, "6반");
    }

    #[test]
    fn import_with_unknown_group_changes_nothing() {
        let mut week = sample_week();
        let rows = vec![
            RosterImport {
                group: "0".to_string(),
                class_name: "1반".to_string(),
                teacher_name: String::new(),
                students: String::new(),
            },
            RosterImport {
                group: "charity".to_string(),
                class_name: "2반".to_string(),
                teacher_name: String::new(),
                students: String::new(),
            },
        ];
        assert!(matches!(
            week.import_roster_rows(&rows),
            Err(LedgerError::UnknownGroup(_))
        ));
        assert!(week.tables.iter().all(|table| table.rows.is_empty()));
    }

    #[test]
    fn offering_edits_touch_one_category() {
        let mut week = sample_week();
        week.set_offering_name("감사헌금", 1, 9, "Lee").expect("cell");
        week.set_offering_amount("감사헌금", "12,000").expect("category");
        assert_eq!(week.offerings.rows[1].names[1][9], "Lee");
        assert_eq!(week.offerings.total(), 12_000);
        assert!(week.set_offering_name("감사헌금", 2, 0, "x").is_err());
    }
}
