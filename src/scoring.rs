use crate::models::{ClassTable, RosterRow, ScoreGroups, ScoreRow, ScoreSettings, SlotRow, VisitorTable};

/// Shared reading of free-text numeric fields. Blank or non-numeric text yields `None`.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// A raw criterion value; unreadable input contributes nothing.
pub fn raw_value(text: &str) -> f64 {
    parse_number(text).unwrap_or(0.0)
}

/// A multiplier; unreadable input means no weighting.
pub fn multiplier(text: &str) -> f64 {
    parse_number(text).unwrap_or(1.0)
}

pub fn roll_count<R: SlotRow + ?Sized>(row: &R) -> u32 {
    row.students()
        .iter()
        .filter(|name| !name.trim().is_empty())
        .count() as u32
}

pub fn attendance_count<R: SlotRow + ?Sized>(row: &R) -> u32 {
    row.students()
        .iter()
        .enumerate()
        .filter(|(idx, name)| {
            !name.trim().is_empty() && row.attends().get(*idx).copied().unwrap_or(false)
        })
        .count() as u32
}

/// Weighted total of one score row, rounded half away from zero.
pub fn calc_sum(row: &ScoreRow, settings: &ScoreSettings) -> String {
    let attendance =
        multiplier(&settings.attendance_multiplier) * raw_value(&row.attendance_count);
    let criteria: f64 = settings
        .criteria
        .iter()
        .map(|criterion| raw_value(row.value(&criterion.label)) * multiplier(&criterion.multiplier))
        .sum();

    let rounded = (attendance + criteria).round() as i64;
    rounded.to_string()
}

/// Refreshes the roster-derived fields of a score row and its sum. Entered
/// criterion values of `existing` are kept.
pub fn derive_score_row(
    roster: &RosterRow,
    existing: Option<&ScoreRow>,
    settings: &ScoreSettings,
) -> ScoreRow {
    let mut row = existing.cloned().unwrap_or_default();
    row.class_name = roster.class_name.clone();
    row.teacher_name = roster.teacher_name.clone();
    row.roll_count = roll_count(roster);
    row.attendance_count = attendance_count(roster).to_string();
    row.sum = calc_sum(&row, settings);
    row
}

/// Score row for a freshly seeded week: counts filled in, nothing entered, no sum yet.
pub fn seeded_score_row(roster: &RosterRow) -> ScoreRow {
    ScoreRow {
        class_name: roster.class_name.clone(),
        teacher_name: roster.teacher_name.clone(),
        roll_count: roll_count(roster),
        attendance_count: attendance_count(roster).to_string(),
        ..ScoreRow::default()
    }
}

/// Recomputes every sum after a formula change; counts are left alone.
pub fn recompute_sums(groups: &mut ScoreGroups, settings: &ScoreSettings) {
    for row in groups.iter_mut().flatten() {
        row.sum = calc_sum(row, settings);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceTally {
    pub roll: u32,
    pub attended: u32,
}

impl AttendanceTally {
    fn add<R: SlotRow>(&mut self, row: &R) {
        self.roll += roll_count(row);
        self.attended += attendance_count(row);
    }
}

/// Weekly head counts per group, for the visitor table, and overall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekStats {
    pub groups: Vec<AttendanceTally>,
    pub visitors: AttendanceTally,
    pub students: AttendanceTally,
}

pub fn week_stats(tables: &[ClassTable], visitors: &VisitorTable) -> WeekStats {
    let mut stats = WeekStats::default();
    for table in tables {
        let mut tally = AttendanceTally::default();
        for row in &table.rows {
            tally.add(row);
        }
        stats.students.roll += tally.roll;
        stats.students.attended += tally.attended;
        stats.groups.push(tally);
    }
    for row in &visitors.rows {
        stats.visitors.add(row);
    }
    stats.students.roll += stats.visitors.roll;
    stats.students.attended += stats.visitors.attended;
    stats
}
