use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LedgerError;

/// Student slots carried by every roster row.
pub const SLOT_COUNT: usize = 10;
pub const GROUP_COUNT: usize = 3;
pub const ATTENDANCE_LABEL: &str = "출석";
/// Classes whose name contains this marker are new-member classes and never compete.
pub const VISITOR_CLASS_MARKER: &str = "새신자";
pub const DEFAULT_CRITERIA: [&str; 6] = ["기도회", "전화심방", "5차원", "전도", "성경읽기", "내면화"];
pub const OFFERING_CATEGORIES: [&str; 6] = [
    "주일헌금",
    "감사헌금",
    "십일조",
    "일천번제헌금",
    "선교헌금",
    "특별헌금",
];
pub const OFFERING_NAME_COLUMNS: usize = 2;

/// Storage partition for one recorded week, rendered as `YYYY.MM.DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey(NaiveDate);

impl WeekKey {
    pub const fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub const fn date(self) -> NaiveDate {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn is_sunday(self) -> bool {
        self.0.weekday() == Weekday::Sun
    }

    /// The week recorded seven days earlier.
    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub_signed(Duration::days(7)).map(Self)
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y.%m.%d"))
    }
}

impl FromStr for WeekKey {
    type Err = LedgerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidWeekKey(raw.to_string());
        let bytes = raw.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'.' || bytes[7] != b'.' {
            return Err(invalid());
        }
        let digits_only = bytes
            .iter()
            .enumerate()
            .all(|(idx, byte)| idx == 4 || idx == 7 || byte.is_ascii_digit());
        if !digits_only {
            return Err(invalid());
        }

        let year = raw[0..4].parse::<i32>().map_err(|_| invalid())?;
        let month = raw[5..7].parse::<u32>().map_err(|_| invalid())?;
        let day = raw[8..10].parse::<u32>().map_err(|_| invalid())?;
        Self::from_ymd(year, month, day).ok_or_else(invalid)
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The three parallel roster groups that compete independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    Faith,
    Hope,
    Love,
}

impl Group {
    pub const fn ordered() -> [Self; GROUP_COUNT] {
        [Self::Faith, Self::Hope, Self::Love]
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Faith => 0,
            Self::Hope => 1,
            Self::Love => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ordered().get(index).copied()
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Faith => "믿음",
            Self::Hope => "소망",
            Self::Love => "사랑",
        }
    }

    /// Field name used by the manual award record.
    pub const fn award_field(self) -> &'static str {
        match self {
            Self::Faith => "faith",
            Self::Hope => "hope",
            Self::Love => "love",
        }
    }
}

impl FromStr for Group {
    type Err = LedgerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        Self::ordered()
            .into_iter()
            .find(|group| {
                value == group.index().to_string()
                    || value == group.label()
                    || value.eq_ignore_ascii_case(group.award_field())
            })
            .ok_or_else(|| LedgerError::UnknownGroup(raw.to_string()))
    }
}

fn blank_slots() -> Vec<String> {
    vec![String::new(); SLOT_COUNT]
}

fn cleared_attends() -> Vec<bool> {
    vec![false; SLOT_COUNT]
}

/// One class row of the weekly roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default = "blank_slots")]
    pub students: Vec<String>,
    #[serde(default = "cleared_attends")]
    pub attends: Vec<bool>,
}

impl RosterRow {
    pub fn blank() -> Self {
        Self::named("", "")
    }

    pub fn named(class_name: &str, teacher_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            teacher_name: teacher_name.to_string(),
            students: blank_slots(),
            attends: cleared_attends(),
        }
    }

    /// Same names, every attendance flag cleared.
    pub fn carried_forward(&self) -> Self {
        let mut row = Self {
            class_name: self.class_name.clone(),
            teacher_name: self.teacher_name.clone(),
            students: self.students.clone(),
            attends: cleared_attends(),
        };
        row.normalize();
        row
    }

    pub fn normalize(&mut self) {
        self.students.resize(SLOT_COUNT, String::new());
        self.attends.resize(SLOT_COUNT, false);
    }
}

/// One line of a roster CSV: `group,class_name,teacher_name,students`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterImport {
    pub group: String,
    pub class_name: String,
    #[serde(default)]
    pub teacher_name: String,
    /// Student names separated by `;`.
    #[serde(default)]
    pub students: String,
}

impl RosterImport {
    pub fn student_names(&self) -> Vec<&str> {
        self.students
            .split(';')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .take(SLOT_COUNT)
            .collect()
    }
}

/// Roster row of the new-member table; it has no class or teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRosterRow {
    #[serde(default = "blank_slots")]
    pub students: Vec<String>,
    #[serde(default = "cleared_attends")]
    pub attends: Vec<bool>,
}

impl VisitorRosterRow {
    pub fn blank() -> Self {
        Self {
            students: blank_slots(),
            attends: cleared_attends(),
        }
    }

    pub fn carried_forward(&self) -> Self {
        let mut row = Self {
            students: self.students.clone(),
            attends: cleared_attends(),
        };
        row.normalize();
        row
    }

    pub fn normalize(&mut self) {
        self.students.resize(SLOT_COUNT, String::new());
        self.attends.resize(SLOT_COUNT, false);
    }
}

/// Read access to the student slots shared by both roster row kinds.
pub trait SlotRow {
    fn students(&self) -> &[String];
    fn attends(&self) -> &[bool];
}

impl SlotRow for RosterRow {
    fn students(&self) -> &[String] {
        &self.students
    }

    fn attends(&self) -> &[bool] {
        &self.attends
    }
}

impl SlotRow for VisitorRosterRow {
    fn students(&self) -> &[String] {
        &self.students
    }

    fn attends(&self) -> &[bool] {
        &self.attends
    }
}

/// A roster group together with its edit-mode flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterTable<R> {
    #[serde(default = "Vec::new")]
    pub rows: Vec<R>,
    /// While set, clicks edit names instead of toggling attendance.
    #[serde(default)]
    pub edit: bool,
}

impl<R> RosterTable<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self { rows, edit: false }
    }
}

impl<R> Default for RosterTable<R> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

pub type ClassTable = RosterTable<RosterRow>;
pub type VisitorTable = RosterTable<VisitorRosterRow>;

/// One weighted scoring input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCriterion {
    pub label: String,
    #[serde(default)]
    pub multiplier: String,
}

impl ScoreCriterion {
    pub fn new(label: &str, multiplier: &str) -> Self {
        Self {
            label: label.to_string(),
            multiplier: multiplier.to_string(),
        }
    }
}

/// Formula configuration of one week: the attendance weight plus the editable criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSettings {
    pub attendance_multiplier: String,
    pub criteria: Vec<ScoreCriterion>,
}

impl ScoreSettings {
    pub fn standard() -> Self {
        Self {
            attendance_multiplier: String::new(),
            criteria: DEFAULT_CRITERIA
                .iter()
                .map(|label| ScoreCriterion::new(label, ""))
                .collect(),
        }
    }

    /// Splits the persisted array into the attendance entry and the editable list.
    pub fn from_records(records: Vec<ScoreCriterion>) -> Self {
        let mut attendance_multiplier = String::new();
        let mut criteria = Vec::with_capacity(records.len());
        for record in records {
            if record.label == ATTENDANCE_LABEL {
                attendance_multiplier = record.multiplier;
            } else {
                criteria.push(record);
            }
        }
        Self {
            attendance_multiplier,
            criteria,
        }
    }

    /// Persisted form: attendance first, then the editable criteria in order.
    pub fn to_records(&self) -> Vec<ScoreCriterion> {
        let mut records = Vec::with_capacity(self.criteria.len() + 1);
        records.push(ScoreCriterion::new(
            ATTENDANCE_LABEL,
            &self.attendance_multiplier,
        ));
        records.extend(self.criteria.iter().cloned());
        records
    }
}

impl Default for ScoreSettings {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-class weekly score record, aligned with the roster row at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRow {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub roll_count: u32,
    #[serde(default)]
    pub attendance_count: String,
    #[serde(default)]
    pub criterion_values: BTreeMap<String, String>,
    #[serde(default)]
    pub sum: String,
}

impl ScoreRow {
    pub fn value(&self, label: &str) -> &str {
        self.criterion_values
            .get(label)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Score rows of one week, one inner list per group.
pub type ScoreGroups = Vec<Vec<ScoreRow>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingRow {
    pub category: String,
    #[serde(default)]
    pub names: Vec<Vec<String>>,
    #[serde(default)]
    pub amount: String,
}

impl OfferingRow {
    pub fn fresh(category: &str) -> Self {
        Self {
            category: category.to_string(),
            names: vec![blank_slots(); OFFERING_NAME_COLUMNS],
            amount: String::new(),
        }
    }

    fn has_full_grid(&self) -> bool {
        self.names.len() == OFFERING_NAME_COLUMNS
            && self.names.iter().all(|column| column.len() == SLOT_COUNT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingTable {
    #[serde(default)]
    pub rows: Vec<OfferingRow>,
}

impl OfferingTable {
    pub fn fresh() -> Self {
        Self {
            rows: OFFERING_CATEGORIES
                .iter()
                .map(|category| OfferingRow::fresh(category))
                .collect(),
        }
    }

    /// Rebuilds the fixed category list, keeping stored values matched by category.
    pub fn merged(stored: OfferingTable) -> Self {
        let rows = OFFERING_CATEGORIES
            .iter()
            .map(|category| {
                match stored.rows.iter().find(|row| row.category == *category) {
                    Some(found) => OfferingRow {
                        category: category.to_string(),
                        names: if found.has_full_grid() {
                            found.names.clone()
                        } else {
                            vec![blank_slots(); OFFERING_NAME_COLUMNS]
                        },
                        amount: found.amount.clone(),
                    },
                    None => OfferingRow::fresh(category),
                }
            })
            .collect();
        Self { rows }
    }

    /// Sum of the digits-only reading of every amount.
    pub fn total(&self) -> u64 {
        self.rows
            .iter()
            .filter_map(|row| {
                let digits: String = row.amount.chars().filter(char::is_ascii_digit).collect();
                digits.parse::<u64>().ok()
            })
            .sum()
    }
}

impl Default for OfferingTable {
    fn default() -> Self {
        Self::fresh()
    }
}

/// A (class, teacher) identity tracked across a year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBlock {
    pub class_name: String,
    pub teacher_name: String,
    pub group: Group,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardEntry {
    #[serde(default)]
    pub faith: String,
    #[serde(default)]
    pub hope: String,
    #[serde(default)]
    pub love: String,
}

impl AwardEntry {
    pub fn get(&self, group: Group) -> &str {
        match group {
            Group::Faith => &self.faith,
            Group::Hope => &self.hope,
            Group::Love => &self.love,
        }
    }

    fn slot(&mut self, group: Group) -> &mut String {
        match group {
            Group::Faith => &mut self.faith,
            Group::Hope => &mut self.hope,
            Group::Love => &mut self.love,
        }
    }
}

/// Free-text awards entered by hand, keyed by year then month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualAwards(pub BTreeMap<i32, BTreeMap<u32, AwardEntry>>);

impl ManualAwards {
    pub fn get(&self, year: i32, month: u32, group: Group) -> Option<&str> {
        self.0
            .get(&year)
            .and_then(|months| months.get(&month))
            .map(|entry| entry.get(group))
            .filter(|text| !text.is_empty())
    }

    pub fn set(&mut self, year: i32, month: u32, group: Group, text: &str) {
        let entry = self.0.entry(year).or_default().entry(month).or_default();
        *entry.slot(group) = text.to_string();
    }
}
