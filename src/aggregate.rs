use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::debug;

use crate::models::{
    ClassBlock, ClassTable, Group, ScoreGroups, ScoreRow, WeekKey, GROUP_COUNT,
    VISITOR_CLASS_MARKER,
};
use crate::scoring::parse_number;
use crate::store::{self, RecordStore, StoreError, SCORE_ROWS_PREFIX, TABLES_PREFIX};

/// Which block wins when two share the highest monthly total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// The block evaluated last keeps the title.
    #[default]
    LastEvaluated,
    /// The block evaluated first keeps the title.
    FirstEvaluated,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "last" | "last-evaluated" => Ok(Self::LastEvaluated),
            "first" | "first-evaluated" => Ok(Self::FirstEvaluated),
            other => Err(format!("unknown tie-break policy '{other}' (expected last or first)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Winner {
    /// Index into [`YearStandings::blocks`].
    pub block: usize,
    pub total: f64,
    /// Every block sharing the winning total, the winner included.
    pub tied: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyStanding {
    pub month: u32,
    pub sundays: Vec<WeekKey>,
    /// Per block, the contribution of each Sunday (`None` when nothing counted).
    pub weekly: Vec<Vec<Option<f64>>>,
    pub totals: Vec<f64>,
    /// One entry per group.
    pub winners: Vec<Option<Winner>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearStandings {
    pub year: i32,
    /// The week the competing blocks were read from.
    pub source_week: Option<WeekKey>,
    pub blocks: Vec<ClassBlock>,
    pub months: Vec<MonthlyStanding>,
    pub yearly_totals: Vec<f64>,
    pub yearly_winners: Vec<Option<Winner>>,
}

pub fn sundays_of_month(year: i32, month: u32) -> Vec<WeekKey> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    let offset = (7 - first.weekday().num_days_from_sunday()) % 7;
    let mut day = first + Duration::days(i64::from(offset));
    let mut sundays = Vec::new();
    while day.month() == month {
        debug_assert_eq!(day.weekday(), Weekday::Sun);
        sundays.push(WeekKey::from_date(day));
        day += Duration::days(7);
    }
    sundays
}

/// Earliest created week of `year`, in date order.
pub fn first_week_of_year<S: RecordStore + ?Sized>(
    store: &S,
    year: i32,
) -> Result<Option<WeekKey>, StoreError> {
    Ok(store::created_dates(store)?
        .iter()
        .filter_map(|raw| raw.parse::<WeekKey>().ok())
        .filter(|week| week.year() == year)
        .min())
}

/// Competing blocks of a year, read from the roster of its first recorded week.
pub fn discover_blocks<S: RecordStore + ?Sized>(
    store: &S,
    year: i32,
) -> Result<(Option<WeekKey>, Vec<ClassBlock>), StoreError> {
    let Some(first) = first_week_of_year(store, year)? else {
        return Ok((None, Vec::new()));
    };

    let tables: Vec<ClassTable> =
        store::load_json_or_default(store, &store::week_key(TABLES_PREFIX, first))?;
    let mut blocks: Vec<ClassBlock> = Vec::new();
    for (idx, table) in tables.iter().enumerate().take(GROUP_COUNT) {
        let Some(group) = Group::from_index(idx) else {
            continue;
        };
        for row in &table.rows {
            if row.class_name.trim().is_empty() || row.class_name.contains(VISITOR_CLASS_MARKER) {
                continue;
            }
            let duplicate = blocks.iter().any(|block| {
                block.class_name == row.class_name && block.teacher_name == row.teacher_name
            });
            if !duplicate {
                blocks.push(ClassBlock {
                    class_name: row.class_name.clone(),
                    teacher_name: row.teacher_name.clone(),
                    group,
                });
            }
        }
    }
    Ok((Some(first), blocks))
}

/// All score rows of a week across groups.
pub fn week_score_rows<S: RecordStore + ?Sized>(
    store: &S,
    week: WeekKey,
) -> Result<Vec<ScoreRow>, StoreError> {
    let groups: ScoreGroups =
        store::load_json_or_default(store, &store::week_key(SCORE_ROWS_PREFIX, week))?;
    Ok(groups.into_iter().flatten().collect())
}

/// The block's sum within one week's rows; missing or non-numeric sums do not count.
pub fn contribution(rows: &[ScoreRow], block: &ClassBlock) -> Option<f64> {
    rows.iter()
        .find(|row| row.class_name == block.class_name && row.teacher_name == block.teacher_name)
        .and_then(|row| parse_number(&row.sum))
}

/// Strictly largest positive total within `group`.
pub fn pick_winner(
    blocks: &[ClassBlock],
    totals: &[f64],
    group: Group,
    tie_break: TieBreak,
) -> Option<Winner> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, (block, total)) in blocks.iter().zip(totals).enumerate() {
        if block.group != group || *total <= 0.0 {
            continue;
        }
        let replaces = match best {
            None => true,
            Some((_, current)) => match tie_break {
                TieBreak::LastEvaluated => *total >= current,
                TieBreak::FirstEvaluated => *total > current,
            },
        };
        if replaces {
            best = Some((idx, *total));
        }
    }

    best.map(|(block, total)| Winner {
        block,
        total,
        tied: blocks
            .iter()
            .zip(totals)
            .enumerate()
            .filter(|(_, (candidate, value))| candidate.group == group && **value == total)
            .map(|(idx, _)| idx)
            .collect(),
    })
}

fn winners(blocks: &[ClassBlock], totals: &[f64], tie_break: TieBreak) -> Vec<Option<Winner>> {
    Group::ordered()
        .into_iter()
        .map(|group| pick_winner(blocks, totals, group, tie_break))
        .collect()
}

/// Builds monthly and yearly standings from the recorded weeks.
#[derive(Debug, Clone, Copy, Default)]
pub struct YearAggregator {
    tie_break: TieBreak,
}

impl YearAggregator {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    pub fn standings<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        year: i32,
    ) -> Result<YearStandings, StoreError> {
        let (source_week, blocks) = discover_blocks(store, year)?;
        let mut rows_by_week: HashMap<WeekKey, Vec<ScoreRow>> = HashMap::new();
        let mut months = Vec::with_capacity(12);
        let mut yearly_totals = vec![0.0; blocks.len()];

        for month in 1..=12 {
            let sundays = sundays_of_month(year, month);
            for week in &sundays {
                if !rows_by_week.contains_key(week) {
                    rows_by_week.insert(*week, week_score_rows(store, *week)?);
                }
            }

            let weekly: Vec<Vec<Option<f64>>> = blocks
                .iter()
                .map(|block| {
                    sundays
                        .iter()
                        .map(|week| {
                            rows_by_week
                                .get(week)
                                .and_then(|rows| contribution(rows, block))
                        })
                        .collect()
                })
                .collect();
            let totals: Vec<f64> = weekly
                .iter()
                .map(|values| values.iter().flatten().sum())
                .collect();
            for (yearly, total) in yearly_totals.iter_mut().zip(&totals) {
                *yearly += total;
            }

            let winners = winners(&blocks, &totals, self.tie_break);
            months.push(MonthlyStanding {
                month,
                sundays,
                weekly,
                totals,
                winners,
            });
        }

        let yearly_winners = winners(&blocks, &yearly_totals, self.tie_break);
        debug!(year, blocks = blocks.len(), source = ?source_week, "year standings built");
        Ok(YearStandings {
            year,
            source_week,
            blocks,
            months,
            yearly_totals,
            yearly_winners,
        })
    }
}
