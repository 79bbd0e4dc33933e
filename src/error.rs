use crate::models::WeekKey;
use crate::store::StoreError;

/// Failures surfaced to callers of the ledger; the binary renders them as advisory messages.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("week key '{0}' must use the YYYY.MM.DD format")]
    InvalidWeekKey(String),
    #[error("week {0} already exists")]
    WeekExists(WeekKey),
    #[error("week {0} has not been created")]
    WeekNotFound(WeekKey),
    #[error("no roster was recorded for the week before {0}")]
    NoPreviousWeek(WeekKey),
    #[error("unknown group '{0}' (expected 0-2, faith/hope/love or 믿음/소망/사랑)")]
    UnknownGroup(String),
    #[error("row {row} does not exist in the {table} table")]
    RowOutOfRange { table: &'static str, row: usize },
    #[error("slot {0} is out of range (expected 0-9)")]
    SlotOutOfRange(usize),
    #[error("criterion {0} does not exist")]
    CriterionOutOfRange(usize),
    #[error("unknown offering category '{0}'")]
    CategoryNotFound(String),
    #[error("offering name cell ({column}, {line}) is out of range")]
    OfferingCellOutOfRange { column: usize, line: usize },
    #[error("month {0} is out of range (expected 1-12)")]
    MonthOutOfRange(u32),
    #[error(transparent)]
    Store(#[from] StoreError),
}
