use tracing::{info, warn};

use crate::error::LedgerError;
use crate::models::{Group, ManualAwards, WeekKey};
use crate::rollover::{self, PreviousWeek};
use crate::store::{self, RecordStore, StoreError, CREATED_DATES, MANUAL_SCORES, WEEK_PREFIXES};
use crate::week::{Partition, Week};

const ROSTER_PARTITIONS: [Partition; 2] = [Partition::Tables, Partition::Scores];
const FORMULA_PARTITIONS: [Partition; 2] = [Partition::Settings, Partition::Scores];
const IMPORT_PARTITIONS: [Partition; 3] =
    [Partition::Settings, Partition::Tables, Partition::Scores];

/// Week lifecycle and persistence on top of a [`RecordStore`].
pub struct Ledger<S> {
    store: S,
}

impl<S: RecordStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Created weeks in the order they were created. Unreadable index entries are skipped.
    pub fn list_weeks(&self) -> Result<Vec<WeekKey>, LedgerError> {
        let weeks = store::created_dates(&self.store)?
            .into_iter()
            .filter_map(|raw| match raw.parse::<WeekKey>() {
                Ok(week) => Some(week),
                Err(err) => {
                    warn!(entry = %raw, error = %err, "skipping unreadable createdDates entry");
                    None
                }
            })
            .collect();
        Ok(weeks)
    }

    pub fn is_created(&self, key: WeekKey) -> Result<bool, LedgerError> {
        let raw = key.to_string();
        Ok(store::created_dates(&self.store)?.contains(&raw))
    }

    /// A week is seeded once any of its partitions exists.
    pub fn is_seeded(&self, key: WeekKey) -> Result<bool, LedgerError> {
        for prefix in WEEK_PREFIXES {
            if store::contains(&self.store, &store::week_key(prefix, key))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn create_week(&mut self, key: WeekKey) -> Result<Week, LedgerError> {
        if self.is_created(key)? {
            return Err(LedgerError::WeekExists(key));
        }
        self.open_week(key)
    }

    pub fn open_existing_week(&mut self, key: WeekKey) -> Result<Week, LedgerError> {
        if !self.is_created(key)? {
            return Err(LedgerError::WeekNotFound(key));
        }
        self.open_week(key)
    }

    /// Loads a week, seeding it from the previous week on first access.
    pub fn open_week(&mut self, key: WeekKey) -> Result<Week, LedgerError> {
        if self.is_seeded(key)? {
            self.index_week(key)?;
            return Ok(Week::load(&self.store, key)?);
        }

        let previous = match key.previous() {
            Some(previous_key) => PreviousWeek::load(&self.store, previous_key)?,
            None => PreviousWeek::default(),
        };
        let carried = previous.tables.is_some();
        let week = rollover::seed_week(key, previous);

        week.save(&mut self.store, &Partition::all())?;
        self.index_week(key)?;
        info!(week = %key, carried_roster = carried, "week seeded");
        Ok(week)
    }

    /// Removes a week's index entry and then every partition it owns.
    pub fn delete_week(&mut self, key: WeekKey) -> Result<(), LedgerError> {
        let raw = key.to_string();
        let mut dates = store::created_dates(&self.store)?;
        let indexed = dates.contains(&raw);
        if !indexed && !self.is_seeded(key)? {
            return Err(LedgerError::WeekNotFound(key));
        }

        if indexed {
            dates.retain(|date| date != &raw);
            store::save_json(&mut self.store, CREATED_DATES, &dates)?;
        }
        for prefix in WEEK_PREFIXES {
            self.store.remove(&store::week_key(prefix, key))?;
        }
        info!(week = %key, "week deleted");
        Ok(())
    }

    /// Overwrites the formula and the roster with the previous week's, attendance
    /// cleared. Entered criterion values stay in place.
    pub fn import_previous_roster(&mut self, key: WeekKey) -> Result<Week, LedgerError> {
        let previous_key = key.previous().ok_or(LedgerError::NoPreviousWeek(key))?;
        let previous = PreviousWeek::load(&self.store, previous_key)?;
        let tables = previous.tables.ok_or(LedgerError::NoPreviousWeek(key))?;

        let mut week = self.open_existing_week(key)?;
        let formula_carried = previous.settings.is_some();
        if let Some(settings) = previous.settings {
            week.settings = settings;
        }
        week.replace_roster(rollover::carry_tables(&tables));
        if formula_carried {
            week.save(&mut self.store, &IMPORT_PARTITIONS)?;
        } else {
            week.save(&mut self.store, &ROSTER_PARTITIONS)?;
        }
        info!(week = %key, from = %previous_key, formula_carried, "roster imported from previous week");
        Ok(week)
    }

    /// Applies `edit` to an existing week and persists the listed partitions.
    pub fn edit_week<T, F>(
        &mut self,
        key: WeekKey,
        partitions: &[Partition],
        edit: F,
    ) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Week) -> Result<T, LedgerError>,
    {
        let mut week = self.open_existing_week(key)?;
        let output = edit(&mut week)?;
        week.save(&mut self.store, partitions)?;
        Ok(output)
    }

    /// Roster edits persist the roster and the score rows derived from it.
    pub fn update_roster<T, F>(&mut self, key: WeekKey, edit: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Week) -> Result<T, LedgerError>,
    {
        self.edit_week(key, &ROSTER_PARTITIONS, edit)
    }

    pub fn update_visitors<T, F>(&mut self, key: WeekKey, edit: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Week) -> Result<T, LedgerError>,
    {
        self.edit_week(key, &[Partition::Visitors], edit)
    }

    /// Formula edits persist the settings together with the recomputed sums.
    pub fn update_formula<T, F>(&mut self, key: WeekKey, edit: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Week) -> Result<T, LedgerError>,
    {
        self.edit_week(key, &FORMULA_PARTITIONS, edit)
    }

    pub fn update_scores<T, F>(&mut self, key: WeekKey, edit: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Week) -> Result<T, LedgerError>,
    {
        self.edit_week(key, &[Partition::Scores], edit)
    }

    pub fn update_offerings<T, F>(&mut self, key: WeekKey, edit: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Week) -> Result<T, LedgerError>,
    {
        self.edit_week(key, &[Partition::Offerings], edit)
    }

    pub fn manual_awards(&self) -> Result<ManualAwards, LedgerError> {
        Ok(store::load_json_or_default(&self.store, MANUAL_SCORES)?)
    }

    pub fn set_manual_award(
        &mut self,
        year: i32,
        month: u32,
        group: Group,
        text: &str,
    ) -> Result<(), LedgerError> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::MonthOutOfRange(month));
        }
        let mut awards = self.manual_awards()?;
        awards.set(year, month, group, text);
        store::save_json(&mut self.store, MANUAL_SCORES, &awards)?;
        Ok(())
    }

    fn index_week(&mut self, key: WeekKey) -> Result<(), StoreError> {
        let raw = key.to_string();
        let mut dates = store::created_dates(&self.store)?;
        if !dates.contains(&raw) {
            dates.push(raw);
            store::save_json(&mut self.store, CREATED_DATES, &dates)?;
        }
        Ok(())
    }
}
