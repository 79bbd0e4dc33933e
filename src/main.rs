use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

mod aggregate;
mod config;
mod db;
mod error;
mod ledger;
mod migrate;
mod models;
mod report;
mod rollover;
mod scoring;
mod store;
mod telemetry;
mod week;

use crate::aggregate::YearAggregator;
use crate::config::{AppConfig, Backend};
use crate::ledger::Ledger;
use crate::models::{Group, WeekKey};
use crate::store::{MemoryStore, RecordStore};

#[derive(Parser)]
#[command(name = "attendance-ledger")]
#[command(about = "Weekly class attendance scores with monthly group winners", long_about = None)]
struct Cli {
    /// JSON ledger file; takes precedence over DATABASE_URL and LEDGER_FILE
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the record schema
    InitDb,
    /// Record a sample January 2025 history
    Seed,
    /// Create, open, list and delete weeks
    Week {
        #[command(subcommand)]
        command: WeekCommand,
    },
    /// Edit a week's class roster
    Roster {
        #[arg(long)]
        week: WeekKey,
        #[command(subcommand)]
        command: RosterCommand,
    },
    /// Edit a week's new-member roster
    Visitor {
        #[arg(long)]
        week: WeekKey,
        #[command(subcommand)]
        command: VisitorCommand,
    },
    /// Edit a week's score formula
    Formula {
        #[arg(long)]
        week: WeekKey,
        #[command(subcommand)]
        command: FormulaCommand,
    },
    /// Enter criterion scores
    Score {
        #[arg(long)]
        week: WeekKey,
        #[command(subcommand)]
        command: ScoreCommand,
    },
    /// Edit a week's offering table
    Offering {
        #[arg(long)]
        week: WeekKey,
        #[command(subcommand)]
        command: OfferingCommand,
    },
    /// Record hand-entered monthly awards
    Award {
        #[command(subcommand)]
        command: AwardCommand,
    },
    /// Monthly and yearly standings
    Year {
        #[command(subcommand)]
        command: YearCommand,
    },
}

#[derive(Subcommand)]
enum WeekCommand {
    /// Create a week, carrying the roster and formula from seven days earlier
    Create { week: WeekKey },
    /// Open a week, seeding it on first access
    Open { week: WeekKey },
    /// Delete a week and all of its records
    Delete { week: WeekKey },
    /// List created weeks
    List,
    /// Print a created week
    Show { week: WeekKey },
    /// Replace the formula and roster with the previous week's
    ImportPrev { week: WeekKey },
}

#[derive(Subcommand)]
enum RosterCommand {
    AddRow {
        group: Group,
    },
    DeleteRow {
        group: Group,
        row: usize,
    },
    SetClass {
        group: Group,
        row: usize,
        name: String,
    },
    SetTeacher {
        group: Group,
        row: usize,
        name: String,
    },
    SetStudent {
        group: Group,
        row: usize,
        slot: usize,
        name: String,
    },
    /// Flip one attendance mark (ignored while the group is in edit mode)
    Toggle {
        group: Group,
        row: usize,
        slot: usize,
    },
    EditMode {
        group: Group,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Append rows from a CSV file (group,class_name,teacher_name,students)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Subcommand)]
enum VisitorCommand {
    AddRow,
    DeleteRow {
        row: usize,
    },
    SetStudent {
        row: usize,
        slot: usize,
        name: String,
    },
    /// Flip one attendance mark (ignored while the table is in edit mode)
    Toggle {
        row: usize,
        slot: usize,
    },
    EditMode {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand)]
enum FormulaCommand {
    Add,
    Delete { index: usize },
    SetLabel { index: usize, label: String },
    SetMultiplier { index: usize, value: String },
    SetAttendance { value: String },
}

#[derive(Subcommand)]
enum ScoreCommand {
    Set {
        group: Group,
        row: usize,
        label: String,
        value: String,
    },
}

#[derive(Subcommand)]
enum OfferingCommand {
    SetName {
        category: String,
        column: usize,
        line: usize,
        name: String,
    },
    SetAmount {
        category: String,
        amount: String,
    },
}

#[derive(Subcommand)]
enum AwardCommand {
    Set {
        year: i32,
        month: u32,
        group: Group,
        text: String,
    },
}

#[derive(Subcommand)]
enum YearCommand {
    Report {
        year: i32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.file.clone()).context("invalid configuration")?;
    telemetry::init(&config.log_filter).context("failed to initialise logging")?;

    match &config.backend {
        Backend::Postgres { url } => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;
            if matches!(cli.command, Commands::InitDb) {
                db::init_db(&pool).await?;
            }

            let mut store = db::load_store(&pool).await?;
            migrate::run(&mut store)?;
            let mut store = run(cli.command, &config, store)?;
            let written = db::flush(&pool, store.take_changes()).await?;
            info!(records = written, "ledger flushed to Postgres");
        }
        Backend::File { path } => {
            let mut store = db::load_file(path)?;
            migrate::run(&mut store)?;
            let store = run(cli.command, &config, store)?;
            if store.has_changes() {
                db::save_file(path, &store)?;
                info!(file = %path.display(), "ledger saved");
            }
        }
    }

    Ok(())
}

fn run(command: Commands, config: &AppConfig, store: MemoryStore) -> anyhow::Result<MemoryStore> {
    let mut ledger = Ledger::new(store);
    execute(command, config, &mut ledger)?;
    Ok(ledger.into_store())
}

fn execute<S: RecordStore>(
    command: Commands,
    config: &AppConfig,
    ledger: &mut Ledger<S>,
) -> anyhow::Result<()> {
    match command {
        Commands::InitDb => {
            println!("Schema ready.");
        }
        Commands::Seed => {
            let seeded = db::seed(ledger)?;
            println!("Seed data recorded for {seeded} weeks.");
        }
        Commands::Week { command } => week_command(command, ledger)?,
        Commands::Roster { week, command } => roster_command(week, command, ledger)?,
        Commands::Visitor { week, command } => visitor_command(week, command, ledger)?,
        Commands::Formula { week, command } => {
            ledger.update_formula(week, |current| match command {
                FormulaCommand::Add => {
                    let index = current.add_criterion();
                    println!("Criterion {index} added.");
                    Ok(())
                }
                FormulaCommand::Delete { index } => {
                    let removed = current.delete_criterion(index)?;
                    println!("Criterion '{}' removed.", removed.label);
                    Ok(())
                }
                FormulaCommand::SetLabel { index, label } => {
                    current.set_criterion_label(index, &label)
                }
                FormulaCommand::SetMultiplier { index, value } => {
                    current.set_criterion_multiplier(index, &value)
                }
                FormulaCommand::SetAttendance { value } => {
                    current.set_attendance_multiplier(&value);
                    Ok(())
                }
            })?;
        }
        Commands::Score {
            week,
            command:
                ScoreCommand::Set {
                    group,
                    row,
                    label,
                    value,
                },
        } => {
            let sum = ledger.update_scores(week, |current| {
                current.set_score_value(group, row, &label, &value)
            })?;
            println!("Sum for {} row {row}: {sum}", group.label());
        }
        Commands::Offering { week, command } => {
            ledger.update_offerings(week, |current| match command {
                OfferingCommand::SetName {
                    category,
                    column,
                    line,
                    name,
                } => current.set_offering_name(&category, column, line, &name),
                OfferingCommand::SetAmount { category, amount } => {
                    current.set_offering_amount(&category, &amount)
                }
            })?;
        }
        Commands::Award {
            command:
                AwardCommand::Set {
                    year,
                    month,
                    group,
                    text,
                },
        } => {
            ledger.set_manual_award(year, month, group, &text)?;
            println!("Award recorded for {year}-{month:02} {}.", group.label());
        }
        Commands::Year {
            command: YearCommand::Report { year, out },
        } => {
            let standings = YearAggregator::new(config.tie_break).standings(ledger.store(), year)?;
            let report = report::build_year_report(&standings, &ledger.manual_awards()?);
            match out {
                Some(path) => {
                    std::fs::write(&path, report)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{report}"),
            }
        }
    }

    Ok(())
}

fn week_command<S: RecordStore>(command: WeekCommand, ledger: &mut Ledger<S>) -> anyhow::Result<()> {
    match command {
        WeekCommand::Create { week } => {
            if !week.is_sunday() {
                println!("Note: {week} is not a Sunday and will not count toward monthly totals.");
            }
            let created = ledger.create_week(week)?;
            print!("{}", report::build_week_summary(&created));
        }
        WeekCommand::Open { week } => {
            let opened = ledger.open_week(week)?;
            print!("{}", report::build_week_summary(&opened));
        }
        WeekCommand::Delete { week } => {
            ledger.delete_week(week)?;
            println!("Week {week} deleted.");
        }
        WeekCommand::List => {
            let weeks = ledger.list_weeks()?;
            if weeks.is_empty() {
                println!("No weeks created yet.");
            }
            for week in weeks {
                println!("- {week}");
            }
        }
        WeekCommand::Show { week } => {
            let current = ledger.open_existing_week(week)?;
            print!("{}", report::build_week_summary(&current));
        }
        WeekCommand::ImportPrev { week } => {
            let imported = ledger.import_previous_roster(week)?;
            print!("{}", report::build_week_summary(&imported));
        }
    }
    Ok(())
}

fn roster_command<S: RecordStore>(
    week: WeekKey,
    command: RosterCommand,
    ledger: &mut Ledger<S>,
) -> anyhow::Result<()> {
    match command {
        RosterCommand::Toggle { group, row, slot } => {
            if !ledger.open_existing_week(week)?.attendance_toggle_allowed(group) {
                println!(
                    "{} is in edit mode; turn it off before taking attendance.",
                    group.label()
                );
                return Ok(());
            }
            let attended =
                ledger.update_roster(week, |current| current.toggle_attendance(group, row, slot))?;
            println!(
                "{} row {row} slot {slot}: {}",
                group.label(),
                if attended { "present" } else { "absent" }
            );
        }
        RosterCommand::Import { csv } => {
            let rows = db::read_roster_csv(&csv)?;
            let imported = ledger.update_roster(week, |current| current.import_roster_rows(&rows))?;
            println!("Imported {imported} roster rows from {}.", csv.display());
        }
        command => {
            ledger.update_roster(week, |current| match command {
                RosterCommand::AddRow { group } => {
                    let row = current.add_row(group);
                    println!("{} row {row} added.", group.label());
                    Ok(())
                }
                RosterCommand::DeleteRow { group, row } => current.delete_row(group, row).map(|_| ()),
                RosterCommand::SetClass { group, row, name } => {
                    current.set_class_name(group, row, &name)
                }
                RosterCommand::SetTeacher { group, row, name } => {
                    current.set_teacher_name(group, row, &name)
                }
                RosterCommand::SetStudent {
                    group,
                    row,
                    slot,
                    name,
                } => current.set_student(group, row, slot, &name),
                RosterCommand::EditMode { group, enabled } => {
                    current.set_edit_mode(group, enabled);
                    Ok(())
                }
                RosterCommand::Toggle { .. } | RosterCommand::Import { .. } => Ok(()),
            })?;
        }
    }
    Ok(())
}

fn visitor_command<S: RecordStore>(
    week: WeekKey,
    command: VisitorCommand,
    ledger: &mut Ledger<S>,
) -> anyhow::Result<()> {
    if let VisitorCommand::Toggle { row, slot } = command {
        if !ledger.open_existing_week(week)?.visitor_toggle_allowed() {
            println!("The new-member table is in edit mode; turn it off before taking attendance.");
            return Ok(());
        }
        let attended =
            ledger.update_visitors(week, |current| current.toggle_visitor_attendance(row, slot))?;
        println!(
            "New-member row {row} slot {slot}: {}",
            if attended { "present" } else { "absent" }
        );
        return Ok(());
    }

    ledger.update_visitors(week, |current| match command {
        VisitorCommand::AddRow => {
            let row = current.add_visitor_row();
            println!("New-member row {row} added.");
            Ok(())
        }
        VisitorCommand::DeleteRow { row } => current.delete_visitor_row(row).map(|_| ()),
        VisitorCommand::SetStudent { row, slot, name } => {
            current.set_visitor_student(row, slot, &name)
        }
        VisitorCommand::EditMode { enabled } => {
            current.set_visitor_edit_mode(enabled);
            Ok(())
        }
        VisitorCommand::Toggle { .. } => Ok(()),
    })?;
    Ok(())
}
