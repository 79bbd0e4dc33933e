use std::fmt::Write;

use crate::aggregate::{MonthlyStanding, Winner, YearStandings};
use crate::models::{Group, ManualAwards};
use crate::week::Week;

fn format_score(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn describe_winner(standings: &YearStandings, winner: &Winner) -> String {
    let block = &standings.blocks[winner.block];
    let mut text = format!(
        "{} {} ({})",
        block.class_name,
        block.teacher_name,
        format_score(winner.total)
    );
    if winner.tied.len() > 1 {
        let others: Vec<&str> = winner
            .tied
            .iter()
            .filter(|idx| **idx != winner.block)
            .map(|idx| standings.blocks[*idx].class_name.as_str())
            .collect();
        let _ = write!(text, ", tied with {}", others.join(", "));
    }
    text
}

fn write_month(
    output: &mut String,
    standings: &YearStandings,
    month: &MonthlyStanding,
    awards: &ManualAwards,
) {
    let _ = writeln!(output, "## {}-{:02}", standings.year, month.month);

    if month.sundays.is_empty() || standings.blocks.is_empty() {
        let _ = writeln!(output, "No classes to compare.");
        let _ = writeln!(output);
        return;
    }

    let header: Vec<String> = month
        .sundays
        .iter()
        .map(|week| week.date().format("%m/%d").to_string())
        .collect();
    let _ = writeln!(output, "| Group | Class | Teacher | {} | Total |", header.join(" | "));
    let _ = writeln!(output, "|---|---|---|{}---|", "---|".repeat(header.len()));
    for (idx, block) in standings.blocks.iter().enumerate() {
        let weekly: Vec<String> = month.weekly[idx]
            .iter()
            .map(|value| value.map(format_score).unwrap_or_else(|| "-".to_string()))
            .collect();
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            block.group.label(),
            block.class_name,
            block.teacher_name,
            weekly.join(" | "),
            format_score(month.totals[idx])
        );
    }

    let _ = writeln!(output);
    for group in Group::ordered() {
        let winner = month.winners[group.index()]
            .as_ref()
            .map(|winner| describe_winner(standings, winner))
            .unwrap_or_else(|| "none".to_string());
        match awards.get(standings.year, month.month, group) {
            Some(manual) => {
                let _ = writeln!(
                    output,
                    "- {} winner: {} (manual award: {})",
                    group.label(),
                    winner,
                    manual
                );
            }
            None => {
                let _ = writeln!(output, "- {} winner: {}", group.label(), winner);
            }
        }
    }
    let _ = writeln!(output);
}

/// Markdown report of every month of a year plus the yearly totals.
pub fn build_year_report(standings: &YearStandings, awards: &ManualAwards) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Score Report {}", standings.year);
    match standings.source_week {
        Some(week) => {
            let _ = writeln!(output, "Classes taken from the roster of {week}.");
        }
        None => {
            let _ = writeln!(output, "No weeks recorded for this year.");
        }
    }
    let _ = writeln!(output);

    for month in &standings.months {
        write_month(&mut output, standings, month, awards);
    }

    let _ = writeln!(output, "## Yearly Totals");
    if standings.blocks.is_empty() {
        let _ = writeln!(output, "No classes to compare.");
        return output;
    }
    for (block, total) in standings.blocks.iter().zip(&standings.yearly_totals) {
        let _ = writeln!(
            output,
            "- {} {} {}: {}",
            block.group.label(),
            block.class_name,
            block.teacher_name,
            format_score(*total)
        );
    }
    let _ = writeln!(output);
    for group in Group::ordered() {
        let winner = standings.yearly_winners[group.index()]
            .as_ref()
            .map(|winner| describe_winner(standings, winner))
            .unwrap_or_else(|| "none".to_string());
        let _ = writeln!(output, "- {} yearly winner: {}", group.label(), winner);
    }

    output
}

/// Plain-text overview of one week for the `week show` command.
pub fn build_week_summary(week: &Week) -> String {
    let mut output = String::new();
    let stats = week.stats();

    let _ = writeln!(output, "Week {}", week.key);
    for group in Group::ordered() {
        let table = week.table(group);
        let tally = stats.groups.get(group.index()).copied().unwrap_or_default();
        let _ = writeln!(
            output,
            "{}{}: {}/{} attended",
            group.label(),
            if table.edit { " (editing)" } else { "" },
            tally.attended,
            tally.roll
        );
        for (idx, row) in table.rows.iter().enumerate() {
            let (attendance, sum) = week
                .score_row(group, idx)
                .map(|score| (score.attendance_count.as_str(), score.sum.as_str()))
                .unwrap_or(("", ""));
            let _ = writeln!(
                output,
                "  [{idx}] {} / {}: attendance {} sum {}",
                row.class_name,
                row.teacher_name,
                if attendance.is_empty() { "-" } else { attendance },
                if sum.is_empty() { "-" } else { sum }
            );
        }
    }
    let _ = writeln!(
        output,
        "Visitors: {}/{} attended",
        stats.visitors.attended, stats.visitors.roll
    );
    let _ = writeln!(
        output,
        "All students: {}/{} attended",
        stats.students.attended, stats.students.roll
    );

    let formula: Vec<String> = week
        .settings
        .criteria
        .iter()
        .map(|criterion| {
            if criterion.multiplier.trim().is_empty() {
                criterion.label.clone()
            } else {
                format!("{} x{}", criterion.label, criterion.multiplier)
            }
        })
        .collect();
    let _ = writeln!(
        output,
        "Formula: attendance x{}, {}",
        if week.settings.attendance_multiplier.trim().is_empty() {
            "1"
        } else {
            week.settings.attendance_multiplier.as_str()
        },
        formula.join(", ")
    );
    let _ = writeln!(output, "Offerings total: {}", week.offerings.total());

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::YearAggregator;
    use crate::ledger::Ledger;
    use crate::models::WeekKey;
    use crate::store::MemoryStore;

    fn week(month: u32, day: u32) -> WeekKey {
        WeekKey::from_ymd(2025, month, day).expect("valid date")
    }

    fn scored_ledger() -> Ledger<MemoryStore> {
        let mut ledger = Ledger::new(MemoryStore::new());
        ledger.create_week(week(1, 5)).expect("created");
        ledger.create_week(week(1, 12)).expect("created");
        for (key, value) in [(week(1, 5), "20"), (week(1, 12), "30")] {
            ledger
                .update_scores(key, |week| week.set_score_value(Group::Faith, 0, "기도회", value))
                .expect("scored");
        }
        ledger
    }

    #[test]
    fn year_report_lists_totals_and_winners() {
        let mut ledger = scored_ledger();
        ledger
            .set_manual_award(2025, 1, Group::Hope, "2반 교사2")
            .expect("award saved");
        let standings = YearAggregator::default()
            .standings(ledger.store(), 2025)
            .expect("standings");
        let report = build_year_report(&standings, &ledger.manual_awards().expect("awards"));

        assert!(report.starts_with("# Attendance Score Report 2025"));
        assert!(report.contains("Classes taken from the roster of 2025.01.05."));
        assert!(report.contains("| 믿음 | 1반 | 교사1 | 20 | 30 | - | - | 50 |"));
        assert!(report.contains("- 믿음 winner: 1반 교사1 (50)"));
        assert!(report.contains("- 소망 winner: none (manual award: 2반 교사2)"));
        assert!(report.contains("- 믿음 yearly winner: 1반 교사1 (50)"));
    }

    #[test]
    fn empty_year_renders_placeholder() {
        let standings = YearAggregator::default()
            .standings(&MemoryStore::new(), 2024)
            .expect("standings");
        let report = build_year_report(&standings, &ManualAwards::default());
        assert!(report.contains("No weeks recorded for this year."));
        assert!(report.ends_with("No classes to compare.\n"));
    }

    #[test]
    fn week_summary_shows_stats_and_offerings() {
        let mut ledger = scored_ledger();
        ledger
            .update_roster(week(1, 5), |week| {
                week.set_student(Group::Faith, 0, 0, "Tom")?;
                week.set_student(Group::Faith, 0, 1, "Ann")?;
                week.toggle_attendance(Group::Faith, 0, 0).map(|_| ())
            })
            .expect("roster edited");
        ledger
            .update_offerings(week(1, 5), |week| week.set_offering_amount("십일조", "1,500"))
            .expect("offering edited");

        let opened = ledger.open_existing_week(week(1, 5)).expect("opened");
        let summary = build_week_summary(&opened);
        assert!(summary.contains("믿음: 1/2 attended"));
        assert!(summary.contains("[0] 1반 / 교사1: attendance 1 sum 21"));
        assert!(summary.contains("All students: 1/2 attended"));
        assert!(summary.contains("Offerings total: 1500"));
    }

    #[test]
    fn fractional_scores_keep_one_decimal() {
        assert_eq!(format_score(50.0), "50");
        assert_eq!(format_score(12.5), "12.5");
    }
}
