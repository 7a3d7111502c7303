use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::inventory::{GroupRow, TestRow};
use crate::results::RecountOutcome;
use crate::schedule::ArchSelection;
use crate::sync::SyncReport;

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{
    color_coded_rate_cell, color_coded_result_cell, count_cell, create_table, cyan_header,
};

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Prints per-checkout sync counters to stdout.
pub fn print_sync_summary(reports: &[SyncReport]) {
    println!("{}", render_sync_summary(reports));
}

pub fn print_tests(rows: &[TestRow]) {
    println!("{}", render_tests(rows));
}

pub fn print_groups(rows: &[GroupRow]) {
    println!("{}", render_groups(rows));
}

pub fn print_schedule(selection: &ArchSelection) {
    println!("{}", render_schedule(selection));
}

pub fn print_recounts(outcomes: &[RecountOutcome]) {
    println!("{}", render_recounts(outcomes));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn render_sync_summary(reports: &[SyncReport]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🔄", "Synchronized Checkouts");

    if reports.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No checkouts synchronized."));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Repository",
        "Refreshed",
        "Scanned",
        "Created",
        "Updated",
        "Unchanged",
        "Skipped",
        "Merged",
        "Commits",
    ]));

    for report in reports {
        let refreshed = if report.refreshed {
            Cell::new("yes").fg(TableColor::Green)
        } else {
            Cell::new("stale").fg(TableColor::Yellow)
        };
        let skipped = if report.reconcile.skipped > 0 {
            Cell::new(report.reconcile.skipped).fg(TableColor::Yellow)
        } else {
            count_cell(0)
        };

        table.add_row(vec![
            Cell::new(format!("{}\n{}", report.repository, report.url)),
            refreshed,
            Cell::new(report.reconcile.scanned),
            count_cell(report.reconcile.created),
            count_cell(report.reconcile.updated),
            count_cell(report.reconcile.unchanged),
            skipped,
            count_cell(report.reconcile.merged),
            count_cell(report.history.recorded),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_tests(rows: &[TestRow]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🧪", "Registered Tests");

    let _ = writeln!(
        output,
        "  {} {}\n",
        dim("Tests:"),
        bright_yellow(rows.len())
    );
    if rows.is_empty() {
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&[
        "Test",
        "Owner",
        "Groups",
        "Dependencies",
        "Last Commit",
    ]));

    for row in rows {
        let name = match &row.url {
            Some(url) => format!("{}\n{}", row.name, url),
            None => row.name.clone(),
        };
        let name_cell = if row.enabled {
            Cell::new(name)
        } else {
            Cell::new(name).fg(TableColor::DarkGrey)
        };
        let commit = match (&row.last_commit, &row.version) {
            (Some(commit), Some(version)) => format!("{commit}\n{version}"),
            (Some(commit), None) => commit.clone(),
            _ => "N/A".to_string(),
        };

        table.add_row(vec![
            name_cell,
            Cell::new(row.owner.as_deref().unwrap_or("N/A")),
            Cell::new(row.groups.join("\n")),
            Cell::new(row.dependencies.join("\n")),
            Cell::new(commit),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_groups(rows: &[GroupRow]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "🏷️", "Group Tags");

    let mut table = create_table();
    table.set_header(cyan_header(&["Group", "Tests"]));
    for row in rows {
        table.add_row(vec![Cell::new(&row.name), count_cell(row.tests)]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_schedule(selection: &ArchSelection) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📅", "Architecture Schedule");

    let day = WEEKDAYS
        .get(usize::from(selection.weekday))
        .copied()
        .unwrap_or("?");
    let archs = if selection.archs.is_empty() {
        bright_red("none").to_string()
    } else {
        bright_green(selection.archs.join(", ")).to_string()
    };
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}{}\n",
        dim("Weekday:"),
        cyan(format!("{} ({day})", selection.weekday)),
        dim("Architectures:"),
        archs,
        if selection.fallback {
            dim(" (no rule matched, all declared)").to_string()
        } else {
            String::new()
        }
    );

    if selection.rules.is_empty() {
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Architecture", "Rule", "Weekday", "Today"]));
    for rule in &selection.rules {
        let selected = (rule.include && rule.weekday == selection.weekday)
            || (!rule.include && rule.weekday != selection.weekday);
        table.add_row(vec![
            Cell::new(&rule.arch),
            Cell::new(if rule.include { "only" } else { "except" }),
            Cell::new(rule.weekday),
            if selected {
                Cell::new("selected").fg(TableColor::Green)
            } else {
                Cell::new("-").fg(TableColor::DarkGrey)
            },
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}

fn render_recounts(outcomes: &[RecountOutcome]) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "📊", "Recipe Results");

    if outcomes.is_empty() {
        let _ = writeln!(output, "{}", bright_yellow("No recipes found."));
        return output;
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["Recipe", "Result", "Pass Rate", "Changed"]));
    for outcome in outcomes {
        table.add_row(vec![
            Cell::new(&outcome.uid),
            color_coded_result_cell(&outcome.result),
            color_coded_rate_cell(outcome.result_rate),
            Cell::new(if outcome.changed { "yes" } else { "no" }),
        ]);
    }

    let _ = writeln!(output, "{table}");
    output
}
