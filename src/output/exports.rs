use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use crate::config::OutputFormat;
use crate::inventory::{GroupRow, TestRow};
use crate::results::RecountOutcome;
use crate::schedule::ArchSelection;
use crate::sync::SyncReport;

/// A record that can be written as one CSV line.
pub trait CsvRecord {
    const HEADER: &'static [&'static str];

    fn fields(&self) -> Vec<String>;
}

/// Exports command results as JSON or CSV.
///
/// The summary format is rendered by the `summary` module instead.
pub fn export_records<T: Serialize + CsvRecord>(
    records: &[T],
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Csv => export_csv(records, output),
        OutputFormat::Json | OutputFormat::Summary => export_json(records, pretty, output),
    }
}

fn export_json<T: Serialize + ?Sized>(value: &T, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_csv<T: CsvRecord>(records: &[T], output: &mut dyn Write) -> Result<()> {
    writeln!(output, "{}", T::HEADER.join(","))?;
    for record in records {
        let line: Vec<String> = record.fields().iter().map(|f| csv_field(f)).collect();
        writeln!(output, "{}", line.join(","))?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional(value: Option<&String>) -> String {
    value.cloned().unwrap_or_default()
}

impl CsvRecord for TestRow {
    const HEADER: &'static [&'static str] = &[
        "Name",
        "Repository",
        "Folder",
        "Owner",
        "Type",
        "Time",
        "Enabled",
        "Groups",
        "Dependencies",
        "Last Commit",
        "Version",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            optional(self.repository.as_ref()),
            optional(self.folder.as_ref()),
            optional(self.owner.as_ref()),
            optional(self.kind.as_ref()),
            optional(self.time.as_ref()),
            self.enabled.to_string(),
            self.groups.join(" "),
            self.dependencies.join(" "),
            optional(self.last_commit.as_ref()),
            optional(self.version.as_ref()),
        ]
    }
}

impl CsvRecord for GroupRow {
    const HEADER: &'static [&'static str] = &["Group", "Tests"];

    fn fields(&self) -> Vec<String> {
        vec![self.name.clone(), self.tests.to_string()]
    }
}

impl CsvRecord for RecountOutcome {
    const HEADER: &'static [&'static str] = &["Recipe", "Result", "Result Rate", "Changed"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.uid.clone(),
            self.result.clone(),
            self.result_rate.to_string(),
            self.changed.to_string(),
        ]
    }
}

impl CsvRecord for SyncReport {
    const HEADER: &'static [&'static str] = &[
        "Repository",
        "URL",
        "Refreshed",
        "Scanned",
        "Created",
        "Updated",
        "Unchanged",
        "Skipped",
        "Merged",
        "Commits Recorded",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.repository.clone(),
            self.url.clone(),
            self.refreshed.to_string(),
            self.reconcile.scanned.to_string(),
            self.reconcile.created.to_string(),
            self.reconcile.updated.to_string(),
            self.reconcile.unchanged.to_string(),
            self.reconcile.skipped.to_string(),
            self.reconcile.merged.to_string(),
            self.history.recorded.to_string(),
        ]
    }
}

impl CsvRecord for ArchSelection {
    const HEADER: &'static [&'static str] = &["Weekday", "Architectures", "Fallback"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.weekday.to_string(),
            self.archs.join(" "),
            self.fallback.to_string(),
        ]
    }
}
