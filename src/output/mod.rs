mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::{export_records, CsvRecord};
pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold, styled_result};
pub use summary::{print_groups, print_recounts, print_schedule, print_sync_summary, print_tests};

/// Prints the tttt banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🧪 tttt"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Test metadata tracker")
    );
}
