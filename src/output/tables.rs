use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Pass rate of a recipe; -1 means no tasks were counted yet.
pub fn color_coded_rate_cell(rate: i32) -> Cell {
    if rate < 0 {
        return Cell::new("-").fg(TableColor::DarkGrey);
    }

    let text = format!("{rate}%");
    if rate > 80 {
        Cell::new(text).fg(TableColor::Green)
    } else if rate >= 50 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn color_coded_result_cell(result: &str) -> Cell {
    let color = match result {
        "pass" => TableColor::Green,
        "waived" => TableColor::Cyan,
        "warn" => TableColor::Yellow,
        "fail" | "panic" | "failinstall" | "aborted" => TableColor::Red,
        _ => TableColor::DarkGrey,
    };
    Cell::new(result).fg(color)
}

pub fn count_cell(count: usize) -> Cell {
    if count == 0 {
        Cell::new(count).fg(TableColor::DarkGrey)
    } else {
        Cell::new(count)
    }
}
