use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::{
    api::models::{MeterCounter, RawReading, ReadingType},
    core::meter_state::SeriesId,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

#[must_use]
pub fn build_counters_table(counters: &[MeterCounter]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Counter", "Type", "Reading", "Primary", "Unit", "Latest", "At"]);
    for counter in counters {
        let latest = counter
            .latest_value
            .as_ref()
            .and_then(|value| value.parse().ok())
            .map_or_else(String::new, |value| format!("{value:.3}"));
        table.add_row(vec![
            Cell::new(&counter.meter_counter_id),
            Cell::new(counter.counter_type.as_str()).fg(if counter.counter_type.is_consumable() {
                Color::Green
            } else {
                Color::DarkYellow
            }),
            Cell::new(format!("{:?}", counter.reading_type)).fg(match counter.reading_type {
                ReadingType::Counter => Color::Magenta,
                ReadingType::Consumption => Color::Cyan,
            }),
            Cell::new(if counter.is_primary { "yes" } else { "" }),
            Cell::new(counter.unit.as_deref().unwrap_or_default()),
            Cell::new(latest).set_alignment(CellAlignment::Right),
            Cell::new(counter.latest_timestamp.as_deref().unwrap_or_default())
                .add_attribute(Attribute::Dim),
        ]);
    }
    table
}

#[must_use]
pub fn build_readings_table(readings: &[RawReading]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Counter", "Timestamp", "Value"]);
    for reading in readings {
        let value = reading.value.as_ref().and_then(|value| value.parse().ok());
        table.add_row(vec![
            Cell::new(&reading.meter_counter_id),
            Cell::new(reading.timestamp.as_deref().unwrap_or_default()),
            Cell::new(value.map_or_else(String::new, |value| format!("{value:.3}")))
                .set_alignment(CellAlignment::Right)
                .fg(if value.is_none() { Color::Red } else { Color::Reset }),
        ]);
    }
    table
}

#[must_use]
pub fn build_backfill_table(results: &[(SeriesId, usize)]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Series", "Imported records"]);
    for (series_id, n_records) in results {
        table.add_row(vec![
            Cell::new(series_id),
            Cell::new(n_records).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
