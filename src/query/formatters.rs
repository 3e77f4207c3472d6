use crate::repository::{CursorRecord, TrackingRecord, TrackingStats};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_wallets(records: &[TrackingRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_wallets_table(records),
        OutputFormat::Json => format_wallets_json(records),
        OutputFormat::Csv => format_wallets_csv(records),
    }
}

fn format_wallets_table(records: &[TrackingRecord]) -> String {
    if records.is_empty() {
        return "No tracked wallets.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Subscriber", "Wallet", "Name"]);

    for record in records {
        table.add_row(vec![
            Cell::new(&record.subscriber_id),
            Cell::new(record.wallet.to_checksum(None)),
            Cell::new(&record.name),
        ]);
    }

    table.to_string()
}

fn format_wallets_json(records: &[TrackingRecord]) -> String {
    let json_records: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "subscriber_id": r.subscriber_id,
                "wallet": r.wallet.to_checksum(None),
                "name": r.name,
            })
        })
        .collect();

    serde_json::to_string_pretty(&json_records).unwrap_or_else(|_| "[]".to_string())
}

fn format_wallets_csv(records: &[TrackingRecord]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record(["subscriber_id", "wallet", "name"]);
    for record in records {
        let wallet = record.wallet.to_checksum(None);
        let _ = wtr.write_record([
            record.subscriber_id.as_str(),
            wallet.as_str(),
            record.name.as_str(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_cursors(cursors: &[CursorRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if cursors.is_empty() {
                return "No stored cursors.".to_string();
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Network", "Last Scanned Block", "Updated At (unix)"]);

            for cursor in cursors {
                table.add_row(vec![
                    Cell::new(&cursor.network),
                    Cell::new(cursor.last_scanned_block),
                    Cell::new(cursor.updated_at),
                ]);
            }

            table.to_string()
        }
        OutputFormat::Json => {
            let json_cursors: Vec<_> = cursors
                .iter()
                .map(|c| {
                    json!({
                        "network": c.network,
                        "last_scanned_block": c.last_scanned_block,
                        "updated_at": c.updated_at,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_cursors).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["network", "last_scanned_block", "updated_at"]);
            for cursor in cursors {
                let _ = wtr.write_record([
                    cursor.network.clone(),
                    cursor.last_scanned_block.to_string(),
                    cursor.updated_at.to_string(),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_stats(stats: &TrackingStats, format: &OutputFormat) -> String {
    let rows = [
        ("subscribers", stats.subscribers),
        ("tracked_rows", stats.tracked_rows),
        ("distinct_wallets", stats.distinct_wallets),
        ("cursors", stats.cursors),
    ];

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![Cell::new("Subscribers"), Cell::new(stats.subscribers)]);
            table.add_row(vec![
                Cell::new("Tracked Entries"),
                Cell::new(stats.tracked_rows),
            ]);
            table.add_row(vec![
                Cell::new("Distinct Wallets"),
                Cell::new(stats.distinct_wallets),
            ]);
            table.add_row(vec![Cell::new("Stored Cursors"), Cell::new(stats.cursors)]);

            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "subscribers": stats.subscribers,
            "tracked_rows": stats.tracked_rows,
            "distinct_wallets": stats.distinct_wallets,
            "cursors": stats.cursors,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            for (metric, value) in rows {
                let _ = wtr.write_record([metric, value.to_string().as_str()]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn records() -> Vec<TrackingRecord> {
        vec![TrackingRecord {
            subscriber_id: "42".to_string(),
            wallet: address!("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
            name: "Tether".to_string(),
        }]
    }

    #[test]
    fn csv_output_has_header_and_checksummed_wallet() {
        let csv = format_wallets(&records(), &OutputFormat::Csv);
        let mut lines = csv.lines();

        assert_eq!(lines.next(), Some("subscriber_id,wallet,name"));
        assert_eq!(
            lines.next(),
            Some("42,0xdAC17F958D2ee523a2206206994597C13D831ec7,Tether")
        );
    }

    #[test]
    fn json_output_lists_records() {
        let json = format_wallets(&records(), &OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["name"], "Tether");
        assert!(matches!(OutputFormat::from("JSON"), OutputFormat::Json));
    }

    #[test]
    fn empty_tables_say_so() {
        assert_eq!(
            format_wallets(&[], &OutputFormat::Table),
            "No tracked wallets."
        );
        assert_eq!(format_cursors(&[], &OutputFormat::Table), "No stored cursors.");
    }
}
