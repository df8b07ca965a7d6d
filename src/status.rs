use crate::records::{format_timestamp, RecordStore};

const HEADERS: [&str; 5] = ["SUBDOMAIN", "IP", "LAST CHECKED", "IP CHANGED", "SAME COUNT"];
const ABSENT: &str = "-";

/// Renders the store as a fixed-width table, one row per subdomain in name order.
pub(crate) fn render(store: &RecordStore) -> String {
    let rows: Vec<[String; 5]> = store
        .records()
        .map(|(subdomain, record)| {
            [
                subdomain.to_string(),
                record.ip.clone().unwrap_or_else(|| ABSENT.to_string()),
                format_timestamp(&record.last_checked_at).unwrap_or_else(|| ABSENT.to_string()),
                format_timestamp(&record.first_seen_at_this_ip)
                    .unwrap_or_else(|| ABSENT.to_string()),
                record.unchanged_count.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header = HEADERS.map(str::to_string);
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line = row
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}
