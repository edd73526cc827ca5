//! Plain-text table output for the command line.

use crate::data::{Column, ColumnType, Item};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Cells wider than this are cut with an ellipsis
pub const MAX_CELL_WIDTH: usize = 40;

const SEP: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if display_width(text) <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > max_width - 1 {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = " ".repeat(width.saturating_sub(display_width(text)));
    match align {
        Align::Left => format!("{text}{fill}"),
        Align::Right => format!("{fill}{text}"),
    }
}

/// Render rows as an aligned table: item name, board, then `columns`.
pub fn render_table(rows: &[&Item], columns: &[Column]) -> String {
    let mut headers = vec!["Item".to_string(), "Board".to_string()];
    headers.extend(columns.iter().map(|c| c.title.clone()));

    let mut aligns = vec![Align::Left, Align::Left];
    aligns.extend(columns.iter().map(|c| match c.column_type {
        ColumnType::Numbers => Align::Right,
        _ => Align::Left,
    }));

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|item| {
            let mut row = vec![
                truncate_with_ellipsis(&item.name, MAX_CELL_WIDTH),
                truncate_with_ellipsis(&item.board_name, MAX_CELL_WIDTH),
            ];
            row.extend(
                columns
                    .iter()
                    .map(|c| truncate_with_ellipsis(item.text_for(&c.id), MAX_CELL_WIDTH)),
            );
            row
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }

    let format_line = |row: &[String]| -> String {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(idx, cell)| pad(cell, widths[idx], aligns[idx]))
            .collect();
        line.join(SEP).trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&format_line(&headers[..]));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join(SEP));
    out.push('\n');
    for row in &cells {
        out.push_str(&format_line(&row[..]));
        out.push('\n');
    }
    out
}
