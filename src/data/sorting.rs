//! Comparators for sorting items by a single typed column.
//!
//! This module is the single source of truth for column ordering; the view
//! reconciler only picks the comparator and applies the direction.

use super::column_value::{decode_date, decode_link, decode_number, decode_people};
use super::{ColumnType, Item, SortDirection, User, NAME_COLUMN};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// Resolves user ids to display names for person sorting.
pub trait UserNames {
    fn display_name(&self, user_id: &str) -> Option<&str>;
}

impl UserNames for HashMap<String, User> {
    fn display_name(&self, user_id: &str) -> Option<&str> {
        self.get(user_id).map(|u| u.name.as_str())
    }
}

impl UserNames for HashMap<String, String> {
    fn display_name(&self, user_id: &str) -> Option<&str> {
        self.get(user_id).map(String::as_str)
    }
}

enum Chunk {
    Digits(String),
    Text(String),
}

fn next_chunk(chars: &mut Peekable<Chars<'_>>) -> Option<Chunk> {
    let first = *chars.peek()?;
    let digits = first.is_ascii_digit();
    let mut buf = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() != digits {
            break;
        }
        buf.push(c);
        chars.next();
    }
    Some(if digits { Chunk::Digits(buf) } else { Chunk::Text(buf) })
}

fn compare_digits(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
}

fn compare_folded(a: &str, b: &str) -> Ordering {
    let fold = |s: &str| s.chars().flat_map(char::to_lowercase).collect::<String>();
    fold(a).cmp(&fold(b))
}

/// Numeric-aware string comparison: digit runs compare by value, so
/// "Item 9" sorts before "Item 10". Letters compare case-insensitively, with
/// case only breaking ties.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        let ordering = match (next_chunk(&mut left), next_chunk(&mut right)) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Chunk::Digits(x)), Some(Chunk::Digits(y))) => compare_digits(&x, &y),
            (Some(Chunk::Digits(_)), Some(Chunk::Text(_))) => Ordering::Less,
            (Some(Chunk::Text(_)), Some(Chunk::Digits(_))) => Ordering::Greater,
            (Some(Chunk::Text(x)), Some(Chunk::Text(y))) => compare_folded(&x, &y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    // Equal modulo case and leading zeros: fall back to a total order.
    a.cmp(b)
}

fn first_person_name<'a>(item: &Item, column_id: &str, users: &'a dyn UserNames) -> &'a str {
    decode_people(column_id, item.raw_value_for(column_id))
        .first()
        .and_then(|id| users.display_name(id))
        .unwrap_or("")
}

fn link_sort_key(item: &Item, column_id: &str) -> String {
    let text = item.text_for(column_id);
    match decode_link(item.raw_value_for(column_id)) {
        Some(link) => link
            .url
            .filter(|u| !u.is_empty())
            .or(link.text.filter(|t| !t.is_empty()))
            .unwrap_or_else(|| text.to_string()),
        None => text.to_string(),
    }
}

/// Compare two items by one column, ascending.
pub fn compare_by_column(
    a: &Item,
    b: &Item,
    column_id: &str,
    column_type: &ColumnType,
    users: &dyn UserNames,
) -> Ordering {
    match column_type {
        ColumnType::Numbers => {
            let x = decode_number(a.raw_value_for(column_id), a.text_for(column_id));
            let y = decode_number(b.raw_value_for(column_id), b.text_for(column_id));
            x.total_cmp(&y)
        }
        ColumnType::Date => {
            let x = decode_date(a.raw_value_for(column_id), a.text_for(column_id));
            let y = decode_date(b.raw_value_for(column_id), b.text_for(column_id));
            x.cmp(&y)
        }
        ColumnType::Person | ColumnType::People => natural_cmp(
            first_person_name(a, column_id, users),
            first_person_name(b, column_id, users),
        ),
        ColumnType::Link => natural_cmp(&link_sort_key(a, column_id), &link_sort_key(b, column_id)),
        _ => natural_cmp(a.text_for(column_id), b.text_for(column_id)),
    }
}

/// Stable sort of item references by one column in the given direction.
pub fn sort_items(
    items: &mut [&Item],
    column_id: &str,
    column_type: &ColumnType,
    direction: SortDirection,
    users: &dyn UserNames,
) {
    items.sort_by(|a, b| {
        let ordering = compare_by_column(a, b, column_id, column_type, users);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Column type used for a sort key that has no column metadata.
pub fn fallback_type(column_id: &str) -> ColumnType {
    match column_id {
        NAME_COLUMN => ColumnType::ItemName,
        _ => ColumnType::Text,
    }
}
