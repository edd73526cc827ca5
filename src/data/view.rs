//! The View Reconciler: derives the rendered row set from raw items.
//!
//! Everything here is synchronous and free of side effects (apart from the
//! once-per-column decode warning), so the same inputs always produce the
//! same rows.

use super::column_value::decode_people;
use super::sorting::{fallback_type, sort_items, UserNames};
use super::{Column, ColumnType, Item, ViewQuery, NO_STATUS, NO_USER};
use std::collections::{BTreeSet, HashMap};

/// Normalize a status cell's text to the label used by filters.
pub fn normalize_status(text: &str) -> &str {
    match text.trim() {
        "" | "-" | "undefined" | "null" => NO_STATUS,
        trimmed => trimmed,
    }
}

fn passes_column_filter(item: &Item, column: &Column, selected: &BTreeSet<String>) -> bool {
    match column.column_type {
        ColumnType::Status => selected.contains(normalize_status(item.text_for(&column.id))),
        ColumnType::Person | ColumnType::People => {
            let assigned = decode_people(&column.id, item.raw_value_for(&column.id));
            if assigned.is_empty() {
                selected.contains(NO_USER)
            } else {
                assigned.iter().any(|id| selected.contains(id))
            }
        }
        _ => {
            let text = item.text_for(&column.id);
            selected.iter().any(|needle| text.contains(needle.as_str()))
        }
    }
}

/// True if `user_id` is assigned in any person/people column of the item.
pub fn is_assigned_to(item: &Item, columns: &[Column], user_id: &str) -> bool {
    columns
        .iter()
        .filter(|c| c.column_type.is_person_like())
        .any(|c| {
            decode_people(&c.id, item.raw_value_for(&c.id))
                .iter()
                .any(|id| id == user_id)
        })
}

/// Filter and sort `items` for display.
///
/// Filters on columns missing from `columns` are inert. With no sort active
/// the input order is kept.
pub fn compute_view<'a>(
    items: &'a [Item],
    columns: &[Column],
    query: &ViewQuery,
    current_user_id: &str,
    users: &dyn UserNames,
) -> Vec<&'a Item> {
    let by_id: HashMap<&str, &Column> = columns.iter().map(|c| (c.id.as_str(), c)).collect();

    let active: Vec<(&Column, &BTreeSet<String>)> = query
        .filters
        .iter()
        .filter(|(_, selected)| !selected.is_empty())
        .filter_map(|(column_id, selected)| by_id.get(column_id.as_str()).map(|c| (*c, selected)))
        .collect();

    let mut rows: Vec<&Item> = items
        .iter()
        .filter(|item| {
            active
                .iter()
                .all(|(column, selected)| passes_column_filter(item, column, selected))
        })
        .filter(|item| !query.my_items_only || is_assigned_to(item, columns, current_user_id))
        .collect();

    if let Some(sort) = &query.sort {
        let column_type = by_id
            .get(sort.column_id.as_str())
            .map(|c| c.column_type.clone())
            .unwrap_or_else(|| fallback_type(&sort.column_id));
        sort_items(&mut rows, &sort.column_id, &column_type, sort.direction, users);
    }

    rows
}

/// Status labels available for filtering a status column: the column's
/// configured options in settings order, then labels only seen in the data.
pub fn status_options(items: &[Item], column: &Column) -> Vec<String> {
    let mut labels: Vec<String> = column
        .status_options()
        .into_iter()
        .map(|o| o.label)
        .collect();

    for item in items {
        let label = normalize_status(item.text_for(&column.id));
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

/// Person ids available for filtering a person/people column, in first-seen
/// order, followed by `NO_USER` when some item has nobody assigned.
pub fn people_options(items: &[Item], column_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let mut any_empty = false;

    for item in items {
        let assigned = decode_people(column_id, item.raw_value_for(column_id));
        if assigned.is_empty() {
            any_empty = true;
        }
        for id in assigned {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    if any_empty {
        ids.push(NO_USER.to_string());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnValue, SortDirection, SortSpec, User};
    use pretty_assertions::assert_eq;

    fn cell(column_id: &str, text: &str, value: Option<&str>) -> ColumnValue {
        ColumnValue {
            column_id: column_id.to_string(),
            text: Some(text.to_string()),
            value: value.map(String::from),
        }
    }

    fn make_item(id: &str, values: Vec<ColumnValue>) -> Item {
        Item {
            id: id.to_string(),
            name: format!("Item {}", id),
            board_id: "b1".to_string(),
            board_name: "Board".to_string(),
            group: None,
            column_values: values,
        }
    }

    fn query_with(column_id: &str, values: &[&str]) -> ViewQuery {
        let mut query = ViewQuery::default();
        query.filters.insert(
            column_id.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        query
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status(""), NO_STATUS);
        assert_eq!(normalize_status(" - "), NO_STATUS);
        assert_eq!(normalize_status("undefined"), NO_STATUS);
        assert_eq!(normalize_status("null"), NO_STATUS);
        assert_eq!(normalize_status("Done"), "Done");
    }

    #[test]
    fn test_filter_on_hidden_column_is_inert() {
        let items = vec![make_item("1", vec![cell("status", "Done", None)])];
        let columns: Vec<Column> = vec![];
        let users: HashMap<String, User> = HashMap::new();

        let rows = compute_view(&items, &columns, &query_with("status", &["Stuck"]), "", &users);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_empty_filter_set_is_inactive() {
        let items = vec![make_item("1", vec![cell("text", "hello", None)])];
        let columns = vec![Column::new("text", "Text", ColumnType::Text)];
        let users: HashMap<String, User> = HashMap::new();

        let rows = compute_view(&items, &columns, &query_with("text", &[]), "", &users);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_text_filter_is_case_sensitive_substring() {
        let items = vec![
            make_item("1", vec![cell("text", "Quarterly report", None)]),
            make_item("2", vec![cell("text", "quarterly plan", None)]),
            make_item("3", vec![cell("text", "Budget", None)]),
        ];
        let columns = vec![Column::new("text", "Text", ColumnType::Text)];
        let users: HashMap<String, User> = HashMap::new();

        let rows = compute_view(
            &items,
            &columns,
            &query_with("text", &["Quarter", "Bud"]),
            "",
            &users,
        );
        let ids: Vec<_> = rows.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_people_filter_with_no_user() {
        let assigned = r#"{"personsAndTeams":[{"id":10,"kind":"person"}]}"#;
        let items = vec![
            make_item("1", vec![cell("owner", "Ann", Some(assigned))]),
            make_item("2", vec![cell("owner", "", None)]),
            make_item("3", vec![cell("owner", "Bob", Some(r#"{"personsAndTeams":[{"id":11,"kind":"person"}]}"#))]),
        ];
        let columns = vec![Column::new("owner", "Owner", ColumnType::People)];
        let users: HashMap<String, User> = HashMap::new();

        let rows = compute_view(&items, &columns, &query_with("owner", &["10", NO_USER]), "", &users);
        let ids: Vec<_> = rows.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_my_items_only() {
        let items = vec![
            make_item("1", vec![cell("owner", "", Some(r#"{"personsAndTeams":[{"id":5,"kind":"person"}]}"#))]),
            make_item("2", vec![cell("owner", "", Some(r#"{"personsAndTeams":[{"id":6,"kind":"person"}]}"#))]),
            make_item("3", vec![cell("reviewer", "", Some(r#"{"id":5}"#))]),
        ];
        let columns = vec![
            Column::new("owner", "Owner", ColumnType::People),
            Column::new("reviewer", "Reviewer", ColumnType::Person),
        ];
        let users: HashMap<String, User> = HashMap::new();
        let query = ViewQuery {
            my_items_only: true,
            ..Default::default()
        };

        let rows = compute_view(&items, &columns, &query, "5", &users);
        let ids: Vec<_> = rows.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_sort_by_item_name_without_metadata() {
        let items = vec![
            make_item("10", vec![]),
            make_item("9", vec![]),
            make_item("2", vec![]),
        ];
        let users: HashMap<String, User> = HashMap::new();
        let query = ViewQuery {
            sort: Some(SortSpec {
                column_id: "name".to_string(),
                direction: SortDirection::Asc,
            }),
            ..Default::default()
        };

        let rows = compute_view(&items, &[], &query, "", &users);
        let ids: Vec<_> = rows.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "9", "10"]);
    }

    #[test]
    fn test_status_options_merge_data_labels() {
        let column = Column {
            settings_raw: Some(r#"{"labels":{"0":"Working on it","1":"Done"}}"#.to_string()),
            ..Column::new("status", "Status", ColumnType::Status)
        };
        let items = vec![
            make_item("1", vec![cell("status", "Done", None)]),
            make_item("2", vec![cell("status", "Legacy", None)]),
            make_item("3", vec![cell("status", "", None)]),
        ];

        assert_eq!(
            status_options(&items, &column),
            vec!["Working on it", "Done", NO_STATUS, "Legacy"]
        );
    }

    #[test]
    fn test_people_options_first_seen() {
        let items = vec![
            make_item("1", vec![cell("owner", "", Some(r#"{"personsAndTeams":[{"id":2,"kind":"person"},{"id":1,"kind":"person"}]}"#))]),
            make_item("2", vec![cell("owner", "", None)]),
            make_item("3", vec![cell("owner", "", Some(r#"{"personsAndTeams":[{"id":1,"kind":"person"}]}"#))]),
        ];
        assert_eq!(people_options(&items, "owner"), vec!["2", "1", NO_USER]);
    }
}
