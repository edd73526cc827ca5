//! GraphQL documents for every call the viewer makes.
//!
//! Pure builders only: no I/O, caching, or retries.

use serde::Serialize;
use serde_json::{json, Value};

/// Maximum items fetched per board; larger boards are silently truncated.
pub const ITEMS_PAGE_SIZE: usize = 500;

/// Maximum boards listed for selection
pub const BOARDS_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlRequest {
    pub query: String,
    pub variables: Value,
}

impl GraphQlRequest {
    fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }

    /// Operation name, e.g. `ListItems` for `query ListItems(...) { ... }`
    pub fn operation_name(&self) -> Option<&str> {
        let mut words = self.query.split_whitespace();
        match words.next()? {
            "query" | "mutation" => {}
            _ => return None,
        }
        let name = words.next()?;
        let end = name.find(|c: char| c == '(' || c == '{').unwrap_or(name.len());
        Some(&name[..end]).filter(|n| !n.is_empty())
    }
}

pub fn list_boards() -> GraphQlRequest {
    GraphQlRequest::new(
        format!(
            "query ListBoards {{ boards(limit: {}) {{ id name }} }}",
            BOARDS_LIMIT
        ),
        json!({}),
    )
}

pub fn list_columns() -> GraphQlRequest {
    GraphQlRequest::new(
        format!(
            "query ListColumns {{ boards(limit: {}) {{ id name columns {{ id title type settings_str }} }} }}",
            BOARDS_LIMIT
        ),
        json!({}),
    )
}

pub fn list_items(board_id: &str, column_ids: &[String]) -> GraphQlRequest {
    let query = format!(
        r#"query ListItems($boardIds: [ID!], $columnIds: [String!]) {{
  boards(ids: $boardIds) {{
    id
    name
    items_page(limit: {}) {{
      items {{
        id
        name
        board {{ id name }}
        group {{ id title }}
        column_values(ids: $columnIds) {{ id text value }}
      }}
    }}
  }}
}}"#,
        ITEMS_PAGE_SIZE
    );

    GraphQlRequest::new(
        query,
        json!({
            "boardIds": [board_id],
            "columnIds": column_ids,
        }),
    )
}

const CHANGE_COLUMN_VALUE: &str = r#"mutation SetColumnValue($boardId: ID!, $itemId: ID!, $columnId: String!, $value: JSON!) {
  change_column_value(board_id: $boardId, item_id: $itemId, column_id: $columnId, value: $value) { id }
}"#;

/// Rename an item through its `name` column.
///
/// The platform wants a text column value as a JSON-encoded string, and the
/// `JSON!` variable is itself a string, so the name ends up encoded twice.
pub fn rename_item(board_id: &str, item_id: &str, new_name: &str) -> GraphQlRequest {
    let column_value = Value::String(new_name.to_string()).to_string();

    GraphQlRequest::new(
        CHANGE_COLUMN_VALUE.replacen("SetColumnValue", "RenameItem", 1),
        json!({
            "boardId": board_id,
            "itemId": item_id,
            "columnId": "name",
            "value": column_value,
        }),
    )
}

/// Change any column. `value_payload` must already match the column type's
/// schema (see `status_label_payload` and `people_payload`).
pub fn set_column_value(
    board_id: &str,
    item_id: &str,
    column_id: &str,
    value_payload: &Value,
) -> GraphQlRequest {
    GraphQlRequest::new(
        CHANGE_COLUMN_VALUE,
        json!({
            "boardId": board_id,
            "itemId": item_id,
            "columnId": column_id,
            "value": value_payload.to_string(),
        }),
    )
}

pub fn get_user(user_id: &str) -> GraphQlRequest {
    GraphQlRequest::new(
        "query GetUser($ids: [ID!]) { users(ids: $ids) { id name photo_thumb_small email } }",
        json!({ "ids": [user_id] }),
    )
}

pub fn status_label_payload(label: &str) -> Value {
    json!({ "label": label })
}

pub fn people_payload(person_ids: &[String]) -> Value {
    let persons: Vec<Value> = person_ids
        .iter()
        .map(|id| {
            let id = id.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(id.as_str()));
            json!({ "id": id, "kind": "person" })
        })
        .collect();
    json!({ "personsAndTeams": persons })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(list_boards().operation_name(), Some("ListBoards"));
        assert_eq!(list_columns().operation_name(), Some("ListColumns"));
        assert_eq!(list_items("1", &[]).operation_name(), Some("ListItems"));
        assert_eq!(rename_item("1", "2", "x").operation_name(), Some("RenameItem"));
        assert_eq!(
            set_column_value("1", "2", "c", &json!({})).operation_name(),
            Some("SetColumnValue")
        );
        assert_eq!(get_user("1").operation_name(), Some("GetUser"));
    }

    #[test]
    fn test_list_items_variables_and_page_size() {
        let request = list_items("b1", &["status".to_string(), "owner".to_string()]);
        assert!(request.query.contains("items_page(limit: 500)"));
        assert!(request.query.contains("column_values(ids: $columnIds)"));
        assert_eq!(request.variables["boardIds"], json!(["b1"]));
        assert_eq!(request.variables["columnIds"], json!(["status", "owner"]));
    }

    #[test]
    fn test_rename_is_double_encoded() {
        let request = rename_item("b1", "i1", "Say \"hi\"");
        assert_eq!(request.variables["columnId"], "name");
        assert_eq!(request.variables["value"], json!("\"Say \\\"hi\\\"\""));

        // Decoding the variable once yields the JSON string the column expects.
        let once: String = serde_json::from_value(request.variables["value"].clone()).unwrap();
        let twice: String = serde_json::from_str(&once).unwrap();
        assert_eq!(twice, "Say \"hi\"");
    }

    #[test]
    fn test_set_column_value_encodes_payload() {
        let request = set_column_value("b1", "i1", "status", &status_label_payload("Done"));
        assert_eq!(request.variables["value"], json!(r#"{"label":"Done"}"#));
    }

    #[test]
    fn test_people_payload() {
        let payload = people_payload(&["12".to_string()]);
        assert_eq!(payload, json!({ "personsAndTeams": [{ "id": 12, "kind": "person" }] }));
    }
}
