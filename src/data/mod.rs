pub mod column_value;
pub mod sorting;
pub mod view;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Label used for status cells with no value
pub const NO_STATUS: &str = "No status";

/// Filter value selecting person cells with nobody assigned
pub const NO_USER: &str = "No user";

/// Pseudo column id for the item's own name
pub const NAME_COLUMN: &str = "name";

/// Pseudo column id for the item's originating board
pub const BOARD_COLUMN: &str = "board";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub title: String,
}

/// Platform column type.
///
/// Unrecognized type strings are kept verbatim in `Other` so they still
/// render (and filter) as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnType {
    Status,
    Person,
    People,
    Date,
    Numbers,
    Link,
    Text,
    ItemName,
    BoardLink,
    Other(String),
}

impl ColumnType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "status" | "color" => Self::Status,
            "person" => Self::Person,
            "people" | "multiple-person" => Self::People,
            "date" => Self::Date,
            "numbers" | "numeric" => Self::Numbers,
            "link" => Self::Link,
            "text" => Self::Text,
            "name" | "item_name" => Self::ItemName,
            "board_relation" | "board_link" => Self::BoardLink,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::Person => "person",
            Self::People => "people",
            Self::Date => "date",
            Self::Numbers => "numbers",
            Self::Link => "link",
            Self::Text => "text",
            Self::ItemName => "item_name",
            Self::BoardLink => "board_link",
            Self::Other(raw) => raw,
        }
    }

    /// Person and people columns both carry assignee lists
    pub fn is_person_like(&self) -> bool {
        matches!(self, Self::Person | Self::People)
    }
}

impl From<String> for ColumnType {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<ColumnType> for String {
    fn from(column_type: ColumnType) -> Self {
        column_type.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub settings_raw: Option<String>,
}

/// One selectable option of a status column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOption {
    pub id: String,
    pub label: String,
    /// Text sent back in a `{"label": ...}` mutation payload
    pub value: String,
    pub color: String,
}

#[derive(Debug, Deserialize)]
struct StatusSettings {
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    labels_colors: BTreeMap<String, StatusColor>,
}

#[derive(Debug, Deserialize)]
struct StatusColor {
    color: Option<String>,
}

const CLEAR_STATUS_COLOR: &str = "#c4c4c4";

impl Column {
    pub fn new(id: &str, title: &str, column_type: ColumnType) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            column_type,
            settings_raw: None,
        }
    }

    /// Parse the status options out of `settings_raw`.
    ///
    /// Options are ordered by their numeric key and always end with the
    /// synthetic "clear" option. Non-status columns and unparseable settings
    /// yield only the clear option.
    pub fn status_options(&self) -> Vec<StatusOption> {
        let mut options = Vec::new();

        if self.column_type == ColumnType::Status {
            if let Some(raw) = self.settings_raw.as_deref() {
                match serde_json::from_str::<StatusSettings>(raw) {
                    Ok(settings) => {
                        let mut keyed: Vec<(String, String)> =
                            settings.labels.into_iter().collect();
                        keyed.sort_by_key(|(key, _)| key.parse::<i64>().unwrap_or(i64::MAX));

                        for (key, label) in keyed {
                            if label.trim().is_empty() {
                                continue;
                            }
                            let color = settings
                                .labels_colors
                                .get(&key)
                                .and_then(|c| c.color.clone())
                                .unwrap_or_else(|| CLEAR_STATUS_COLOR.to_string());
                            options.push(StatusOption {
                                id: key,
                                value: label.clone(),
                                label,
                                color,
                            });
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Unparseable status settings on column {}: {}", self.id, e);
                    }
                }
            }
        }

        options.push(StatusOption {
            id: "clear".to_string(),
            label: NO_STATUS.to_string(),
            value: String::new(),
            color: CLEAR_STATUS_COLOR.to_string(),
        });
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnValue {
    pub column_id: String,
    pub text: Option<String>,
    /// Raw JSON document as delivered by the platform
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub board_id: String,
    pub board_name: String,
    pub group: Option<Group>,
    pub column_values: Vec<ColumnValue>,
}

impl Item {
    pub fn value_for(&self, column_id: &str) -> Option<&ColumnValue> {
        self.column_values.iter().find(|v| v.column_id == column_id)
    }

    /// Display text of a cell; the name and board pseudo columns resolve
    /// to the item's own fields when the platform sent no value for them.
    pub fn text_for(&self, column_id: &str) -> &str {
        if let Some(text) = self.value_for(column_id).and_then(|v| v.text.as_deref()) {
            return text;
        }
        match column_id {
            NAME_COLUMN => &self.name,
            BOARD_COLUMN => &self.board_name,
            _ => "",
        }
    }

    pub fn raw_value_for(&self, column_id: &str) -> Option<&str> {
        self.value_for(column_id).and_then(|v| v.value.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub column_id: String,
    pub direction: SortDirection,
}

/// Per-column filter selections, keyed by column id
pub type Filters = BTreeMap<String, BTreeSet<String>>;

/// Everything the View Reconciler needs besides the data itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub filters: Filters,
    pub sort: Option<SortSpec>,
    pub my_items_only: bool,
}

/// The persisted view preferences.
///
/// Board and column selections are ordered sets: insertion order is kept
/// and duplicates are rejected by the mutators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    pub selected_board_ids: Vec<String>,
    pub selected_column_ids: Vec<String>,
    pub active_filters: Filters,
    pub sort: Option<SortSpec>,
    pub panel_open: bool,
    pub my_items_only: bool,
}

impl ViewState {
    pub fn set_boards<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_board_ids = dedup_ordered(ids);
    }

    pub fn set_columns<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_column_ids = dedup_ordered(ids);
    }

    /// Returns true if the board is selected after the toggle
    pub fn toggle_board(&mut self, id: &str) -> bool {
        toggle_ordered(&mut self.selected_board_ids, id)
    }

    /// Returns true if the column is selected after the toggle
    pub fn toggle_column(&mut self, id: &str) -> bool {
        toggle_ordered(&mut self.selected_column_ids, id)
    }

    pub fn query(&self) -> ViewQuery {
        ViewQuery {
            filters: self.active_filters.clone(),
            sort: self.sort.clone(),
            my_items_only: self.my_items_only,
        }
    }
}

fn dedup_ordered<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        let id = id.into();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

fn toggle_ordered(list: &mut Vec<String>, id: &str) -> bool {
    if let Some(pos) = list.iter().position(|existing| existing == id) {
        list.remove(pos);
        false
    } else {
        list.push(id.to_string());
        true
    }
}

/// Columns of one selected board, in the order the platform lists them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumns {
    pub board: Board,
    pub columns: Vec<Column>,
}

/// A board whose items could not be fetched in a partial refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardFailure {
    pub board_id: String,
    pub message: String,
}

/// Result of one aggregation cycle, replaced as a whole on every refresh
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub columns_by_board: Vec<BoardColumns>,
    /// Unified column metadata, unique by id, last seen wins
    pub columns: Vec<Column>,
    pub items: Vec<Item>,
    pub failed_boards: Vec<BoardFailure>,
    pub fetched_at: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            columns_by_board: Vec::new(),
            columns: Vec::new(),
            items: Vec::new(),
            failed_boards: Vec::new(),
            fetched_at: DateTime::UNIX_EPOCH,
        }
    }
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            fetched_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Insert or replace a column in the unified map, keeping first-seen position
    pub fn merge_column(&mut self, column: Column) {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.id == column.id) {
            *existing = column;
        } else {
            self.columns.push(column);
        }
    }
}
