//! Typed calls against the platform API.
//!
//! Every call builds its document with `queries`, sends it through the
//! injected `Transport`, and runs under a `RetryPolicy`.

use crate::data::{Board, BoardColumns, Column, ColumnType, ColumnValue, Group, Item, User};
use crate::integrations::queries::{self, GraphQlRequest};
use crate::integrations::retry::{self, RetryPolicies, RetryPolicy};
use crate::integrations::{ApiError, Transport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

// Type-safe API response structures
#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
    // Some rejections (rate limits among them) come back in this flat form
    error_message: Option<String>,
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
    #[serde(default)]
    extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct ErrorExtensions {
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BoardsData {
    boards: Vec<BoardNode>,
}

#[derive(Debug, Deserialize)]
struct BoardNode {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ColumnsData {
    boards: Vec<BoardColumnsNode>,
}

#[derive(Debug, Deserialize)]
struct BoardColumnsNode {
    id: String,
    name: String,
    #[serde(default)]
    columns: Vec<ColumnNode>,
}

#[derive(Debug, Deserialize)]
struct ColumnNode {
    id: String,
    title: String,
    #[serde(rename = "type")]
    column_type: String,
    settings_str: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemsData {
    boards: Vec<ItemsBoardNode>,
}

#[derive(Debug, Deserialize)]
struct ItemsBoardNode {
    id: String,
    name: String,
    items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    #[serde(default)]
    items: Vec<ItemNode>,
}

#[derive(Debug, Deserialize)]
struct ItemNode {
    id: String,
    name: String,
    board: Option<BoardNode>,
    group: Option<GroupNode>,
    #[serde(default)]
    column_values: Vec<ColumnValueNode>,
}

#[derive(Debug, Deserialize)]
struct GroupNode {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ColumnValueNode {
    id: String,
    text: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersData {
    users: Vec<UserNode>,
}

#[derive(Debug, Deserialize)]
struct UserNode {
    id: String,
    name: String,
    photo_thumb_small: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    change_column_value: Option<ChangedItem>,
}

#[derive(Debug, Deserialize)]
struct ChangedItem {
    #[allow(dead_code)]
    id: String,
}

/// Turn a raw response body into `T`, treating an `errors` list as failure.
fn decode_response<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, ApiError> {
    let response: GraphQlResponse<T> =
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    if !response.errors.is_empty() || response.error_message.is_some() {
        let mut messages: Vec<String> = Vec::new();
        let mut codes: Vec<String> = Vec::new();
        for entry in response.errors {
            if let Some(code) = entry.extensions.and_then(|x| x.code) {
                codes.push(code);
            }
            messages.push(entry.message);
        }
        if let Some(message) = response.error_message {
            messages.push(message);
        }
        if let Some(code) = response.error_code {
            codes.push(code);
        }
        return Err(ApiError::GraphQl { messages, codes });
    }

    response
        .data
        .ok_or_else(|| ApiError::Decode("response carried neither data nor errors".to_string()))
}

#[derive(Clone)]
pub struct PlatformClient {
    transport: Arc<dyn Transport>,
    policies: RetryPolicies,
}

impl PlatformClient {
    pub fn new(transport: Arc<dyn Transport>, policies: RetryPolicies) -> Self {
        Self {
            transport,
            policies,
        }
    }

    async fn run<T: DeserializeOwned>(
        &self,
        policy: &RetryPolicy,
        request: GraphQlRequest,
    ) -> Result<T, ApiError> {
        let label = request.operation_name().unwrap_or("request").to_string();
        let transport = &self.transport;
        let request = &request;

        retry::execute(policy, &label, move || async move {
            let body = transport.post(request).await?;
            decode_response::<T>(body)
        })
        .await
    }

    pub async fn list_boards(&self) -> Result<Vec<Board>, ApiError> {
        let data: BoardsData = self.run(&self.policies.default, queries::list_boards()).await?;
        Ok(data
            .boards
            .into_iter()
            .map(|b| Board { id: b.id, name: b.name })
            .collect())
    }

    pub async fn list_columns(&self) -> Result<Vec<BoardColumns>, ApiError> {
        let data: ColumnsData = self.run(&self.policies.default, queries::list_columns()).await?;
        Ok(data
            .boards
            .into_iter()
            .map(|b| BoardColumns {
                board: Board { id: b.id, name: b.name },
                columns: b
                    .columns
                    .into_iter()
                    .map(|c| Column {
                        id: c.id,
                        title: c.title,
                        column_type: ColumnType::parse(&c.column_type),
                        settings_raw: c.settings_str,
                    })
                    .collect(),
            })
            .collect())
    }

    /// Items of one board, tagged with that board. Items whose `board` field
    /// is missing fall back to the board the page was listed under.
    pub async fn list_items(&self, board_id: &str, column_ids: &[String]) -> Result<Vec<Item>, ApiError> {
        let data: ItemsData = self
            .run(&self.policies.items, queries::list_items(board_id, column_ids))
            .await?;

        let items = data
            .boards
            .into_iter()
            .flat_map(|board| {
                let page_board = Board {
                    id: board.id,
                    name: board.name,
                };
                board.items_page.items.into_iter().map(move |node| {
                    let origin = node
                        .board
                        .map(|b| Board { id: b.id, name: b.name })
                        .unwrap_or_else(|| page_board.clone());
                    Item {
                        id: node.id,
                        name: node.name,
                        board_id: origin.id,
                        board_name: origin.name,
                        group: node.group.map(|g| Group {
                            id: g.id,
                            title: g.title,
                        }),
                        column_values: node
                            .column_values
                            .into_iter()
                            .map(|v| ColumnValue {
                                column_id: v.id,
                                text: v.text,
                                value: v.value,
                            })
                            .collect(),
                    }
                })
            })
            .collect();

        Ok(items)
    }

    async fn change(&self, request: GraphQlRequest) -> Result<(), ApiError> {
        let data: ChangeData = self.run(&self.policies.default, request).await?;
        match data.change_column_value {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound("item not changed".to_string())),
        }
    }

    pub async fn rename_item(&self, board_id: &str, item_id: &str, new_name: &str) -> Result<(), ApiError> {
        self.change(queries::rename_item(board_id, item_id, new_name)).await
    }

    pub async fn set_column_value(
        &self,
        board_id: &str,
        item_id: &str,
        column_id: &str,
        value_payload: &serde_json::Value,
    ) -> Result<(), ApiError> {
        self.change(queries::set_column_value(board_id, item_id, column_id, value_payload))
            .await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, ApiError> {
        let data: UsersData = self.run(&self.policies.default, queries::get_user(user_id)).await?;
        data.users
            .into_iter()
            .find(|u| u.id == user_id)
            .map(|u| User {
                id: u.id,
                name: u.name,
                photo_url: u.photo_thumb_small,
                email: u.email,
            })
            .ok_or_else(|| ApiError::NotFound(format!("user {}", user_id)))
    }
}
