//! Multi-board aggregation: one column listing, then one item listing per
//! selected board, merged into a single `Snapshot`.

use crate::config::{AggregationConfig, BoardErrorMode};
use crate::data::{Board, BoardColumns, BoardFailure, Snapshot};
use crate::integrations::client::PlatformClient;
use crate::integrations::ApiError;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use thiserror::Error;

/// Which phase of a refresh failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Columns,
    Items,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Columns => write!(f, "columns"),
            Self::Items => write!(f, "items"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to fetch {stage}: {source}")]
pub struct RefreshError {
    pub stage: FetchStage,
    pub board_id: Option<String>,
    #[source]
    pub source: ApiError,
}

pub struct AggregationFetcher {
    client: PlatformClient,
    concurrency: usize,
    on_board_error: BoardErrorMode,
}

impl AggregationFetcher {
    pub fn new(client: PlatformClient, config: &AggregationConfig) -> Self {
        Self {
            client,
            concurrency: config.concurrency.max(1),
            on_board_error: config.on_board_error,
        }
    }

    /// Fetch columns and items for the selected boards.
    ///
    /// Boards are processed in selection order. Ids the platform does not
    /// return are skipped. With `BoardErrorMode::FailFast` the first board
    /// that fails aborts the whole refresh and nothing fetched so far is
    /// returned.
    pub async fn refresh(
        &self,
        board_ids: &[String],
        column_ids: &[String],
    ) -> Result<Snapshot, RefreshError> {
        let mut snapshot = Snapshot::empty();
        if board_ids.is_empty() {
            return Ok(snapshot);
        }

        let listed = self
            .client
            .list_columns()
            .await
            .map_err(|source| RefreshError {
                stage: FetchStage::Columns,
                board_id: None,
                source,
            })?;

        let mut selected: Vec<BoardColumns> = Vec::new();
        for board_id in board_ids {
            match listed.iter().find(|b| &b.board.id == board_id) {
                Some(board) => selected.push(board.clone()),
                None => tracing::debug!("Selected board {} is no longer visible", board_id),
            }
        }

        for board in &selected {
            for column in &board.columns {
                snapshot.merge_column(column.clone());
            }
        }
        snapshot.columns_by_board = selected;

        if column_ids.is_empty() {
            tracing::debug!("No columns selected, skipping item fetch");
            return Ok(snapshot);
        }

        let boards: Vec<Board> = snapshot
            .columns_by_board
            .iter()
            .map(|bc| bc.board.clone())
            .collect();
        let client = &self.client;
        let mut results = stream::iter(boards)
            .map(|board| async move {
                let result = client.list_items(&board.id, column_ids).await;
                (board, result)
            })
            .buffered(self.concurrency);

        let mut items = Vec::new();
        let mut failed = Vec::new();

        while let Some((board, result)) = results.next().await {
            match result {
                Ok(board_items) => {
                    tracing::debug!("Fetched {} items from board {}", board_items.len(), board.id);
                    items.extend(board_items.into_iter().map(|mut item| {
                        item.board_id = board.id.clone();
                        item.board_name = board.name.clone();
                        item
                    }));
                }
                Err(source) => {
                    tracing::warn!("Failed to fetch items for board {}: {}", board.id, source);
                    match self.on_board_error {
                        BoardErrorMode::FailFast => {
                            return Err(RefreshError {
                                stage: FetchStage::Items,
                                board_id: Some(board.id),
                                source,
                            });
                        }
                        BoardErrorMode::Partial => failed.push(BoardFailure {
                            board_id: board.id,
                            message: source.to_string(),
                        }),
                    }
                }
            }
        }
        drop(results);

        snapshot.items = items;
        snapshot.failed_boards = failed;
        snapshot.fetched_at = Utc::now();
        Ok(snapshot)
    }
}
