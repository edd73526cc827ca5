//! The embedded view's state machine.
//!
//! A `Session` owns the view state, the latest snapshot, and scoped error
//! slots. Refreshes run as spawned tasks and report back over an mpsc
//! channel; every refresh carries a generation id and only the latest
//! generation may replace the snapshot.

mod background;

pub use background::run_background;

use crate::config::{Config, HostConfig};
use crate::data::sorting::fallback_type;
use crate::data::view::{self, compute_view};
use crate::data::{
    Board, Column, ColumnType, Item, Snapshot, SortDirection, SortSpec, User, ViewState, NO_USER,
};
use crate::integrations::aggregate::{AggregationFetcher, FetchStage, RefreshError};
use crate::integrations::client::PlatformClient;
use crate::integrations::queries;
use crate::integrations::users::UserCache;
use crate::integrations::ApiError;
use crate::settings::{Debouncer, KvStore, SettingsStore};
use crate::util::{drain, send_or_log};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Read-only facts supplied by the host at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostContext {
    pub user_id: String,
    pub account_url: String,
}

impl HostContext {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            account_url: config.account_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Region of the view an error is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Panel {
    Boards,
    Columns,
    Items,
    /// Blocks the whole view
    Fatal,
}

/// Non-blocking messages for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    SaveFailed(String),
    MutationFailed { item_id: String, message: String },
}

#[derive(Debug)]
pub struct RefreshEvent {
    pub generation: u64,
    pub result: Result<Snapshot, RefreshError>,
}

pub struct Session {
    client: PlatformClient,
    fetcher: Arc<AggregationFetcher>,
    users: Arc<UserCache>,
    user_names: HashMap<String, User>,
    settings: SettingsStore,
    saver: Option<Debouncer>,
    host: HostContext,
    state: ViewState,
    snapshot: Snapshot,
    boards: Vec<Board>,
    loaded: bool,
    errors: BTreeMap<Panel, String>,
    generation: u64,
    in_flight: usize,
    refresh_tx: mpsc::Sender<RefreshEvent>,
    refresh_rx: mpsc::Receiver<RefreshEvent>,
    notice_tx: mpsc::Sender<Notice>,
    notice_rx: mpsc::Receiver<Notice>,
    last_refresh: Option<Instant>,
    poll_interval: Duration,
    debounce: Duration,
}

impl Session {
    pub fn new(client: PlatformClient, kv: Arc<dyn KvStore>, host: HostContext, config: &Config) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::channel(16);
        let (notice_tx, notice_rx) = mpsc::channel(64);

        Self {
            fetcher: Arc::new(AggregationFetcher::new(client.clone(), &config.aggregation)),
            users: Arc::new(UserCache::new(client.clone())),
            client,
            user_names: HashMap::new(),
            settings: SettingsStore::new(kv),
            saver: None,
            host,
            state: ViewState::default(),
            snapshot: Snapshot::default(),
            boards: Vec::new(),
            loaded: false,
            errors: BTreeMap::new(),
            generation: 0,
            in_flight: 0,
            refresh_tx,
            refresh_rx,
            notice_tx,
            notice_rx,
            last_refresh: None,
            poll_interval: Duration::from_secs(config.polling.interval_secs),
            debounce: Duration::from_millis(config.settings.debounce_ms),
        }
    }

    /// Load saved settings and kick off the first refresh.
    ///
    /// Returns false when the settings backend failed; the session is then
    /// blocked and nothing else runs.
    pub async fn start(&mut self) -> bool {
        match self.settings.load().await {
            Ok(saved) => {
                self.state = saved.unwrap_or_default();
            }
            Err(e) => {
                tracing::error!("Failed to load view settings: {}", e);
                self.errors.insert(Panel::Fatal, e.to_string());
                return false;
            }
        }

        self.loaded = true;
        self.saver = Some(Debouncer::spawn(
            self.settings.clone(),
            self.debounce,
            self.notice_tx.clone(),
        ));
        tracing::info!(
            "Session started with {} board(s) and {} column(s) selected",
            self.state.selected_board_ids.len(),
            self.state.selected_column_ids.len()
        );
        self.start_refresh();
        true
    }

    /// Flush pending settings and stop the saver
    pub async fn close(&mut self) {
        if let Some(saver) = self.saver.take() {
            saver.shutdown().await;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_blocked(&self) -> bool {
        self.errors.contains_key(&Panel::Fatal)
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn error(&self, panel: Panel) -> Option<&str> {
        self.errors.get(&panel).map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<Panel, String> {
        &self.errors
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight > 0
    }

    pub async fn load_boards(&mut self) -> Result<&[Board], ApiError> {
        match self.client.list_boards().await {
            Ok(boards) => {
                self.errors.remove(&Panel::Boards);
                self.boards = boards;
                Ok(&self.boards)
            }
            Err(e) => {
                tracing::warn!("Failed to list boards: {}", e);
                self.errors.insert(Panel::Boards, e.to_string());
                Err(e)
            }
        }
    }

    // Selection changes: persisted and refetched

    pub fn select_boards<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.set_boards(ids);
        self.selection_changed();
    }

    pub fn toggle_board(&mut self, id: &str) -> bool {
        let selected = self.state.toggle_board(id);
        self.selection_changed();
        selected
    }

    pub fn select_columns<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.set_columns(ids);
        self.selection_changed();
    }

    pub fn toggle_column(&mut self, id: &str) -> bool {
        let selected = self.state.toggle_column(id);
        self.selection_changed();
        selected
    }

    pub fn set_panel_open(&mut self, open: bool) {
        if self.state.panel_open == open {
            return;
        }
        self.state.panel_open = open;
        self.schedule_save();
    }

    fn selection_changed(&mut self) {
        if !self.loaded {
            return;
        }
        self.schedule_save();
        self.start_refresh();
    }

    // View query changes: persisted, never refetched

    pub fn set_filter<I, S>(&mut self, column_id: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.state.active_filters.remove(column_id);
        } else {
            self.state.active_filters.insert(column_id.to_string(), values);
        }
        self.schedule_save();
    }

    pub fn clear_filter(&mut self, column_id: &str) {
        if self.state.active_filters.remove(column_id).is_some() {
            self.schedule_save();
        }
    }

    /// Replace the active sort
    pub fn set_sort(&mut self, column_id: &str, direction: SortDirection) {
        self.state.sort = Some(SortSpec {
            column_id: column_id.to_string(),
            direction,
        });
        self.schedule_save();
    }

    /// Sort by `column_id`, flipping direction if it is already the sort key
    pub fn cycle_sort(&mut self, column_id: &str) -> SortDirection {
        let direction = match &self.state.sort {
            Some(sort) if sort.column_id == column_id => sort.direction.toggled(),
            _ => SortDirection::Asc,
        };
        self.set_sort(column_id, direction);
        direction
    }

    pub fn clear_sort(&mut self) {
        if self.state.sort.take().is_some() {
            self.schedule_save();
        }
    }

    pub fn set_my_items_only(&mut self, enabled: bool) {
        self.state.my_items_only = enabled;
        self.schedule_save();
    }

    fn schedule_save(&self) {
        if !self.loaded {
            return;
        }
        if let Some(saver) = &self.saver {
            saver.schedule(self.state.clone());
        }
    }

    // Derived view

    /// Filtered and sorted rows. Filters on columns that are not displayed
    /// stay saved but do not apply.
    pub fn rows(&self) -> Vec<&Item> {
        let columns = self.displayed_columns();
        compute_view(
            &self.snapshot.items,
            &columns,
            &self.state.query(),
            &self.host.user_id,
            &self.user_names,
        )
    }

    /// Selected columns in selection order. Ids no board provides any more
    /// stay visible as placeholder columns with empty cells.
    pub fn displayed_columns(&self) -> Vec<Column> {
        self.state
            .selected_column_ids
            .iter()
            .map(|id| {
                self.snapshot
                    .column(id)
                    .cloned()
                    .unwrap_or_else(|| Column::new(id, id, fallback_type(id)))
            })
            .collect()
    }

    /// Values the filter menu of `column_id` can offer, taken from the data
    pub fn filter_options(&self, column_id: &str) -> Vec<String> {
        match self.snapshot.column(column_id) {
            Some(column) if column.column_type == ColumnType::Status => {
                view::status_options(&self.snapshot.items, column)
            }
            Some(column) if column.column_type.is_person_like() => {
                view::people_options(&self.snapshot.items, column_id)
            }
            _ => Vec::new(),
        }
    }

    // Refresh bookkeeping

    /// Spawn a refresh for the current selection and return its generation
    pub fn start_refresh(&mut self) -> u64 {
        self.generation += 1;
        self.in_flight += 1;
        let generation = self.generation;

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.refresh_tx.clone();
        let board_ids = self.state.selected_board_ids.clone();
        let column_ids = self.state.selected_column_ids.clone();

        tracing::debug!("Starting refresh generation {}", generation);
        tokio::spawn(async move {
            let result = fetcher.refresh(&board_ids, &column_ids).await;
            send_or_log(&tx, RefreshEvent { generation, result }, "refresh result").await;
        });

        generation
    }

    /// Apply every finished refresh without waiting. Returns true if the
    /// snapshot was replaced.
    pub fn poll_refresh(&mut self) -> bool {
        let mut changed = false;
        for event in drain(&mut self.refresh_rx) {
            changed |= self.apply_refresh(event);
        }
        changed
    }

    /// Wait for every in-flight refresh to report
    pub async fn settle(&mut self) -> bool {
        let mut changed = false;
        while self.in_flight > 0 {
            match self.refresh_rx.recv().await {
                Some(event) => changed |= self.apply_refresh(event),
                None => break,
            }
        }
        changed
    }

    /// Refresh inline. Returns true if the snapshot was replaced.
    pub async fn refresh_now(&mut self) -> bool {
        self.start_refresh();
        self.settle().await
    }

    /// Timer hook. Starts a background refresh only when the poll interval
    /// has elapsed and nothing is in flight; returns whether it did.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        if !self.loaded || self.in_flight > 0 {
            return false;
        }
        let due = match self.last_refresh {
            Some(last) => now.saturating_duration_since(last) >= self.poll_interval,
            None => true,
        };
        if !due {
            return false;
        }
        self.start_refresh();
        true
    }

    pub(crate) async fn next_refresh_event(&mut self) -> Option<RefreshEvent> {
        self.refresh_rx.recv().await
    }

    pub(crate) fn apply_refresh(&mut self, event: RefreshEvent) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.last_refresh = Some(Instant::now());

        if event.generation != self.generation {
            tracing::debug!(
                "Discarding refresh generation {} (latest is {})",
                event.generation,
                self.generation
            );
            return false;
        }

        match event.result {
            Ok(snapshot) => {
                self.errors.remove(&Panel::Columns);
                self.errors.remove(&Panel::Items);
                if !snapshot.failed_boards.is_empty() {
                    let failed: Vec<String> = snapshot
                        .failed_boards
                        .iter()
                        .map(|f| format!("board {}: {}", f.board_id, f.message))
                        .collect();
                    self.errors.insert(Panel::Items, failed.join("; "));
                }
                tracing::debug!(
                    "Refresh generation {} loaded {} items",
                    event.generation,
                    snapshot.items.len()
                );
                self.snapshot = snapshot;
                true
            }
            Err(e) => {
                tracing::warn!("Refresh generation {} failed: {}", event.generation, e);
                let panel = match e.stage {
                    FetchStage::Columns => Panel::Columns,
                    FetchStage::Items => Panel::Items,
                };
                self.errors.insert(panel, e.to_string());
                false
            }
        }
    }

    // Mutations: no local patching, success triggers a refetch

    pub async fn rename_item(&mut self, item_id: &str, new_name: &str) -> Result<(), ApiError> {
        let result = match self.board_of(item_id) {
            Ok(board_id) => self.client.rename_item(&board_id, item_id, new_name).await,
            Err(e) => Err(e),
        };
        self.finish_mutation(item_id, result).await
    }

    pub async fn set_column_value(
        &mut self,
        item_id: &str,
        column_id: &str,
        payload: &Value,
    ) -> Result<(), ApiError> {
        let result = match self.board_of(item_id) {
            Ok(board_id) => {
                self.client
                    .set_column_value(&board_id, item_id, column_id, payload)
                    .await
            }
            Err(e) => Err(e),
        };
        self.finish_mutation(item_id, result).await
    }

    /// Encode user input for a column mutation: a status label, a comma
    /// separated list of person ids, or a JSON document for anything else.
    pub fn value_payload(&self, column_id: &str, input: &str) -> Value {
        let column_type = self
            .snapshot
            .column(column_id)
            .map(|c| c.column_type.clone())
            .unwrap_or_else(|| fallback_type(column_id));

        match column_type {
            ColumnType::Status => queries::status_label_payload(input),
            t if t.is_person_like() => {
                let ids: Vec<String> = input
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect();
                queries::people_payload(&ids)
            }
            _ => serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string())),
        }
    }

    fn board_of(&self, item_id: &str) -> Result<String, ApiError> {
        self.snapshot
            .items
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.board_id.clone())
            .ok_or_else(|| ApiError::NotFound(format!("item {} is not loaded", item_id)))
    }

    async fn finish_mutation(&mut self, item_id: &str, result: Result<(), ApiError>) -> Result<(), ApiError> {
        match result {
            Ok(()) => {
                tracing::info!("Updated item {}", item_id);
                self.start_refresh();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Mutation on item {} failed: {}", item_id, e);
                let notice = Notice::MutationFailed {
                    item_id: item_id.to_string(),
                    message: e.to_string(),
                };
                send_or_log(&self.notice_tx, notice, "mutation failure notice").await;
                Err(e)
            }
        }
    }

    // Users

    pub async fn user(&mut self, user_id: &str) -> Result<User, ApiError> {
        let user = self.users.get(user_id).await?;
        self.user_names.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    /// Resolve everyone assigned in the displayed person columns so person
    /// sorting and rendering have names to work with.
    pub async fn load_people(&mut self) -> usize {
        let mut ids: Vec<String> = Vec::new();
        for column in self.displayed_columns() {
            if column.column_type.is_person_like() {
                for id in view::people_options(&self.snapshot.items, &column.id) {
                    if !ids.contains(&id) && id != NO_USER {
                        ids.push(id);
                    }
                }
            }
        }

        let resolved = self.users.resolve_all(&ids).await;
        let count = resolved.len();
        self.user_names.extend(resolved);
        count
    }

    pub fn cached_user(&self, user_id: &str) -> Option<&User> {
        self.user_names.get(user_id)
    }

    pub fn profile_url(&self, user_id: &str) -> String {
        format!("{}/users/{}", self.host.account_url, user_id)
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        drain(&mut self.notice_rx)
    }
}
