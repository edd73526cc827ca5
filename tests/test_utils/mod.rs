//! Fake transport and response fixtures for boardview tests
#![allow(dead_code)]

use async_trait::async_trait;
use boardview::config::Config;
use boardview::data::{ColumnValue, Item};
use boardview::integrations::client::PlatformClient;
use boardview::integrations::retry::{RetryPolicies, RetryPolicy};
use boardview::integrations::{ApiError, GraphQlRequest, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    Body(Value),
    Fail(ApiError),
}

#[derive(Default)]
struct Route {
    queued: VecDeque<Reply>,
    standing: Option<Reply>,
    delay: Duration,
}

/// Transport that answers by route: the operation name, plus `:<board id>`
/// for item listings. Queued replies are used once, in order, before the
/// standing reply.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<GraphQlRequest>>,
}

pub fn route_key(request: &GraphQlRequest) -> String {
    let op = request.operation_name().unwrap_or("unknown").to_string();
    if op == "ListItems" {
        if let Some(board) = request.variables["boardIds"][0].as_str() {
            return format!("{}:{}", op, board);
        }
    }
    op
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, route: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .standing = Some(reply);
        self
    }

    pub fn once(&self, route: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .queued
            .push_back(reply);
        self
    }

    pub fn delay(&self, route: &str, delay: Duration) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, route: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == route).count()
    }

    pub fn requests(&self) -> Vec<GraphQlRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post(&self, request: &GraphQlRequest) -> Result<Value, ApiError> {
        let key = route_key(request);
        self.calls.lock().unwrap().push(key.clone());
        self.requests.lock().unwrap().push(request.clone());

        let (delay, reply) = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(route) => {
                    let reply = route.queued.pop_front().or_else(|| route.standing.clone());
                    (route.delay, reply)
                }
                None => (Duration::ZERO, None),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Fail(err)) => Err(err),
            None => Err(ApiError::Decode(format!("no fixture for {}", key))),
        }
    }
}

/// Retry quickly so tests on the real clock stay fast
pub fn fast_policies(max_attempts: u32) -> RetryPolicies {
    RetryPolicies::uniform(RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        backoff_factor: 2.0,
        max_delay: Duration::from_millis(5),
        ..RetryPolicy::default()
    })
}

pub fn make_client(transport: &Arc<FakeTransport>, max_attempts: u32) -> PlatformClient {
    PlatformClient::new(transport.clone(), fast_policies(max_attempts))
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.host.user_id = "100".to_string();
    config.host.account_url = "https://acme.example.com".to_string();
    config.settings.debounce_ms = 10;
    config
}

// Response bodies

pub fn boards_body(boards: &[(&str, &str)]) -> Reply {
    let boards: Vec<Value> = boards
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    Reply::Body(json!({ "data": { "boards": boards } }))
}

pub fn column_json(id: &str, title: &str, column_type: &str) -> Value {
    json!({ "id": id, "title": title, "type": column_type, "settings_str": null })
}

pub fn status_column_json(id: &str, labels: &[&str]) -> Value {
    let labels: serde_json::Map<String, Value> = labels
        .iter()
        .enumerate()
        .map(|(idx, label)| (idx.to_string(), Value::from(*label)))
        .collect();
    let settings = json!({ "labels": labels }).to_string();
    json!({ "id": id, "title": "Status", "type": "status", "settings_str": settings })
}

pub fn columns_body(boards: &[(&str, &str, Vec<Value>)]) -> Reply {
    let boards: Vec<Value> = boards
        .iter()
        .map(|(id, name, columns)| json!({ "id": id, "name": name, "columns": columns }))
        .collect();
    Reply::Body(json!({ "data": { "boards": boards } }))
}

/// `cells` are (column id, text, raw value)
pub fn item_json(id: &str, name: &str, cells: &[(&str, &str, Option<Value>)]) -> Value {
    let values: Vec<Value> = cells
        .iter()
        .map(|(column, text, value)| {
            json!({
                "id": column,
                "text": text,
                "value": value.as_ref().map(|v| v.to_string()),
            })
        })
        .collect();
    json!({ "id": id, "name": name, "board": null, "group": null, "column_values": values })
}

pub fn items_body(board_id: &str, board_name: &str, items: Vec<Value>) -> Reply {
    Reply::Body(json!({
        "data": {
            "boards": [{
                "id": board_id,
                "name": board_name,
                "items_page": { "items": items }
            }]
        }
    }))
}

pub fn user_body(id: &str, name: &str) -> Reply {
    Reply::Body(json!({
        "data": {
            "users": [{ "id": id, "name": name, "photo_thumb_small": null, "email": format!("{}@example.com", id) }]
        }
    }))
}

pub fn changed_body(item_id: &str) -> Reply {
    Reply::Body(json!({ "data": { "change_column_value": { "id": item_id } } }))
}

/// HTTP 200 whose body reports the platform's rate limit
pub fn rate_limited() -> Reply {
    Reply::Body(json!({
        "errors": [{ "message": "Rate Limit Exceeded", "extensions": { "code": "RATE_LIMIT_EXCEEDED" } }]
    }))
}

pub fn permission_denied() -> Reply {
    Reply::Body(json!({
        "errors": [{ "message": "User unauthorized to perform action", "extensions": { "code": "UserUnauthorizedException" } }]
    }))
}

pub fn people_value(ids: &[u64]) -> Value {
    let persons: Vec<Value> = ids.iter().map(|id| json!({ "id": id, "kind": "person" })).collect();
    json!({ "personsAndTeams": persons })
}

// Local items, for tests that never touch the transport

pub fn make_item(id: &str, board: &str, cells: &[(&str, &str)]) -> Item {
    Item {
        id: id.to_string(),
        name: format!("Item {}", id),
        board_id: board.to_string(),
        board_name: format!("Board {}", board),
        group: None,
        column_values: cells
            .iter()
            .map(|(column, text)| ColumnValue {
                column_id: column.to_string(),
                text: Some(text.to_string()),
                value: None,
            })
            .collect(),
    }
}
