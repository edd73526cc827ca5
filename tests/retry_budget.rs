//! Retry behaviour of platform calls as seen through the client

mod test_utils;

use boardview::integrations::ApiError;
use test_utils::*;

#[tokio::test]
async fn always_rate_limited_uses_whole_budget() {
    let transport = FakeTransport::new();
    transport.on("ListBoards", rate_limited());
    let client = make_client(&transport, 4);

    let err = client.list_boards().await.unwrap_err();

    assert_eq!(transport.call_count("ListBoards"), 4);
    match err {
        ApiError::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(last.is_transient());
        }
        other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
}

#[tokio::test]
async fn fatal_error_is_attempted_once() {
    let transport = FakeTransport::new();
    transport.on("ListBoards", permission_denied());
    let client = make_client(&transport, 5);

    let err = client.list_boards().await.unwrap_err();

    assert_eq!(transport.call_count("ListBoards"), 1);
    assert!(matches!(err, ApiError::GraphQl { .. }));
}

#[tokio::test]
async fn recovers_once_rate_limit_clears() {
    let transport = FakeTransport::new();
    transport
        .once("ListBoards", rate_limited())
        .once("ListBoards", rate_limited())
        .on("ListBoards", boards_body(&[("1", "Roadmap")]));
    let client = make_client(&transport, 4);

    let boards = client.list_boards().await.unwrap();

    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].name, "Roadmap");
    assert_eq!(transport.call_count("ListBoards"), 3);
}

#[tokio::test]
async fn http_429_is_transient() {
    let transport = FakeTransport::new();
    transport
        .once("GetUser", Reply::Fail(ApiError::transport(Some(429), "HTTP 429: slow down")))
        .on("GetUser", user_body("7", "Ada"));
    let client = make_client(&transport, 3);

    let user = client.get_user("7").await.unwrap();

    assert_eq!(user.name, "Ada");
    assert_eq!(transport.call_count("GetUser"), 2);
}

#[tokio::test]
async fn independent_calls_keep_separate_budgets() {
    let transport = FakeTransport::new();
    transport
        .on("ListBoards", rate_limited())
        .on("GetUser", user_body("7", "Ada"));
    let client = make_client(&transport, 3);

    let (boards, user) = tokio::join!(client.list_boards(), client.get_user("7"));

    assert!(matches!(boards, Err(ApiError::ExhaustedRetries { attempts: 3, .. })));
    assert_eq!(user.unwrap().id, "7");
    assert_eq!(transport.call_count("ListBoards"), 3);
    assert_eq!(transport.call_count("GetUser"), 1);
}

#[tokio::test]
async fn items_use_their_own_policy() {
    use boardview::integrations::client::PlatformClient;
    use boardview::integrations::retry::{RetryPolicies, RetryPolicy};
    use std::time::Duration;

    let quick = RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        ..RetryPolicy::default()
    };
    let policies = RetryPolicies {
        default: RetryPolicy {
            max_attempts: 1,
            ..quick.clone()
        },
        items: RetryPolicy {
            max_attempts: 3,
            ..quick
        },
    };

    let transport = FakeTransport::new();
    transport.on("ListItems:b1", rate_limited()).on("ListBoards", rate_limited());
    let client = PlatformClient::new(transport.clone(), policies);

    let _ = client.list_boards().await;
    let _ = client.list_items("b1", &["status".to_string()]).await;

    assert_eq!(transport.call_count("ListBoards"), 1);
    assert_eq!(transport.call_count("ListItems:b1"), 3);
}
