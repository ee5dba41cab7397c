#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use resilient_request::refresh::RefreshCoordinator;
use resilient_request::{MemorySessionStore, RequestDescriptor, RequestPipeline, SessionStore, SessionToken};
use tokio::task::JoinSet;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BURST: usize = 5;

#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/dashboard"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(BURST as u64)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(BURST as u64)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "new", "expires_in": 3600}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(MemorySessionStore::with_token(SessionToken::new("old")));
    let navigator = Arc::new(common::RecordingNavigator::default());
    let pipeline = RequestPipeline::builder(common::config(&server.uri()))
        .session_store(session.clone())
        .navigator(navigator.clone())
        .build()
        .expect("pipeline");

    let mut tasks = JoinSet::new();
    for _ in 0..BURST {
        let pipeline = pipeline.clone();
        tasks.spawn(async move {
            pipeline
                .get_json::<serde_json::Value>("/api/dashboard")
                .await
        });
    }

    let mut resolved = 0;
    while let Some(joined) = tasks.join_next().await {
        let body = joined.expect("task").expect("request recovers after refresh");
        assert_eq!(body, serde_json::json!({"ok": true}));
        resolved += 1;
    }
    assert_eq!(resolved, BURST);
    assert_eq!(session.load().expect("token").value(), "new");
    assert!(navigator.targets().is_empty());
    assert!(!pipeline.refresh_state().is_refreshing());
}

#[tokio::test]
async fn adopted_token_is_used_by_later_calls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/usage"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/usage"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"seats": 4})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"token": "new"})))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = RequestPipeline::builder(common::config(&server.uri()))
        .session_store(Arc::new(MemorySessionStore::with_token(SessionToken::new("old"))))
        .build()
        .expect("pipeline");

    for _ in 0..2 {
        let usage: serde_json::Value = pipeline.get_json("/api/usage").await.expect("usage");
        assert_eq!(usage["seats"], 4);
    }
}

#[tokio::test]
async fn pipelines_sharing_refresh_state_refresh_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/members"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/members"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "new"}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session: Arc<dyn SessionStore> =
        Arc::new(MemorySessionStore::with_token(SessionToken::new("old")));
    let refresh = Arc::new(RefreshCoordinator::new());
    let build = || {
        RequestPipeline::builder(common::config(&server.uri()))
            .session_store(session.clone())
            .refresh_state(refresh.clone())
            .build()
            .expect("pipeline")
    };
    let (first, second) = (build(), build());

    let (a, b) = tokio::join!(
        first.get_json::<serde_json::Value>("/api/members"),
        second.get_json::<serde_json::Value>("/api/members"),
    );
    a.expect("first pipeline recovers");
    b.expect("second pipeline recovers");
    assert!(Arc::ptr_eq(&first.refresh_state(), &second.refresh_state()));
}

#[tokio::test]
async fn aborting_one_waiter_leaves_the_others_queued() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/alerts"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/alerts"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"alerts": []})))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "new"}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = RequestPipeline::builder(common::config(&server.uri()))
        .session_store(Arc::new(MemorySessionStore::with_token(SessionToken::new("old"))))
        .build()
        .expect("pipeline");
    let refresh = pipeline.refresh_state();

    let spawn = |pipeline: RequestPipeline| {
        tokio::spawn(async move { pipeline.send(&RequestDescriptor::get("/api/alerts")).await })
    };

    let leader = spawn(pipeline.clone());
    tokio::time::timeout(Duration::from_secs(2), async {
        while !refresh.is_refreshing() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("leader starts the refresh");

    let waiters: Vec<_> = (0..3).map(|_| spawn(pipeline.clone())).collect();
    tokio::time::timeout(Duration::from_secs(2), async {
        while refresh.waiting() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("all three queue behind the leader");

    let mut waiters = waiters.into_iter();
    let cancelled = waiters.next().expect("first waiter");
    cancelled.abort();
    assert!(cancelled.await.expect_err("aborted").is_cancelled());

    let response = leader.await.expect("leader task").expect("leader recovers");
    assert_eq!(response.status().as_u16(), 200);
    for waiter in waiters {
        let response = waiter.await.expect("waiter task").expect("waiter recovers");
        assert_eq!(response.status().as_u16(), 200);
    }
    assert!(!refresh.is_refreshing());
}
