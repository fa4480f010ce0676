//! End-to-end tests: poll cycles against a mock discussions API and webhook.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use discussions_automod::automod::{Automod, ErrorSink, Watermark};
use discussions_automod::config::Config;
use discussions_automod::discussions::DiscussionsClient;
use serde_json::json;
use tempfile::NamedTempFile;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GRACE: Duration = Duration::from_secs(5);

fn wire_post(id: u64, thread_id: u64, forum_id: u64, content: &str) -> serde_json::Value {
    json!({
        "id": id.to_string(),
        "threadId": thread_id.to_string(),
        "forumId": forum_id.to_string(),
        "title": "Thread title",
        "rawContent": content,
        "isReply": false,
        "isDeleted": false,
        "funnel": "TEXT",
        "createdBy": {
            "id": "42",
            "name": "Poster",
            "avatarUrl": "https://img.example/p.png",
            "badgePermission": ""
        }
    })
}

fn page(posts: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "_embedded": { "doc:posts": posts } })
}

async fn mount_wiki(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/Mercury/WikiVariables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": 1 } })))
        .mount(server)
        .await;
}

async fn mount_posts(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/wikia.php"))
        .and(query_param("method", "getPosts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Write a filters file and build an automod pointed at the mock server.
async fn build_automod(server: &MockServer, filters_toml: &str) -> (Automod, NamedTempFile) {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(filters_toml.as_bytes()).unwrap();

    let config = Config {
        base_url: server.uri(),
        filters_path: file.path().to_path_buf(),
        ..Config::for_testing()
    };
    let filters = config.load_filters().expect("Failed to load filters");

    let client = DiscussionsClient::new(&config).unwrap();
    client.init().await.expect("init failed");

    let (errors, _failures) = ErrorSink::channel();
    let automod = Automod::new(&config, Arc::new(client), filters, errors).unwrap();
    (automod, file)
}

#[tokio::test]
async fn test_delete_match_is_notified() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;
    mount_posts(
        &server,
        page(vec![
            wire_post(105, 50, 1, "hello there"),
            wire_post(104, 49, 1, "join discord.gg/spam"),
        ]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/wikia.php"))
        .and(query_param("controller", "DiscussionThread"))
        .and(query_param("method", "delete"))
        .and(query_param("threadId", "49"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "embeds": [{
                "title": "Filter Matched",
                "url": format!("{}/f/p/49", server.uri()),
                "author": { "name": "Poster", "url": format!("{}/f/u/42", server.uri()) },
                "fields": [
                    { "name": "Filter Name", "value": "Invites", "inline": true },
                    { "name": "Check Failed", "value": "`/discord\\.gg/i`", "inline": true },
                    { "name": "Action", "value": "delete", "inline": true },
                    { "name": "Post Content", "value": "join discord.gg/spam" }
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let filters = format!(
        r#"
        [[filters]]
        name = "Invites"
        action = "delete"
        rules = ['/discord\.gg/i']
        webhook_url = "{}/hook"
        "#,
        server.uri()
    );
    let (automod, _file) = build_automod(&server, &filters).await;

    let watermark = automod.run_cycle(Watermark::ZERO).await;
    assert_eq!(watermark, Watermark::new(105));
    assert!(automod.drain(GRACE).await);

    server.verify().await;
}

#[tokio::test]
async fn test_posts_at_watermark_are_not_reprocessed() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;
    mount_posts(
        &server,
        page(vec![
            wire_post(105, 50, 1, "fine"),
            wire_post(100, 49, 1, "discord.gg/spam"),
        ]),
    )
    .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let (automod, _file) = build_automod(
        &server,
        r#"
        [[filters]]
        name = "Invites"
        action = "delete"
        rules = ['discord\.gg']
        "#,
    )
    .await;

    let watermark = automod.run_cycle(Watermark::new(100)).await;
    assert_eq!(watermark, Watermark::new(105));
    assert!(automod.drain(GRACE).await);

    server.verify().await;
}

#[tokio::test]
async fn test_recategorize_into_same_category_is_silent() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;
    mount_posts(&server, page(vec![wire_post(7, 70, 3, "off topic chatter")])).await;

    // Neither a move nor a webhook call may happen.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let filters = format!(
        r#"
        [[filters]]
        name = "Off-topic"
        action = "recategorize"
        rules = ["off topic"]
        target_category_id = 3
        webhook_url = "{}/hook"
        "#,
        server.uri()
    );
    let (automod, _file) = build_automod(&server, &filters).await;

    assert_eq!(
        automod.run_cycle(Watermark::ZERO).await,
        Watermark::new(7)
    );
    assert!(automod.drain(GRACE).await);

    server.verify().await;
}

#[tokio::test]
async fn test_no_webhook_configured_sends_nothing() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;
    mount_posts(&server, page(vec![wire_post(7, 70, 3, "spam")])).await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let (automod, _file) = build_automod(
        &server,
        r#"
        [[filters]]
        name = "Watch"
        action = "log"
        rules = ["spam"]
        "#,
    )
    .await;

    automod.run_cycle(Watermark::ZERO).await;
    assert!(automod.drain(GRACE).await);

    server.verify().await;
}

#[tokio::test]
async fn test_fetch_failure_keeps_watermark() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;

    Mock::given(method("GET"))
        .and(path("/wikia.php"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (automod, _file) = build_automod(
        &server,
        r#"
        [[filters]]
        name = "Watch"
        action = "log"
        rules = ["spam"]
        "#,
    )
    .await;

    assert_eq!(
        automod.run_cycle(Watermark::new(42)).await,
        Watermark::new(42)
    );
}

#[tokio::test]
async fn test_failed_action_does_not_block_following_posts() {
    let server = MockServer::start().await;
    mount_wiki(&server).await;
    mount_posts(
        &server,
        page(vec![
            wire_post(12, 120, 1, "spam two"),
            wire_post(11, 110, 1, "spam one"),
        ]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/wikia.php"))
        .and(query_param("method", "create"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let (automod, _file) = build_automod(
        &server,
        r#"
        [[filters]]
        name = "Warn"
        action = "reply"
        rules = ["spam"]
        reply_message = "Please don't spam"
        "#,
    )
    .await;

    assert_eq!(
        automod.run_cycle(Watermark::ZERO).await,
        Watermark::new(12)
    );
    assert!(automod.drain(GRACE).await);

    server.verify().await;
}
