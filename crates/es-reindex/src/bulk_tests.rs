//! Tests for the bulk wire format and HTTP transport.

use super::*;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn doc(id: Option<&str>) -> Document {
    Document::new("products", id.map(String::from), json!({"name": "lamp", "tags": ["a"]}))
}

#[test]
fn test_encode_action_and_source_lines() {
    let mut typed = doc(Some("1"));
    typed.doc_type = Some("item".to_string());
    let body = encode_bulk_body(&[typed, doc(None)]).unwrap();

    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(body.ends_with('\n'));

    let action: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(
        action,
        json!({"index": {"_index": "products", "_type": "item", "_id": "1"}})
    );
    let source: Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(source, json!({"name": "lamp", "tags": ["a"]}));

    let auto: Value = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(auto, json!({"index": {"_index": "products"}}));
}

#[test]
fn test_encode_keeps_source_on_one_line() {
    let multiline = Document::new("i", None, json!({"text": "a\nb"}));
    let body = encode_bulk_body(&[multiline]).unwrap();
    assert_eq!(body.lines().count(), 2);
}

#[test]
fn test_encode_empty_batch() {
    assert_eq!(encode_bulk_body(&[]).unwrap(), "");
}

#[test]
fn test_item_outcomes() {
    let created = BulkItemResult {
        status: Some(201),
        ..Default::default()
    };
    assert_eq!(created.outcome(), Outcome::Succeeded);

    let legacy = BulkItemResult {
        ok: Some(true),
        ..Default::default()
    };
    assert_eq!(legacy.outcome(), Outcome::Succeeded);

    let rejected = BulkItemResult {
        status: Some(400),
        error: Some(json!({"type": "mapper_parsing_exception", "reason": "bad field"})),
        ..Default::default()
    };
    assert_eq!(
        rejected.outcome(),
        Outcome::Failed("mapper_parsing_exception: bad field".to_string())
    );

    let legacy_error = BulkItemResult {
        error: Some(json!("MapperParsingException[failed]")),
        ..Default::default()
    };
    assert_eq!(
        legacy_error.outcome(),
        Outcome::Failed("MapperParsingException[failed]".to_string())
    );

    let conflict = BulkItemResult {
        status: Some(409),
        ..Default::default()
    };
    assert!(!conflict.outcome().is_success());
    assert!(!BulkItemResult::default().outcome().is_success());
}

#[test]
fn test_parse_response() {
    let body = json!({
        "took": 7,
        "errors": true,
        "items": [
            {"index": {"_index": "products", "_id": "1", "status": 201}},
            {"create": {"_index": "products", "_id": "2", "status": 400,
                        "error": {"type": "x", "reason": "y"}}}
        ]
    })
    .to_string();

    let response = BulkResponse::parse(&body).unwrap();
    assert_eq!(response.took, 7);
    assert!(response.errors);
    assert_eq!(response.items.len(), 2);
    assert_eq!(response.items[0].id.as_deref(), Some("1"));
    assert!(!response.items[1].outcome().is_success());
}

#[test]
fn test_parse_rejects_missing_items() {
    assert!(matches!(
        BulkResponse::parse(r#"{"took": 1}"#),
        Err(Error::Protocol(_))
    ));
    assert!(matches!(
        BulkResponse::parse("<html>"),
        Err(Error::Protocol(_))
    ));
    assert!(matches!(
        BulkResponse::parse(r#"{"items": [{}]}"#),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_correlate_by_position() {
    let docs = vec![doc(Some("a")), doc(None), doc(Some("c"))];
    let response = BulkResponse {
        items: vec![
            BulkItemResult {
                status: Some(201),
                ..Default::default()
            },
            BulkItemResult {
                status: Some(400),
                error: Some(json!("rejected")),
                // The echoed id is ignored.
                id: Some("generated".to_string()),
                ..Default::default()
            },
            BulkItemResult {
                status: Some(200),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let outcomes = response.correlate(docs).unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].document.id.as_deref(), Some("a"));
    assert!(outcomes[0].outcome.is_success());
    assert!(outcomes[1].document.id.is_none());
    assert_eq!(outcomes[1].outcome, Outcome::Failed("rejected".to_string()));
    assert!(outcomes[2].outcome.is_success());
}

#[test]
fn test_correlate_count_mismatch_is_protocol_error() {
    let response = BulkResponse {
        items: vec![BulkItemResult::default()],
        ..Default::default()
    };
    let result = response.correlate(vec![doc(Some("1")), doc(Some("2"))]);
    assert!(matches!(result, Err(Error::Protocol(msg)) if msg.contains("1 items for 2")));
}

#[tokio::test]
async fn test_http_client_posts_ndjson() {
    let server = MockServer::start().await;
    let docs = vec![doc(Some("1"))];
    let expected_body = encode_bulk_body(&docs).unwrap();

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string(expected_body.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 3,
            "errors": false,
            "items": [{"index": {"_id": "1", "status": 201}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpBulkClient::new(&DestinationConfig::new(server.uri())).unwrap();
    assert!(client.url().ends_with("/_bulk"));

    let response = client.send_bulk(expected_body).await.unwrap();
    assert_eq!(response.items.len(), 1);
    assert!(response.items[0].outcome().is_success());
}

#[tokio::test]
async fn test_http_client_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
        .mount(&server)
        .await;

    let client = HttpBulkClient::new(&DestinationConfig::new(server.uri())).unwrap();
    let result = client.send_bulk("{}\n{}\n".to_string()).await;
    assert!(matches!(result, Err(Error::HttpStatus { status: 413, .. })));
}

#[tokio::test]
async fn test_http_client_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut config = DestinationConfig::new(server.uri());
    config.timeout_secs = 1;
    let client = HttpBulkClient::new(&config).unwrap();

    let result = client.send_bulk(String::new()).await;
    assert!(matches!(result, Err(Error::Transport(msg)) if msg.contains("timed out")));
}
