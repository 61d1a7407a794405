//! `HttpClient::post_json` against a local `wiremock` endpoint.

use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prospekt_scraper::{HttpClient, ScraperError};

#[derive(Debug, Deserialize, PartialEq)]
struct Reply {
    answer: u32,
}

fn client(max_retries: u32) -> HttpClient {
    HttpClient::new(5, "prospekt-test/0.1", max_retries, 0).expect("failed to build client")
}

#[tokio::test]
async fn post_json_sends_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/ask"))
        .and(header("x-api-key", "k-123"))
        .and(body_json(json!({ "question": "six times seven" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": 42 })))
        .expect(1)
        .mount(&server)
        .await;

    let reply: Reply = client(0)
        .post_json(
            &format!("{}/v1/ask", server.uri()),
            &[("x-api-key", "k-123")],
            &json!({ "question": "six times seven" }),
        )
        .await
        .expect("reply");

    assert_eq!(reply, Reply { answer: 42 });
}

#[tokio::test]
async fn post_json_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": 7 })))
        .expect(1)
        .mount(&server)
        .await;

    let reply: Reply = client(2)
        .post_json(&server.uri(), &[], &json!({}))
        .await
        .expect("second attempt succeeds");

    assert_eq!(reply.answer, 7);
}

#[tokio::test]
async fn post_json_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(3)
        .post_json::<_, Reply>(&server.uri(), &[], &json!({}))
        .await
        .unwrap_err();

    assert!(
        matches!(err, ScraperError::UnexpectedStatus { status: 400, .. }),
        "got: {err:?}"
    );
}
