//! Feed retrieval over HTTP

use sentinel_ingest::error::FetchError;
use sentinel_ingest::feed::{FeedClient, FeedParser};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(2);

fn client() -> FeedClient {
    FeedClient::new("sentinel-test/1.0").unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body_and_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/xml/rss.xml"))
        .and(header("user-agent", "sentinel-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss><channel/></rss>"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client()
        .fetch(&format!("{}/xml/rss.xml", server.uri()), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(&body[..], b"<rss><channel/></rss>");
    assert_eq!(FeedParser::default().parse(&body).unwrap().count(), 0);
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client().fetch(&server.uri(), TIMEOUT).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client()
        .fetch(&server.uri(), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_connection_failure_is_a_transport_error() {
    let err = client()
        .fetch("http://127.0.0.1:1/rss.xml", TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_event_detail_url_is_expanded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geteventdata"))
        .and(wiremock::matchers::query_param("eventtype", "TC"))
        .and(wiremock::matchers::query_param("eventid", "1001"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let template = format!(
        "{}/geteventdata?eventtype={{eventtype}}&eventid={{eventid}}",
        server.uri()
    );
    let body = client()
        .fetch_event_detail(&template, "TC", "1001", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(&body[..], b"{}");
}
