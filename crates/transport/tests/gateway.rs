//! Integration tests for the gateway backend against a mock HTTP server.

use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nimbus_transport::{connect, ConnectionProfile, Transport, TransportError};

const SESSION: &str = "sess-12345";

async fn mock_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("username=alice"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "auth": true,
                "sessionid": SESSION,
            })),
        )
        .mount(server)
        .await;
}

fn profile(server: &MockServer) -> ConnectionProfile {
    ConnectionProfile::Gateway {
        base_url: server.uri(),
        host: "cluster-a".to_string(),
        username: "alice".to_string(),
        password: "secret".to_string(),
    }
}

async fn open(server: &MockServer) -> Box<dyn Transport> {
    connect(&profile(server), Duration::from_secs(5))
        .await
        .expect("gateway session")
}

#[tokio::test]
async fn login_failure_is_permission_denied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "auth": false })),
        )
        .mount(&server)
        .await;

    let err = connect(&profile(&server), Duration::from_secs(5))
        .await
        .err()
        .expect("rejected credentials");
    assert_matches!(err, TransportError::PermissionDenied(_));
}

#[tokio::test]
async fn execute_sends_session_cookie_and_returns_output() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/command/cluster-a"))
        .and(header("cookie", format!("sessionid={SESSION}").as_str()))
        .and(body_string_contains("executable=echo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "output": "hello\n",
            "error": "",
        })))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    let output = conn.execute("echo hello").await.unwrap();
    assert_eq!(output, "hello");
}

#[tokio::test]
async fn failed_command_carries_exit_code_and_stderr() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/command/cluster-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 2,
            "output": "",
            "error": "no such option",
        })))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    let err = conn.execute("qsub --bogus").await.expect_err("nonzero");
    assert_matches!(
        err,
        TransportError::CommandFailed { exit_code: 2, stderr } if stderr == "no such option"
    );
}

#[tokio::test]
async fn expired_session_maps_to_closed() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/command/cluster-a"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    assert_matches!(conn.execute("true").await, Err(TransportError::Closed));
}

#[tokio::test]
async fn forbidden_maps_to_permission_denied() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/file/cluster-a/etc/shadow"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    let err = conn.stat("/etc/shadow").await.expect_err("forbidden");
    assert_matches!(err, TransportError::PermissionDenied(_));
}

#[tokio::test]
async fn stat_parses_size_and_directory_flag() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/file/cluster-a/home/alice/run"))
        .and(query_param("view", "stat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "size": 0,
            "directory": true,
        })))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    let stat = conn.stat("/home/alice/run").await.unwrap();
    assert!(stat.is_dir);
    assert!(!conn.isfile("/home/alice/run").await.unwrap());
}

#[tokio::test]
async fn stat_missing_path_is_not_found_with_the_requested_path() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/file/cluster-a/no/such"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    let err = conn.stat("/no/such").await.expect_err("absent");
    assert_matches!(err, TransportError::NotFound(p) if p == "/no/such");
    assert!(!conn.isfile("/no/such").await.unwrap());
}

#[tokio::test]
async fn get_streams_file_content() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    let body: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
    Mock::given(method("GET"))
        .and(path("/file/cluster-a/data/blob.bin"))
        .and(query_param("view", "read"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    let fetched = conn
        .get("/data/blob.bin")
        .await
        .unwrap()
        .read_to_end()
        .await
        .unwrap();
    assert_eq!(fetched, body);
}

#[tokio::test]
async fn put_posts_multipart_to_the_file_resource() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/file/cluster-a/home/alice/job.sh"))
        .and(header("cookie", format!("sessionid={SESSION}").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    conn.put(b"#!/bin/sh\necho hi\n", "/home/alice/job.sh")
        .await
        .unwrap();
}

#[tokio::test]
async fn remove_deletes_via_the_file_resource() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/file/cluster-a/tmp/old.log"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    conn.remove("/tmp/old.log").await.unwrap();
}

#[tokio::test]
async fn malformed_command_response_is_a_protocol_error() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/command/cluster-a"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    assert_matches!(conn.execute("true").await, Err(TransportError::Protocol(_)));
}

#[tokio::test]
async fn unmapped_error_status_carries_the_code() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/command/cluster-a"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    assert_matches!(
        conn.execute("true").await,
        Err(TransportError::Gateway { status: 502, .. })
    );
}

#[tokio::test]
async fn close_logs_out_and_further_calls_fail_closed() {
    let server = MockServer::start().await;
    mock_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .and(header("cookie", format!("sessionid={SESSION}").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut conn = open(&server).await;
    conn.close().await.unwrap();
    assert_matches!(conn.execute("true").await, Err(TransportError::Closed));
}
