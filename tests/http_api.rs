//! HTTP surface end to end: SDK, raw requests, and the schema websocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use gateway_registry::config::ListenerConfig;
use gateway_registry::http::{AppState, HttpServer};
use gateway_registry::lifecycle::Shutdown;
use gateway_registry::sync::{ChangeFeed, SchemaBroadcast, SchemaSyncPipeline};
use registry_sdk::{PublishedSdl, RegistryClient};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

mod common;
use common::Harness;

const API_KEY: &str = "s3cret";

struct TestServer {
    addr: SocketAddr,
    harness: Harness,
    shutdown: Shutdown,
}

impl TestServer {
    async fn start(api_key: Option<&str>) -> Self {
        let harness = Harness::new();
        let schema = SchemaBroadcast::new();
        let shutdown = Shutdown::new();

        let snapshots =
            ChangeFeed::new(harness.repository().clone(), Duration::from_millis(25), false).spawn(shutdown.subscribe());
        tokio::spawn(SchemaSyncPipeline::new(schema.clone()).run(snapshots));

        let state = AppState {
            registry: harness.registry.clone(),
            schema,
            admin_api_key: api_key.map(Arc::from),
            backend: "recording",
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(HttpServer::new(&ListenerConfig::default(), state).run(listener, shutdown.signalled()));

        Self {
            addr,
            harness,
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn client(&self) -> RegistryClient {
        RegistryClient::new(&self.url("")).with_api_key(API_KEY)
    }

    async fn wait_for_schema(&self, sdl: &str) -> PublishedSdl {
        let client = self.client();
        for _ in 0..100 {
            if let Some(published) = client.schema().await.unwrap() {
                if published.sdl == sdl {
                    return published;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("schema never published: {}", sdl);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

async fn next_frame<S>(socket: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

fn schema_input(name: &str, sdl: &str) -> Value {
    json!([{ "metadata": { "namespace": "ns", "name": name }, "schema": sdl }])
}

#[tokio::test]
async fn test_update_then_read_merged_schema() {
    let server = TestServer::start(Some(API_KEY)).await;
    let client = server.client();

    assert_eq!(client.schema().await.unwrap(), None);

    client
        .execute("updateSchemas", &schema_input("a", "type Query { a: String }"))
        .await
        .unwrap();
    client
        .execute("updateSchemas", &schema_input("b", "type Query { b: String }"))
        .await
        .unwrap();

    let published = server.wait_for_schema("type Query {\n  a: String\n  b: String\n}").await;
    let sequence = published.sequence.unwrap();

    let status = client.status().await.unwrap();
    assert_eq!(status["backend"], "recording");
    assert_eq!(status["schema"]["sequence"], sequence);
    assert_eq!(status["schema"]["version"]["generation"], 2);
}

#[tokio::test]
async fn test_mutations_require_the_api_key() {
    let server = TestServer::start(Some(API_KEY)).await;
    let anonymous = RegistryClient::new(&server.url(""));

    let err = anonymous
        .execute("updateSchemas", &schema_input("a", "type Query { a: String }"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some("Unauthorized"));
    assert!(anonymous.status().await.is_err());

    // Dry runs stay open.
    anonymous
        .execute("validateSchemas", &schema_input("a", "type Query { a: String }"))
        .await
        .unwrap();
    assert!(server.harness.store.events().is_empty());
}

#[tokio::test]
async fn test_error_kinds_and_status_codes() {
    let server = TestServer::start(None).await;
    let http = reqwest::Client::new();

    let unknown = http
        .post(server.url("/api/v1/frobnicateSchemas"))
        .json(&json!({ "input": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "UnknownOperation");

    let compile = http
        .post(server.url("/api/v1/updatePolicies"))
        .json(&json!({ "input": [
            { "metadata": { "namespace": "ns", "name": "p" }, "type": "opa", "code": "syntax error" }
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(compile.status(), 422);
    let body: Value = compile.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "CompileError");

    let malformed = http
        .post(server.url("/api/v1/updateSchemas"))
        .json(&json!({ "input": { "not": "a list" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);

    let missing = http
        .post(server.url("/api/v1/deletePolicies"))
        .json(&json!({ "input": [{ "namespace": "ns", "name": "ghost" }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 400);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "ValidationError");
}

#[tokio::test]
async fn test_responses_carry_a_request_id() {
    let server = TestServer::start(None).await;
    let resp = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().contains_key("x-request-id"));

    let resp = reqwest::Client::new()
        .get(server.url("/health"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "trace-me");
}

#[tokio::test]
async fn test_websocket_replays_latest_then_streams() {
    let server = TestServer::start(None).await;
    let client = server.client();
    client
        .execute("updateSchemas", &schema_input("a", "type Query { a: String }"))
        .await
        .unwrap();
    server.wait_for_schema("type Query {\n  a: String\n}").await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/api/v1/schema/subscribe", server.addr))
        .await
        .unwrap();

    let replayed = next_frame(&mut socket).await;
    assert_eq!(replayed["sequence"], 1);
    assert_eq!(replayed["sdl"], "type Query {\n  a: String\n}");

    client
        .execute("updateSchemas", &schema_input("b", "type Query { b: Int }"))
        .await
        .unwrap();
    let live = next_frame(&mut socket).await;
    assert_eq!(live["sequence"], 2);
    assert_eq!(live["version"]["generation"], 2);
}

#[tokio::test]
async fn test_admin_reconcile_reports_work() {
    let server = TestServer::start(Some(API_KEY)).await;
    let client = server.client();

    server.harness.store.fail_attachment_writes(true);
    let policies = json!([{ "metadata": { "namespace": "ns", "name": "p" }, "type": "opa", "code": "package p" }]);
    let err = client.execute("updatePolicies", &policies).await.unwrap_err();
    assert_eq!(err.kind(), Some("StorageError"));

    server.harness.store.fail_attachment_writes(false);
    let report = client.reconcile().await.unwrap();
    assert_eq!(report["regenerated"], json!(["ns.p.tar.gz"]));
}
