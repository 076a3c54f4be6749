use std::collections::HashMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};

use shelfline_api::app::{build_app, services};
use shelfline_infra::Config;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    async fn spawn_with(overrides: &[(&str, &str)]) -> Self {
        let mut env: HashMap<String, String> = [
            ("SHELFLINE_IN_MEMORY", "true"),
            ("RATE_LIMIT", "10000"),
            ("CONSUMER_MAX_WAIT", "10ms"),
            ("CONSUMER_RETRY_BACKOFF", "10ms"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in overrides {
            env.insert(k.to_string(), v.to_string());
        }
        let config = Config::from_lookup(|key| env.get(key).cloned()).expect("valid config");

        // Same router as prod with in-memory collaborators, on an ephemeral port.
        let wiring = services::in_memory(&config);
        let app = build_app(wiring.services.clone(), &config.server);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            let _consumer = wiring.consumer;
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn headwear(name: &str, price: f64) -> Value {
    json!({
        "name": name,
        "weight": 0.2,
        "unit": "piece",
        "color": "red",
        "type": "clothing_headwear",
        "price": price,
        "attributes": { "size": "M", "head_circumference": 56.0 }
    })
}

fn food(name: &str) -> Value {
    json!({
        "name": name,
        "weight": 1.0,
        "unit": "kg",
        "color": "",
        "type": "food",
        "price": 3.5,
        "attributes": { "expiry_date": (Utc::now() + ChronoDuration::days(30)).to_rfc3339() }
    })
}

async fn create(client: &reqwest::Client, srv: &TestServer, body: &Value) -> Value {
    let res = client
        .post(srv.url("/api/v1/products"))
        .json(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    res.json().await.unwrap()
}

/// The write path is asynchronous: poll the list until it holds `expected` products.
async fn list_eventually(client: &reqwest::Client, srv: &TestServer, expected: u64) -> Value {
    for _ in 0..100 {
        let body: Value = client
            .get(srv.url("/api/v1/products"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if body["total"].as_u64() == Some(expected) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("list did not reach {expected} products within timeout");
}

async fn get_eventually<F>(client: &reqwest::Client, srv: &TestServer, id: i64, done: F) -> reqwest::Response
where
    F: Fn(&reqwest::Response) -> bool,
{
    for _ in 0..100 {
        let res = client
            .get(srv.url(&format!("/api/v1/products/{id}")))
            .send()
            .await
            .unwrap();
        if done(&res) {
            return res;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("product {id} did not reach the expected state within timeout");
}

#[tokio::test]
async fn health_reports_dependency_checks() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"], "ok");
    assert_eq!(body["checks"]["cache"], "ok");

    let res = client.get(srv.url("/health/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["log"], "ok");
}

#[tokio::test]
async fn create_is_accepted_then_becomes_readable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let accepted = create(&client, &srv, &headwear("Wool cap", 19.99)).await;
    assert_eq!(accepted["id"], 0);
    assert_eq!(accepted["status"], "processing");
    assert!(accepted["event_id"].as_str().is_some());

    let page = list_eventually(&client, &srv, 1).await;
    assert_eq!(page["limit"], 25);
    assert_eq!(page["offset"], 0);
    let id = page["products"][0]["id"].as_i64().unwrap();
    assert!(id > 0);

    let res = client
        .get(srv.url(&format!("/api/v1/products/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["name"], "Wool cap");
    assert_eq!(product["type"], "clothing_headwear");
    assert_eq!(product["attributes"]["head_circumference"], 56.0);
}

#[tokio::test]
async fn update_and_delete_are_applied_asynchronously() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    create(&client, &srv, &headwear("Wool cap", 19.99)).await;
    let page = list_eventually(&client, &srv, 1).await;
    let id = page["products"][0]["id"].as_i64().unwrap();

    let res = client
        .put(srv.url(&format!("/api/v1/products/{id}")))
        .json(&headwear("Wool cap", 24.5))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: Value = res.json().await.unwrap();
    assert_eq!(accepted["id"], id);

    let res = get_eventually(&client, &srv, id, |r| r.status() == StatusCode::OK).await;
    let mut product: Value = res.json().await.unwrap();
    for _ in 0..100 {
        if product["price"] == 24.5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        product = client
            .get(srv.url(&format!("/api/v1/products/{id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    }
    assert_eq!(product["price"], 24.5);

    let res = client
        .delete(srv.url(&format!("/api/v1/products/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    get_eventually(&client, &srv, id, |r| r.status() == StatusCode::NOT_FOUND).await;
    list_eventually(&client, &srv, 0).await;
}

#[tokio::test]
async fn validation_failures_are_rejected_synchronously() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut body = headwear("Wool cap", 19.99);
    body["unit"] = json!("kg");
    let res = client
        .post(srv.url("/api/v1/products"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "validation_error");
    assert!(err["message"].as_str().unwrap().contains("pieces"));

    let mut body = headwear("Wool cap", 19.99);
    body["type"] = json!("spaceship");
    let res = client
        .put(srv.url("/api/v1/products/5"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/v1/products"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_request");

    for bad in ["abc", "0", "-4"] {
        let res = client
            .get(srv.url(&format!("/api/v1/products/{bad}")))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "id {bad}");
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "invalid_id");
    }
}

#[tokio::test]
async fn unknown_product_is_not_found_but_delete_is_accepted() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/api/v1/products/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "not_found");

    let res = client
        .delete(srv.url("/api/v1/products/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn list_filters_by_type_and_price() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    create(&client, &srv, &headwear("Wool cap", 19.99)).await;
    create(&client, &srv, &food("Rye bread")).await;
    list_eventually(&client, &srv, 2).await;

    let page: Value = client
        .get(srv.url("/api/v1/products?type=food"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["products"][0]["name"], "Rye bread");

    let page: Value = client
        .get(srv.url("/api/v1/products?min_price=10&limit=500"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 25);
    assert_eq!(page["products"][0]["name"], "Wool cap");

    let page: Value = client
        .get(srv.url("/api/v1/products?type=spaceship"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/health"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-me");

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn global_rate_limit_returns_429() {
    let srv = TestServer::spawn_with(&[("RATE_LIMIT", "1")]).await;
    let client = reqwest::Client::new();

    let first = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let err: Value = second.json().await.unwrap();
    assert_eq!(err["error"], "rate_limit_exceeded");
}
