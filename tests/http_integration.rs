use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use remote_joiner::api::routes::create_router;
use remote_joiner::{seed, HttpFetcher, InMemoryFetcher, RemoteFetcher, RemoteJoiner, SubQuery};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(&format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }
}

/// Stand-in for the remote services: answers each sub-query from in-memory records
async fn answer_sub_query(
    Path(service): Path<String>,
    State(records): State<Arc<InMemoryFetcher>>,
    Json(query): Json<SubQuery>,
) -> Result<Json<Value>, StatusCode> {
    let found = records
        .fetch(&service, &query)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // products answers with a bare array, everything else wraps in `data`
    if service == "products" {
        Ok(Json(json!(found)))
    } else {
        Ok(Json(json!({ "data": found })))
    }
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Starts the upstream services and a joiner that reaches them over HTTP
async fn start(upstream: InMemoryFetcher) -> (TestClient, Arc<InMemoryFetcher>) {
    let upstream = Arc::new(upstream);
    let upstream_addr = spawn(
        Router::new()
            .route("/:service", post(answer_sub_query))
            .with_state(upstream.clone()),
    )
    .await;

    let endpoints: HashMap<String, String> = seed::demo_registry()
        .unwrap()
        .services()
        .map(|s| {
            (
                s.service_name.clone(),
                format!("http://{}/{}", upstream_addr, s.service_name),
            )
        })
        .collect();

    let joiner = RemoteJoiner::new(
        Arc::new(seed::demo_registry().unwrap()),
        Arc::new(HttpFetcher::new(endpoints)),
    );
    let addr = spawn(create_router().with_state(Arc::new(joiner))).await;

    (TestClient::new(format!("http://{}", addr)), upstream)
}

#[tokio::test]
async fn test_joins_across_http_services() {
    let (client, upstream) = start(seed::demo_fetcher()).await;

    let response = client
        .post(
            "/query",
            json!({
                "service": "orders",
                "fields": ["id", "status"],
                "args": [{"name": "status", "value": "completed"}],
                "expands": [
                    {"property": "items", "fields": ["quantity"]},
                    {"property": "items.product", "fields": ["sku"]},
                    {"property": "customer", "fields": ["email"]}
                ]
            }),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!([
            {
                "id": "ord_01",
                "status": "completed",
                "items": [
                    {"quantity": 2, "product": {"sku": "CUP-ESP"}},
                    {"quantity": 1, "product": {"sku": "JUG-MLK"}}
                ],
                "customer": {"email": "ada@example.com"}
            },
            {
                "id": "ord_03",
                "status": "completed",
                "items": [{"quantity": 3, "product": {"sku": "GRN-001"}}],
                "customer": {"email": "linus@example.com"}
            }
        ])
    );

    // One request per service, keys deduplicated across parents
    assert_eq!(upstream.calls_for("order-items").len(), 1);
    assert_eq!(upstream.calls_for("products").len(), 1);
    let customers = upstream.calls_for("customers");
    assert_eq!(customers.len(), 1);
    let (_, keys) = customers[0].query.key_filter().unwrap();
    assert_eq!(keys, &[json!("cus_01"), json!("cus_02")]);
}

#[tokio::test]
async fn test_upstream_error_surfaces_as_bad_gateway() {
    let (client, _) = start(seed::demo_fetcher().with_failure("products", "maintenance")).await;

    let response = client
        .post(
            "/query",
            json!({
                "service": "order-items",
                "fields": ["id"],
                "expands": {"product": {"fields": ["title"]}, "order": {"fields": ["total"]}}
            }),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["failures"].as_array().unwrap().len(), 1);
    assert_eq!(body["failures"][0]["path"], "product");
    assert!(body["failures"][0]["error"]
        .as_str()
        .unwrap()
        .contains("error status"));
}

#[tokio::test]
async fn test_services_listing_over_http() {
    let (client, _) = start(seed::demo_fetcher()).await;

    let response = client.get("/services").await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 5);
}
