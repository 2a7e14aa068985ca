//! REST API tests over a real TCP listener.

#![allow(clippy::panic)]

mod common;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use common::{TestServer, job_json, spawn_server};

const UID: &str = "x-user-uid";

async fn send(request: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let Ok(response) = request.send().await else {
        panic!("request sent");
    };
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

fn error_code(body: &Value) -> Option<u64> {
    body.get("error")
        .and_then(|e| e.get("code"))
        .and_then(Value::as_u64)
}

fn id_of(body: &Value) -> String {
    let Some(id) = body.get("id").and_then(Value::as_str) else {
        panic!("record has an id: {body}");
    };
    id.to_string()
}

async fn post_job(client: &Client, server: &TestServer, poster: &str) -> String {
    let (status, body) = send(
        client
            .post(server.url("/api/v1/jobs"))
            .header(UID, poster)
            .json(&job_json(12.90, 77.50)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    id_of(&body)
}

async fn post_bid(
    client: &Client,
    server: &TestServer,
    job_id: &str,
    bidder: &str,
    amount: f64,
) -> String {
    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/bids")))
            .header(UID, bidder)
            .json(&serde_json::json!({ "amount": amount })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    id_of(&body)
}

#[tokio::test]
async fn health_and_catalog() {
    let server = spawn_server().await;
    let client = Client::new();

    let (status, body) = send(client.get(server.url("/health"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("status"), Some(&Value::from("healthy")));

    let (status, body) = send(client.get(server.url("/config/categories"))).await;
    assert_eq!(status, StatusCode::OK);
    let Some(categories) = body.as_array() else {
        panic!("category array");
    };
    assert!(
        categories
            .iter()
            .any(|c| c.get("category") == Some(&Value::from("other")))
    );

    let (status, body) = send(client.get(server.url("/api-docs/openapi.json"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("paths").is_some());
}

#[tokio::test]
async fn identity_is_required() {
    let server = spawn_server().await;
    let client = Client::new();

    let (status, body) = send(
        client
            .post(server.url("/api/v1/jobs"))
            .json(&job_json(12.90, 77.50)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), Some(1002));

    let (status, _) = send(client.get(server.url("/api/v1/feed"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_input_maps_to_400() {
    let server = spawn_server().await;
    let client = Client::new();

    let mut inverted = job_json(12.90, 77.50);
    if let Some(range) = inverted.get_mut("bidRange") {
        *range = serde_json::json!({ "min": 500.0, "max": 100.0 });
    }
    let (status, body) = send(
        client
            .post(server.url("/api/v1/jobs"))
            .header(UID, "poster")
            .json(&inverted),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some(1001));

    let (status, body) = send(
        client
            .get(server.url("/api/v1/feed?lat=12.9"))
            .header(UID, "viewer"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some(1001));
}

#[tokio::test]
async fn bid_and_accept_over_http() {
    let server = spawn_server().await;
    let client = Client::new();

    let job_id = post_job(&client, &server, "poster").await;

    let (status, feed) = send(
        client
            .get(server.url("/api/v1/feed?lat=12.95&lon=77.50"))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feed.as_array().map(Vec::len), Some(1));

    let bid_a = post_bid(&client, &server, &job_id, "alice", 200.0).await;
    let bid_b = post_bid(&client, &server, &job_id, "bob", 180.0).await;

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/bids")))
            .header(UID, "poster")
            .json(&serde_json::json!({ "amount": 150.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), Some(1003));

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/bids/{bid_a}/accept")))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/bids/{bid_a}/accept")))
            .header(UID, "poster"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let job = body.get("job").cloned().unwrap_or(Value::Null);
    assert_eq!(job.get("status"), Some(&Value::from("assigned")));
    assert_eq!(job.get("assignedBidderUid"), Some(&Value::from("alice")));
    assert_eq!(
        body.get("rejectedBidIds"),
        Some(&serde_json::json!([bid_b.clone()]))
    );

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/bids/{bid_b}/accept")))
            .header(UID, "poster"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), Some(2004));

    let (status, bids) = send(
        client
            .get(server.url(&format!("/api/v1/jobs/{job_id}/bids")))
            .header(UID, "bob"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let Some(own) = bids.as_array() else {
        panic!("bid array");
    };
    assert_eq!(own.len(), 1);
    assert_eq!(
        own.first().and_then(|b| b.get("status")),
        Some(&Value::from("rejected"))
    );

    let (status, home) = send(
        client
            .get(server.url("/api/v1/home"))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(home.get("bidderBanner").is_some_and(|b| !b.is_null()));
}

#[tokio::test]
async fn completion_payment_and_history() {
    let server = spawn_server().await;
    let client = Client::new();

    let job_id = post_job(&client, &server, "poster").await;
    let bid = post_bid(&client, &server, &job_id, "alice", 250.0).await;
    let (status, _) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/bids/{bid}/accept")))
            .header(UID, "poster"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/payment")))
            .header(UID, "poster"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error_code(&body), Some(2003));

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/completion")))
            .header(UID, "alice")
            .json(&serde_json::json!({ "completionImageUrl": "https://img.example/done.jpg" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body.get("status"), Some(&Value::from("completed")));

    let (status, body) = send(
        client
            .post(server.url(&format!("/api/v1/jobs/{job_id}/payment")))
            .header(UID, "poster"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("status"), Some(&Value::from("paid")));

    let (status, history) = send(
        client
            .get(server.url("/api/v1/me/history"))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().map(Vec::len), Some(1));

    let (status, mine) = send(
        client
            .get(server.url("/api/v1/me/bids"))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first = mine.as_array().and_then(|bids| bids.first());
    assert_eq!(
        first.and_then(|b| b.get("bid")).and_then(|b| b.get("status")),
        Some(&Value::from("accepted"))
    );
}

#[tokio::test]
async fn delete_rules_over_http() {
    let server = spawn_server().await;
    let client = Client::new();

    let job_id = post_job(&client, &server, "poster").await;
    post_bid(&client, &server, &job_id, "alice", 120.0).await;

    let (status, _) = send(
        client
            .delete(server.url(&format!("/api/v1/jobs/{job_id}")))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        client
            .delete(server.url(&format!("/api/v1/jobs/{job_id}")))
            .header(UID, "poster"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("removedBids"), Some(&Value::from(1)));

    let (status, body) = send(client.get(server.url(&format!("/api/v1/jobs/{job_id}")))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some(2001));
    assert_eq!(server.state.market_service.my_jobs(&"poster".into()).await.ok(), Some(Vec::new()));
}

#[tokio::test]
async fn malformed_requests_get_structured_400() {
    let server = spawn_server().await;
    let client = Client::new();

    let mut missing = job_json(12.90, 77.50);
    if let Some(fields) = missing.as_object_mut() {
        fields.remove("description");
    }
    let (status, body) = send(
        client
            .post(server.url("/api/v1/jobs"))
            .header(UID, "poster")
            .json(&missing),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), Some(1001));

    let mut negative = job_json(12.90, 77.50);
    if let Some(radius) = negative.get_mut("radiusKm") {
        *radius = Value::from(-5);
    }
    let (status, body) = send(
        client
            .post(server.url("/api/v1/jobs"))
            .header(UID, "poster")
            .json(&negative),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), Some(1001));

    let (status, body) = send(client.get(server.url("/api/v1/jobs/not-a-uuid"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(error_code(&body), Some(1001));
}

#[tokio::test]
async fn profiles_over_http() {
    let server = spawn_server().await;
    let client = Client::new();

    let (status, body) = send(
        client
            .get(server.url("/api/v1/me/profile"))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some(2005));

    let (status, body) = send(
        client
            .put(server.url("/api/v1/me/profile"))
            .header(UID, "alice")
            .json(&serde_json::json!({
                "displayName": "Alice",
                "about": "Quick with deliveries",
                "professions": ["delivery"],
                "employmentStatus": "student",
                "organizationName": "IISc",
            })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body.get("professions"), Some(&serde_json::json!(["Delivery"])));
    assert_eq!(body.get("isVerified"), Some(&Value::from(false)));

    let (status, body) = send(
        client
            .put(server.url("/api/v1/me/profile"))
            .header(UID, "alice")
            .json(&serde_json::json!({ "displayName": "Alice", "about": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), Some(1001));

    let (status, body) = send(
        client
            .get(server.url("/api/v1/me/profile"))
            .header(UID, "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("organizationName"), Some(&Value::from("IISc")));

    let (status, body) = send(client.get(server.url("/api/v1/users/alice"))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        body.get("profile").and_then(|p| p.get("displayName")),
        Some(&Value::from("Alice"))
    );
    assert_eq!(
        body.get("workHistory").and_then(Value::as_array).map(Vec::len),
        Some(0)
    );

    let (status, body) = send(client.get(server.url("/api/v1/users/nobody"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some(2005));
}
