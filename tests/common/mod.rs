//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geofeed_gateway::api;
use geofeed_gateway::app_state::AppState;
use geofeed_gateway::domain::{
    BidRange, Category, Coordinates, EventBus, JobLocation, NewBid, NewJob,
};
use geofeed_gateway::service::MarketService;
use geofeed_gateway::store::InMemoryStore;

/// A marketplace over a fresh in-memory store.
#[must_use]
pub fn service() -> MarketService {
    MarketService::new(Arc::new(InMemoryStore::new()), EventBus::new(256), 100)
}

/// An open job at `(latitude, longitude)` with a 10 km radius, expiring in
/// two hours.
#[must_use]
pub fn job_at(latitude: f64, longitude: f64) -> NewJob {
    NewJob {
        category: Category::Delivery,
        description: "carry groceries upstairs".to_string(),
        details: None,
        image_url: "https://img.example/groceries.jpg".to_string(),
        bid_range: BidRange {
            min: 100.0,
            max: 500.0,
        },
        location: JobLocation::Current {
            coords: Some(Coordinates {
                latitude,
                longitude,
            }),
        },
        radius_km: 10,
        expires_at: Utc::now() + chrono::Duration::hours(2),
    }
}

/// A bid offering `amount` with no message.
#[must_use]
pub fn offer(amount: f64) -> NewBid {
    NewBid {
        amount,
        message: None,
    }
}

/// A running server on an ephemeral port.
#[derive(Debug)]
pub struct TestServer {
    /// Bound address.
    pub addr: SocketAddr,
    /// State shared with the server.
    pub state: AppState,
}

impl TestServer {
    /// `http://{addr}{path}`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// `ws://{addr}/ws`.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Serves the full application on `127.0.0.1:0`.
pub async fn spawn_server() -> TestServer {
    let state = AppState::new(service());
    let app = api::app(state.clone(), Duration::from_secs(5));
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind test listener");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener address");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    TestServer { addr, state }
}

/// JSON body for `POST /api/v1/jobs` at `(latitude, longitude)`.
#[must_use]
pub fn job_json(latitude: f64, longitude: f64) -> serde_json::Value {
    serde_json::json!({
        "category": "delivery",
        "description": "carry groceries upstairs",
        "imageUrl": "https://img.example/groceries.jpg",
        "bidRange": { "min": 100.0, "max": 500.0 },
        "location": {
            "type": "current",
            "coords": { "latitude": latitude, "longitude": longitude }
        },
        "radiusKm": 10,
        "expiresAt": (Utc::now() + chrono::Duration::hours(2)).to_rfc3339(),
    })
}
