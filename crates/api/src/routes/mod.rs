pub mod events;
pub mod health;
pub mod metrics;
pub mod products;
pub mod variants;

use axum::http::HeaderMap;
use domain::Claims;
use record_store::UpdateOutcome;
use serde::{Deserialize, Serialize};

/// Header carrying the caller's user name for `lastModifiedBy`.
pub const USER_HEADER: &str = "x-user";

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChangeRequest {
    pub stock_change: i64,
}

#[derive(Deserialize)]
pub struct PriceRequest {
    pub price: f64,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub message: &'static str,
    /// False when a newer write already holds the record.
    pub applied: bool,
}

impl WriteResponse {
    pub fn new(message: &'static str, outcome: &UpdateOutcome) -> Self {
        Self {
            message,
            applied: outcome.is_applied(),
        }
    }
}

/// Reads the caller's claims, defaulting to the system user.
pub fn claims(headers: &HeaderMap) -> Claims {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|username| Claims {
            username: username.to_string(),
        })
        .unwrap_or_default()
}
