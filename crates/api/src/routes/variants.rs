//! Variant write endpoints. Variants are read through their product.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use record_store::RecordStore;
use serde_json::{Map, Value};

use super::{PriceRequest, StockChangeRequest, WriteResponse, claims};
use crate::AppState;
use crate::error::ApiError;

/// PUT /products/:id/variants/:variant_id
#[tracing::instrument(skip(state, headers, body))]
pub async fn save<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, variant_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .save_variant(&id, &variant_id, body)
        .await?;

    Ok(Json(WriteResponse::new(
        "Product variant saved successfully",
        &outcome,
    )))
}

/// DELETE /products/:id/variants/:variant_id
#[tracing::instrument(skip(state, headers))]
pub async fn delete<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, variant_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .delete_variant(&id, &variant_id)
        .await?;

    Ok(Json(WriteResponse::new(
        "Product variant deleted successfully",
        &outcome,
    )))
}

/// PATCH /products/:id/variants/:variant_id/stock
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_stock<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, variant_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<StockChangeRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .update_variant_stock(&id, &variant_id, req.stock_change)
        .await?;

    Ok(Json(WriteResponse::new(
        "Product variant stock updated successfully",
        &outcome,
    )))
}

/// PATCH /products/:id/variants/:variant_id/price
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_price<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, variant_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<PriceRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .update_variant_price(&id, &variant_id, req.price)
        .await?;

    Ok(Json(WriteResponse::new(
        "Product variant price updated successfully",
        &outcome,
    )))
}
