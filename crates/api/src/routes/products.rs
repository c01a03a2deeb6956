//! Product read and write endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use projections::{Aggregate, ListQuery};
use record_store::{QueryPage, RecordStore};
use serde_json::{Map, Value};

use super::{PriceRequest, StockChangeRequest, WriteResponse, claims};
use crate::AppState;
use crate::error::ApiError;

/// GET /products: list live products, paginated.
#[tracing::instrument(skip(state))]
pub async fn list<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<QueryPage<Map<String, Value>>>, ApiError> {
    Ok(Json(state.catalog.list(query).await?))
}

/// GET /products/category/:category: list live products of one category.
#[tracing::instrument(skip(state))]
pub async fn list_category<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(category): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<QueryPage<Map<String, Value>>>, ApiError> {
    Ok(Json(state.catalog.list_category(&category, query).await?))
}

/// GET /products/:id: the product with its variants.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Aggregate>, ApiError> {
    state
        .catalog
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// PUT /products/:id: create or replace a product and the listed variants.
#[tracing::instrument(skip(state, headers, body))]
pub async fn save<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcomes = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .save_product(&id, body)
        .await?;

    Ok(Json(WriteResponse {
        message: "Product saved successfully",
        applied: outcomes.iter().all(|o| o.is_applied()),
    }))
}

/// DELETE /products/:id: tombstone a product.
#[tracing::instrument(skip(state, headers))]
pub async fn delete<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .delete_product(&id)
        .await?;

    Ok(Json(WriteResponse::new(
        "Product deleted successfully",
        &outcome,
    )))
}

/// PATCH /products/:id/stock: add `stockChange` to the stock level.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_stock<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StockChangeRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .update_product_stock(&id, req.stock_change)
        .await?;

    Ok(Json(WriteResponse::new(
        "Product stock updated successfully",
        &outcome,
    )))
}

/// PATCH /products/:id/price: set the price.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_price<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PriceRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let outcome = state
        .products
        .clone()
        .with_claims(claims(&headers))
        .update_product_price(&id, req.price)
        .await?;

    Ok(Json(WriteResponse::new(
        "Product price updated successfully",
        &outcome,
    )))
}
