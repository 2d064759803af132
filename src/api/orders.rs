use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::error::ApiError;
use super::extract::CallerIdentity;
use super::AppState;
use crate::domain::aggregates::{Order, OrderUpdate};
use crate::domain::value_objects::OrderId;
use crate::services::{CheckoutRequest, OrderPage};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn create_order(
    State(s): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    Json(r): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let placement = s.orders.create_order(&identity, r).await?;
    Ok((StatusCode::CREATED, Json(placement.order)))
}

pub async fn list_orders(
    State(s): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
) -> Result<Json<Vec<Order>>, ApiError> {
    let customer_id = identity.require_customer()?;
    Ok(Json(s.orders.list_orders(&identity, customer_id).await?))
}

pub async fn get_order(
    State(s): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.orders.get_order(&identity, id).await?))
}

pub async fn update_order_status(
    State(s): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    Path(id): Path<OrderId>,
    Json(r): Json<OrderUpdate>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.orders.update_order_status(&identity, id, r).await?))
}

pub async fn admin_list_orders(
    State(s): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    Query(p): Query<ListParams>,
) -> Result<Json<OrderPage>, ApiError> {
    let page = p.page.unwrap_or(1);
    let per_page = p.per_page.unwrap_or(20);
    Ok(Json(s.orders.list_all_orders(&identity, page, per_page).await?))
}
