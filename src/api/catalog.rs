//! Catalog-facing endpoints, all filtered through the access tier.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

use super::error::ApiError;
use super::extract::CallerIdentity;
use super::orders::ListParams;
use super::AppState;
use crate::domain::access::{StoreAccessMode, Visibility};
use crate::domain::value_objects::{Money, ProductId, VariantId};
use crate::store::CatalogItem;
use crate::EcommerceError;

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub mode: StoreAccessMode,
    #[serde(flatten)]
    pub visibility: Visibility,
}

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub image_ref: Option<String>,
    /// Absent when the caller's tier hides prices.
    pub price: Option<Money>,
}

impl CatalogEntry {
    fn new(item: CatalogItem, visibility: Visibility) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            name: item.name,
            image_ref: item.image_ref,
            price: visibility.show_prices.then_some(item.price),
        }
    }
}

pub async fn access_tier(State(s): State<AppState>, CallerIdentity(identity): CallerIdentity) -> Json<AccessResponse> {
    Json(AccessResponse {
        mode: s.access_mode,
        visibility: Visibility::resolve(s.access_mode, identity.is_authenticated()),
    })
}

pub async fn list_products(
    State(s): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    Query(p): Query<ListParams>,
) -> Result<Json<Vec<CatalogEntry>>, ApiError> {
    let visibility = Visibility::resolve(s.access_mode, identity.is_authenticated());
    if !visibility.show_catalog {
        return Err(EcommerceError::Forbidden.into());
    }
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).clamp(1, 100);
    let items = s.catalog.list_products(per_page, (page - 1).saturating_mul(per_page)).await?;
    Ok(Json(items.into_iter().map(|item| CatalogEntry::new(item, visibility)).collect()))
}
