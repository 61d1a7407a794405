use axum::{extract::State, Extension, Json};
use serde::Serialize;

use prospekt_core::ListingFormat;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct RetailerItem {
    key: String,
    name: String,
    listing_url: String,
    format: ListingFormat,
    max_pages: usize,
}

pub(super) async fn list_retailers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<RetailerItem>>> {
    let data = state
        .pipeline
        .registry()
        .sources()
        .iter()
        .map(|source| RetailerItem {
            key: source.key.clone(),
            name: source.name.clone(),
            listing_url: source.listing_url.clone(),
            format: source.format,
            max_pages: source.max_pages,
        })
        .collect();

    Json(ApiResponse::new(req_id.0, data))
}
