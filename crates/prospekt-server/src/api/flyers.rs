use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use serde::Deserialize;

use prospekt_core::{FlyerListing, FlyerResult};

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct DetectionsQuery {
    pub confidence: Option<f32>,
}

pub(super) async fn list_flyers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<Vec<FlyerListing>>>, ApiError> {
    let flyers = state
        .pipeline
        .list_flyers(&key)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, flyers)))
}

pub(super) async fn get_detections(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    path: Result<Path<(String, usize)>, PathRejection>,
    query: Result<Query<DetectionsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<FlyerResult>>, ApiError> {
    let Path((key, ordinal)) = path.map_err(|e| validation_error(&req_id, e.body_text()))?;
    let Query(query) = query.map_err(|e| validation_error(&req_id, e.body_text()))?;

    let confidence = query.confidence.unwrap_or(state.default_confidence);
    if !(0.0..=1.0).contains(&confidence) {
        return Err(validation_error(
            &req_id,
            format!("confidence must be within [0, 1], got {confidence}"),
        ));
    }

    let result = state
        .pipeline
        .run(&key, ordinal, confidence)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(req_id.0, result)))
}

fn validation_error(req_id: &RequestId, message: String) -> ApiError {
    ApiError::new(req_id.0.clone(), "validation_error", message)
}
