use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::application::error::HttpError;

use super::HttpState;

#[derive(Debug, Serialize)]
pub(super) struct CompatibilityList {
    compatibilities: Vec<String>,
}

pub(super) async fn list_compatibilities(State(state): State<HttpState>) -> Json<CompatibilityList> {
    Json(CompatibilityList {
        compatibilities: state.compat.names(),
    })
}

pub(super) async fn clear_compatibility(
    State(state): State<HttpState>,
    Path(name): Path<String>,
) -> Result<StatusCode, HttpError> {
    state.compat.clear(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
