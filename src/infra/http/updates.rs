use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    application::error::{HttpError, codes},
    updater::{InstallResult, ReleaseUpdater, UpdateCheck},
};

use super::HttpState;

const SOURCE: &str = "infra::http::updates";

#[derive(Debug, Deserialize)]
pub(super) struct InfoQuery {
    action: String,
    slug: String,
}

fn updater(state: &HttpState) -> Result<&Arc<ReleaseUpdater>, HttpError> {
    state.updater.as_ref().ok_or_else(|| {
        HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Updater disabled",
            "updater.enabled is false",
        )
    })
}

pub(super) async fn check_update(
    State(state): State<HttpState>,
    Json(check): Json<UpdateCheck>,
) -> Result<Json<UpdateCheck>, HttpError> {
    let updater = updater(&state)?;
    Ok(Json(updater.check_update(check).await))
}

pub(super) async fn plugin_info(
    State(state): State<HttpState>,
    Query(query): Query<InfoQuery>,
) -> Result<Response, HttpError> {
    let updater = updater(&state)?;
    let response = match updater.plugin_info(&query.action, &query.slug).await {
        Some(info) => Json(info).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    Ok(response)
}

pub(super) async fn after_install(
    State(state): State<HttpState>,
    Json(result): Json<InstallResult>,
) -> Result<Json<InstallResult>, HttpError> {
    let updater = updater(&state)?;
    Ok(Json(updater.after_install(result).await?))
}
