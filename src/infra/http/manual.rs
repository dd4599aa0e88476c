use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::application::error::HttpError;

use super::HttpState;

const MANUAL_TRIGGER: &str = "manual-trigger";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ManualQuery {
    purge_cache: Option<String>,
}

/// Plain index; with `?purge_cache=1` and admin credentials it purges first
/// and renders a confirmation instead.
pub(super) async fn index(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<ManualQuery>,
) -> Response {
    let requested = query.purge_cache.as_deref() == Some("1");
    if !requested || !state.admin.is_admin(&headers) {
        return Html(INDEX_PAGE).into_response();
    }

    match state.trigger().purge_now(MANUAL_TRIGGER).await {
        Ok(()) => Html(confirmation_page()).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

const INDEX_PAGE: &str = "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>purgekeeper</title></head>\
<body><h1>purgekeeper</h1><p>Cache purge coordinator is running.</p></body></html>\n";

fn confirmation_page() -> String {
    let at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Cache purged</title></head>\
<body><h1>Cache purged</h1><p>All caches were purged at {at}.</p></body></html>\n"
    )
}
