use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    application::error::{HttpError, codes},
    purge::{
        bindings::{DispatchOutcome, HostEvent},
        scheduler::ScheduleOutcome,
    },
};

use super::HttpState;

const SOURCE: &str = "infra::http::hooks";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HookBody {
    args: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub(super) struct HookResponse {
    event: &'static str,
    path: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule: Option<&'static str>,
}

impl HookResponse {
    fn new(event: HostEvent, outcome: DispatchOutcome) -> Self {
        let schedule = match outcome {
            DispatchOutcome::Debounced(ScheduleOutcome::Scheduled) => Some("scheduled"),
            DispatchOutcome::Debounced(ScheduleOutcome::Rearmed) => Some("rearmed"),
            DispatchOutcome::Immediate | DispatchOutcome::Ignored => None,
        };
        Self {
            event: event.as_str(),
            path: outcome.as_str(),
            schedule,
        }
    }
}

pub(super) async fn dispatch_hook(
    State(state): State<HttpState>,
    Path(event): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<HookResponse>), HttpError> {
    let event: HostEvent = event.parse().map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            codes::UNKNOWN_EVENT,
            "Unknown host event",
            &err,
        )
    })?;

    let body: HookBody = if body.iter().all(u8::is_ascii_whitespace) {
        HookBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                "Hook body must be a JSON object",
                &err,
            )
        })?
    };

    let outcome = state.bindings.dispatch(event, &body.args).await?;
    Ok((StatusCode::ACCEPTED, Json(HookResponse::new(event, outcome))))
}
