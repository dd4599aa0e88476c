//! HTTP surface: host hook receiver, manual trigger page, update filters,
//! monitoring-agent compatibility endpoints and health.

mod compat;
mod health;
mod hooks;
mod manual;
mod middleware;
mod updates;

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::{
    purge::{bindings::EventBindings, compat::CompatibilityRegistry, trigger::PurgeTrigger},
    updater::ReleaseUpdater,
};

pub use middleware::{AdminGuard, RequestContext};

#[derive(Clone)]
pub struct HttpState {
    pub bindings: EventBindings,
    pub compat: Arc<CompatibilityRegistry>,
    /// `None` when the updater is switched off; the update routes then answer `404`.
    pub updater: Option<Arc<ReleaseUpdater>>,
    pub admin: AdminGuard,
}

impl HttpState {
    pub fn trigger(&self) -> &PurgeTrigger {
        self.bindings.trigger()
    }
}

pub fn build_router(state: HttpState) -> Router {
    let admin_routes = Router::new()
        .route("/hooks/{event}", post(hooks::dispatch_hook))
        .route("/compat", get(compat::list_compatibilities))
        .route("/compat/{name}/clear", post(compat::clear_compatibility))
        .route("/updates/check", post(updates::check_update))
        .route("/updates/info", get(updates::plugin_info))
        .route("/updates/installed", post(updates::after_install))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_admin));

    Router::new()
        .route("/", get(manual::index))
        .route("/health", get(health::health))
        .merge(admin_routes)
        .with_state(state)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
}
