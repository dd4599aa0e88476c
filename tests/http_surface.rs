use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use purgekeeper::infra::http::{AdminGuard, HttpState, build_router};
use purgekeeper::purge::{
    BuilderEventPolicy, CachePurger, CompatibilityRegistry, DebounceScheduler, DiagnosticLog,
    EventBindings, JobQueue, MemoryObjectCache, MemoryStore, ObjectCache, PurgeError,
    PurgeOrchestrator, PurgeTrigger, PurgerKind, TokioJobQueue, TriggerCompatibility,
};
use purgekeeper::updater::{
    ReleaseInfo, ReleaseSource, ReleaseUpdater, UpdateError, UpdaterConfig,
};

const TOKEN: &str = "s3cret";

struct CountingPurger {
    name: &'static str,
    kind: PurgerKind,
    available: bool,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingPurger {
    fn new(name: &'static str, kind: PurgerKind, available: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            available,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind: PurgerKind::EdgeCache,
            available: true,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CachePurger for CountingPurger {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> PurgerKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn purge_all(&self) -> Result<(), PurgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PurgeError::backend(self.name, "connection refused"));
        }
        Ok(())
    }
}

struct FixedSource {
    release: Option<ReleaseInfo>,
    calls: Mutex<usize>,
}

#[async_trait]
impl ReleaseSource for FixedSource {
    async fn latest_release(&self) -> Result<ReleaseInfo, UpdateError> {
        *self.calls.lock().expect("calls lock") += 1;
        self.release.clone().ok_or(UpdateError::NoAssets)
    }
}

struct Fixture {
    router: Router,
    edge: Arc<CountingPurger>,
    builder: Arc<CountingPurger>,
    object_cache: Arc<MemoryObjectCache>,
    jobs: Arc<TokioJobQueue>,
}

struct FixtureOptions {
    token: Option<String>,
    builder_available: bool,
    edge: Option<Arc<CountingPurger>>,
    updater: bool,
    install_dir: PathBuf,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            token: Some(TOKEN.to_string()),
            builder_available: true,
            edge: None,
            updater: true,
            install_dir: PathBuf::from("plugins/purgekeeper"),
        }
    }
}

fn fixture(options: FixtureOptions) -> Fixture {
    let edge = options
        .edge
        .unwrap_or_else(|| CountingPurger::new("edge", PurgerKind::EdgeCache, true));
    let builder = CountingPurger::new("builder", PurgerKind::BuilderAsset, options.builder_available);
    let object_cache = Arc::new(MemoryObjectCache::new());
    let store = Arc::new(MemoryStore::new());
    let jobs = Arc::new(TokioJobQueue::new());

    let orchestrator = Arc::new(PurgeOrchestrator::new(
        object_cache.clone() as Arc<dyn ObjectCache>,
        vec![
            edge.clone() as Arc<dyn CachePurger>,
            builder.clone() as Arc<dyn CachePurger>,
        ],
        DiagnosticLog::capturing(),
    ));
    let scheduler = DebounceScheduler::new(
        store.clone(),
        jobs.clone() as Arc<dyn JobQueue>,
        orchestrator.clone(),
        Duration::from_secs(10),
    );
    let trigger = PurgeTrigger::new(orchestrator, scheduler);
    let bindings = EventBindings::new(trigger.clone(), BuilderEventPolicy::Debounced);

    let compat = Arc::new(CompatibilityRegistry::new());
    compat
        .register(Arc::new(TriggerCompatibility::new(trigger)))
        .expect("register compatibility");

    let updater = options.updater.then(|| {
        let source = FixedSource {
            release: Some(ReleaseInfo {
                published_at: Some("2026-09-01T12:00:00Z".to_string()),
                ..ReleaseInfo::new("v2.0.0", "https://downloads.test/purgekeeper-2.0.0.zip")
            }),
            calls: Mutex::new(0),
        };
        Arc::new(ReleaseUpdater::new(
            UpdaterConfig {
                slug: "purgekeeper".to_string(),
                basename: "purgekeeper/purgekeeper.php".to_string(),
                display_name: "Purgekeeper".to_string(),
                install_dir: options.install_dir.clone(),
                host_version: "6.6".to_string(),
                success_ttl: Duration::from_secs(4 * 3600),
                failure_ttl: Duration::from_secs(3600),
                icons: None,
            },
            Arc::new(source),
            store.clone(),
            object_cache.clone(),
        ))
    });

    let router = build_router(HttpState {
        bindings,
        compat,
        updater,
        admin: AdminGuard::new(options.token),
    });

    Fixture {
        router,
        edge,
        builder,
        object_cache,
        jobs,
    }
}

fn admin_request(method: Method, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .expect("request should build")
}

fn anonymous_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
        .to_vec();
    (status, body)
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("response should be json")
}

#[tokio::test]
async fn health_answers_no_content() {
    let fixture = fixture(FixtureOptions::default());
    let (status, body) = send(&fixture.router, anonymous_request(Method::GET, "/health")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn manual_trigger_without_credentials_renders_plain_index() {
    let fixture = fixture(FixtureOptions::default());
    let (status, body) = send(
        &fixture.router,
        anonymous_request(Method::GET, "/?purge_cache=1"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).expect("utf8");
    assert!(html.contains("Cache purge coordinator is running"));
    assert_eq!(fixture.edge.calls(), 0);
}

#[tokio::test]
async fn manual_trigger_with_admin_purges_and_confirms() {
    let fixture = fixture(FixtureOptions::default());
    fixture.object_cache.insert("k", json!(1));

    let (status, body) = send(
        &fixture.router,
        admin_request(Method::GET, "/?purge_cache=1", Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).expect("utf8");
    assert!(html.contains("Cache purged"));
    assert_eq!(fixture.edge.calls(), 1);
    assert_eq!(fixture.builder.calls(), 1);
    assert!(fixture.object_cache.is_empty());
}

#[tokio::test]
async fn manual_trigger_without_flag_does_not_purge() {
    let fixture = fixture(FixtureOptions::default());
    let (status, _) = send(&fixture.router, admin_request(Method::GET, "/", Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fixture.edge.calls(), 0);
}

#[tokio::test]
async fn manual_trigger_backend_failure_is_bad_gateway() {
    let fixture = fixture(FixtureOptions {
        edge: Some(CountingPurger::failing("edge")),
        ..FixtureOptions::default()
    });
    let (status, body) = send(
        &fixture.router,
        admin_request(Method::GET, "/?purge_cache=1", Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(&body)["error"]["code"], "backend_error");
}

#[tokio::test]
async fn immediate_hook_purges_inline() {
    let fixture = fixture(FixtureOptions::default());
    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/hooks/theme-switched", Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        json_body(&body),
        json!({"event": "theme-switched", "path": "immediate"})
    );
    assert_eq!(fixture.edge.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn debounced_hook_schedules_then_rearms() {
    let fixture = fixture(FixtureOptions::default());

    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/hooks/meta-updated", Body::from("{\"args\": [1, 2]}")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        json_body(&body),
        json!({"event": "meta-updated", "path": "debounced", "schedule": "scheduled"})
    );

    let (_, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/hooks/meta-updated", Body::empty()),
    )
    .await;
    assert_eq!(json_body(&body)["schedule"], "rearmed");
    assert_eq!(fixture.edge.calls(), 0);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(fixture.edge.calls(), 1);
    assert_eq!(fixture.jobs.pending(), 0);
}

#[tokio::test]
async fn builder_hook_is_ignored_without_builder() {
    let fixture = fixture(FixtureOptions {
        builder_available: false,
        ..FixtureOptions::default()
    });
    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/hooks/builder-layout-saved", Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["path"], "ignored");
    assert_eq!(fixture.jobs.pending(), 0);
}

#[tokio::test]
async fn options_saved_only_reacts_to_the_options_page() {
    let fixture = fixture(FixtureOptions::default());

    let (_, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/hooks/options-saved", Body::from("{\"args\": [42]}")),
    )
    .await;
    assert_eq!(json_body(&body)["path"], "ignored");
    assert_eq!(fixture.edge.calls(), 0);

    let (_, body) = send(
        &fixture.router,
        admin_request(
            Method::POST,
            "/hooks/options-saved",
            Body::from("{\"args\": [\"options\"]}"),
        ),
    )
    .await;
    assert_eq!(json_body(&body)["path"], "immediate");
    assert_eq!(fixture.edge.calls(), 1);
    // Asset cache cleared up front and again by the run itself.
    assert_eq!(fixture.builder.calls(), 2);
}

#[tokio::test]
async fn unknown_hook_event_is_rejected() {
    let fixture = fixture(FixtureOptions::default());
    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/hooks/comment-posted", Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"]["code"], "unknown_event");
}

#[tokio::test]
async fn malformed_hook_body_is_rejected() {
    let fixture = fixture(FixtureOptions::default());
    let (status, _) = send(
        &fixture.router,
        admin_request(Method::POST, "/hooks/content-saved", Body::from("not json")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fixture.edge.calls(), 0);
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let fixture = fixture(FixtureOptions::default());
    let (status, body) = send(
        &fixture.router,
        anonymous_request(Method::POST, "/hooks/theme-switched"),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"]["code"], "unauthorized");
    assert_eq!(fixture.edge.calls(), 0);

    let wrong = Request::builder()
        .method(Method::POST)
        .uri("/hooks/theme-switched")
        .header("x-admin-token", "nope")
        .body(Body::empty())
        .expect("request should build");
    let (status, _) = send(&fixture.router, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let header_token = Request::builder()
        .method(Method::POST)
        .uri("/hooks/theme-switched")
        .header("x-admin-token", TOKEN)
        .body(Body::empty())
        .expect("request should build");
    let (status, _) = send(&fixture.router, header_token).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn admin_routes_are_closed_without_configured_token() {
    let fixture = fixture(FixtureOptions {
        token: None,
        ..FixtureOptions::default()
    });
    let (status, _) = send(
        &fixture.router,
        admin_request(Method::GET, "/compat", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &fixture.router,
        admin_request(Method::GET, "/?purge_cache=1", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fixture.edge.calls(), 0);
}

#[tokio::test]
async fn compat_endpoints_list_and_clear() {
    let fixture = fixture(FixtureOptions::default());

    let (status, body) = send(
        &fixture.router,
        admin_request(Method::GET, "/compat", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"compatibilities": ["purgekeeper"]}));

    let (status, _) = send(
        &fixture.router,
        admin_request(Method::POST, "/compat/purgekeeper/clear", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(fixture.edge.calls(), 1);

    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/compat/other/clear", Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"]["code"], "not_found");
}

#[tokio::test]
async fn update_check_offers_newer_release() {
    let fixture = fixture(FixtureOptions::default());
    let payload = json!({"checked": {"purgekeeper/purgekeeper.php": "1.4.0"}});

    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/updates/check", Body::from(payload.to_string())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let offer = &json_body(&body)["response"]["purgekeeper/purgekeeper.php"];
    assert_eq!(offer["slug"], "purgekeeper");
    assert_eq!(offer["new_version"], "2.0.0");
    assert_eq!(offer["tested"], "6.6");
    assert_eq!(offer["package"], "https://downloads.test/purgekeeper-2.0.0.zip");
}

#[tokio::test]
async fn update_check_with_current_version_adds_nothing() {
    let fixture = fixture(FixtureOptions::default());
    let payload = json!({"checked": {"purgekeeper/purgekeeper.php": "2.0.0"}});

    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/updates/check", Body::from(payload.to_string())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["response"], json!({}));
}

#[tokio::test]
async fn plugin_info_answers_for_own_slug_only() {
    let fixture = fixture(FixtureOptions::default());

    let (status, body) = send(
        &fixture.router,
        admin_request(
            Method::GET,
            "/updates/info?action=plugin_information&slug=purgekeeper",
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let info = json_body(&body);
    assert_eq!(info["name"], "Purgekeeper");
    assert_eq!(info["version"], "2.0.0");
    assert_eq!(info["last_updated"], "2026-09-01T12:00:00Z");

    let (status, _) = send(
        &fixture.router,
        admin_request(
            Method::GET,
            "/updates/info?action=plugin_information&slug=someone-else",
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn after_install_relocates_the_package() {
    let root = tempfile::tempdir().expect("tempdir");
    let extracted = root.path().join("purgekeeper-2.0.0");
    let install_dir = root.path().join("plugins").join("purgekeeper");
    std::fs::create_dir_all(&extracted).expect("extracted dir");
    std::fs::create_dir_all(root.path().join("plugins")).expect("plugins dir");
    std::fs::write(extracted.join("purgekeeper.php"), "<?php").expect("write file");

    let fixture = fixture(FixtureOptions {
        install_dir: install_dir.clone(),
        ..FixtureOptions::default()
    });
    let payload = json!({"destination": extracted, "source_files": ["purgekeeper.php"]});

    let (status, body) = send(
        &fixture.router,
        admin_request(Method::POST, "/updates/installed", Body::from(payload.to_string())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let result = json_body(&body);
    assert_eq!(result["destination"], json!(install_dir));
    assert_eq!(result["source_files"], json!(["purgekeeper.php"]));
    assert!(install_dir.join("purgekeeper.php").exists());
    assert!(!extracted.exists());
}

#[tokio::test]
async fn update_routes_are_absent_when_disabled() {
    let fixture = fixture(FixtureOptions {
        updater: false,
        ..FixtureOptions::default()
    });
    let (status, _) = send(
        &fixture.router,
        admin_request(
            Method::GET,
            "/updates/info?action=plugin_information&slug=purgekeeper",
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
