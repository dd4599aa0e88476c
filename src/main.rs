use std::{process, sync::Arc, time::Duration};

use purgekeeper::{
    application::error::AppError,
    config::{self, Settings},
    infra::{
        error::InfraError,
        http::{self, AdminGuard, HttpState},
        telemetry,
    },
    purge::{
        BuilderAssetPurger, CachePurger, CompatibilityRegistry, DebounceScheduler, DiagnosticLog,
        EventBindings, JobQueue, KeyedStore, LiteSpeedPurger, MemoryObjectCache, MemoryStore,
        ObjectCache, PurgeOrchestrator, PurgeTrigger, ReverseProxyPurger, TokioJobQueue,
        TriggerCompatibility, backends::purge_http_client,
    },
    updater::{GithubReleaseSource, ReleaseUpdater, UpdateCheck, UpdaterConfig},
};
use tokio::time::{Instant, sleep};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const JOB_DRAIN_POLL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(args) => run_purge(settings, args).await,
        config::Command::CheckUpdate(args) => run_check_update(settings, args).await,
    }
}

/// Everything the commands share, wired exactly once.
struct ApplicationContext {
    trigger: PurgeTrigger,
    bindings: EventBindings,
    compat: Arc<CompatibilityRegistry>,
    updater: Option<Arc<ReleaseUpdater>>,
    jobs: Arc<TokioJobQueue>,
}

fn build_application_context(settings: &Settings) -> Result<ApplicationContext, AppError> {
    let log = DiagnosticLog::new(settings.logging.purge_diagnostics);
    let client = purge_http_client(settings.purge.request_timeout).map_err(InfraError::from)?;

    let object_cache: Arc<dyn ObjectCache> = Arc::new(MemoryObjectCache::new());
    let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
    let jobs = Arc::new(TokioJobQueue::new());

    let purgers: Vec<Arc<dyn CachePurger>> = vec![
        Arc::new(BuilderAssetPurger::new(
            settings.purge.builder_asset_dir.clone(),
            log.clone(),
        )),
        Arc::new(ReverseProxyPurger::new(
            settings.purge.reverse_proxy.enabled,
            settings.purge.reverse_proxy.purge_url.clone(),
            client.clone(),
            log.clone(),
        )),
        Arc::new(LiteSpeedPurger::new(
            settings.purge.litespeed.purge_url.clone(),
            client.clone(),
            log.clone(),
        )),
    ];

    let orchestrator = Arc::new(PurgeOrchestrator::new(object_cache.clone(), purgers, log));
    let scheduler = DebounceScheduler::new(
        store.clone(),
        jobs.clone() as Arc<dyn JobQueue>,
        orchestrator.clone(),
        settings.purge.debounce_window,
    );
    let trigger = PurgeTrigger::new(orchestrator, scheduler);
    let bindings = EventBindings::new(trigger.clone(), settings.purge.builder_events);

    let compat = Arc::new(CompatibilityRegistry::new());
    compat.register(Arc::new(TriggerCompatibility::new(trigger.clone())))?;

    let updater = settings.updater.enabled.then(|| {
        let source = GithubReleaseSource::new(
            client,
            settings.updater.api_base.clone(),
            settings.updater.owner.clone(),
            settings.updater.repo.clone(),
        );
        Arc::new(ReleaseUpdater::new(
            updater_config(settings),
            Arc::new(source),
            store,
            object_cache,
        ))
    });

    Ok(ApplicationContext {
        trigger,
        bindings,
        compat,
        updater,
        jobs,
    })
}

fn updater_config(settings: &Settings) -> UpdaterConfig {
    let updater = &settings.updater;
    UpdaterConfig {
        slug: updater.slug.clone(),
        basename: updater.basename.clone(),
        display_name: updater.display_name.clone(),
        install_dir: updater.install_dir.clone(),
        host_version: updater.host_version.clone(),
        success_ttl: updater.success_ttl,
        failure_ttl: updater.failure_ttl,
        icons: updater.icons.clone(),
    }
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    if settings.admin.token.is_none() {
        warn!(
            target = "purgekeeper::serve",
            "no admin token configured; admin routes will answer 401"
        );
    }

    let state = HttpState {
        bindings: app.bindings.clone(),
        compat: app.compat.clone(),
        updater: app.updater.clone(),
        admin: AdminGuard::new(settings.admin.token.clone()),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "purgekeeper::serve",
        addr = %settings.server.addr,
        debounce_window_ms = settings.purge.debounce_window.as_millis() as u64,
        updater = app.updater.is_some(),
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    drain_jobs(app.jobs.as_ref(), settings.server.graceful_shutdown).await;
    Ok(())
}

async fn run_purge(settings: Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;
    app.trigger.purge_now(&args.trigger).await?;
    info!(target = "purgekeeper::purge", trigger = %args.trigger, "purge finished");
    Ok(())
}

async fn run_check_update(
    settings: Settings,
    args: config::CheckUpdateArgs,
) -> Result<(), AppError> {
    let mut settings = settings;
    settings.updater.enabled = true;
    let app = build_application_context(&settings)?;
    let updater = app
        .updater
        .ok_or_else(|| AppError::unexpected("updater could not be initialised"))?;

    let current = args
        .current_version
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    let mut check = UpdateCheck::default();
    check
        .checked
        .insert(settings.updater.basename.clone(), current);

    let result = updater.check_update(check).await;
    let rendered = serde_json::to_string_pretty(&result)
        .map_err(|err| AppError::unexpected(format!("failed to render result: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "purgekeeper::serve", "shutdown requested");
}

/// Give queued deferred purges a chance to fire before exiting.
async fn drain_jobs(jobs: &dyn JobQueue, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while jobs.pending() > 0 {
        if Instant::now() >= deadline {
            warn!(
                target = "purgekeeper::serve",
                pending = jobs.pending(),
                "exiting with deferred purges still queued"
            );
            return;
        }
        sleep(JOB_DRAIN_POLL).await;
    }
}
