use std::{future::IntoFuture, path::Path, process, sync::Arc};

use magforge::{
    application::{
        dispatch::JobDispatcher,
        error::{AppError, GenerationError},
        generate::GenerationService,
        render::CommandRenderer,
        retry::RetryPolicy,
        watcher::WatchLimits,
    },
    config,
    domain::{
        canonical::Canonicalizer,
        entities::{GenerationOptions, GenerationRequest},
        types::{ModelFormat, OperationKind},
    },
    infra::{
        error::InfraError,
        http::{self, ApiState},
        schema::FileShapeSchema,
        store::ArtifactStore,
        telemetry,
    },
};
use magforge_api_types::FingerprintResponse;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(i32::from(error.exit_code()));
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
        config::Command::Generate(args) => run_generate(settings, args).await,
        config::Command::Fingerprint(args) => run_fingerprint(settings, args).await,
    }
}

fn build_generation_service(settings: &config::Settings) -> Result<GenerationService, AppError> {
    let schema = match settings.schema.path.as_deref() {
        Some(path) => FileShapeSchema::load(path),
        None => FileShapeSchema::bundled(),
    }
    .map_err(InfraError::from)?;
    info!(
        target = "magforge::startup",
        families = schema.family_count(),
        cache_root = %settings.cache.root.display(),
        "Shape schema loaded"
    );

    let store = ArtifactStore::new(settings.cache.root.clone()).map_err(InfraError::from)?;
    let renderer = Arc::new(CommandRenderer::from_settings(&settings.renderer));
    let dispatcher = JobDispatcher::new(
        renderer,
        store,
        settings.dispatch.worker_concurrency.get() as usize,
        WatchLimits::from(&settings.watcher),
    )
    .with_cci_coordinates_path(settings.renderer.cci_coordinates_path.clone());

    Ok(GenerationService::new(
        Canonicalizer::new(Arc::new(schema)),
        dispatcher,
        RetryPolicy::from(&settings.dispatch),
        settings.dispatch.request_timeout,
    ))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let generation = Arc::new(build_generation_service(&settings)?);
    let retry_after = settings.dispatch.retry_delay.as_secs().max(1);
    let router = http::build_router(ApiState::new(generation, retry_after));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "magforge::http",
        addr = %settings.server.addr,
        "Listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            signal.notify_one();
        },
    );

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server.into_future() => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "magforge::http",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
        }
    }

    info!(target = "magforge::http", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "magforge::http", error = %err, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(target = "magforge::http", error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!(target = "magforge::http", "Shutdown signal received");
}

#[derive(Serialize)]
struct GenerateSummary<'a> {
    fingerprint: &'a str,
    output: &'a Path,
    cache: &'static str,
    attempts: u32,
    size_bytes: u64,
}

async fn run_generate(
    settings: config::Settings,
    args: config::GenerateArgs,
) -> Result<(), AppError> {
    let service = build_generation_service(&settings)?;
    let request = read_request(args.kind, &args.request, args.format).await?;

    let artifact = service.generate(&request).await?;
    tokio::fs::write(&args.output, &artifact.bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let summary = GenerateSummary {
        fingerprint: artifact.record.fingerprint.as_str(),
        output: &args.output,
        cache: artifact.cache.as_str(),
        attempts: artifact.attempts,
        size_bytes: artifact.record.size_bytes,
    };
    print_json(&summary)
}

async fn run_fingerprint(
    settings: config::Settings,
    args: config::FingerprintArgs,
) -> Result<(), AppError> {
    let service = build_generation_service(&settings)?;
    let request = read_request(args.kind, &args.request, args.format).await?;

    let prepared = service
        .prepare(&request)
        .map_err(|err| AppError::from(GenerationError::from(err)))?;
    let cached = service.is_cached(&prepared).await;

    print_json(&FingerprintResponse {
        kind: prepared.request.kind().as_str().to_string(),
        fingerprint: prepared.fingerprint.to_string(),
        canonical: prepared.request.body().clone(),
        cached,
    })
}

async fn read_request(
    kind: OperationKind,
    path: &Path,
    format: Option<ModelFormat>,
) -> Result<GenerationRequest, AppError> {
    let raw = tokio::fs::read(path).await.map_err(|source| AppError::Input {
        path: path.display().to_string(),
        source,
    })?;
    let payload: Value =
        serde_json::from_slice(&raw).map_err(|source| AppError::MalformedInput {
            path: path.display().to_string(),
            source,
        })?;

    Ok(GenerationRequest {
        kind,
        payload,
        options: GenerationOptions { format },
    })
}

fn print_json(value: &impl Serialize) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
