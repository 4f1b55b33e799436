mod core;
mod features;
mod shared;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::accidents::handlers::AccidentState;
use crate::features::accidents::services::Classifier;
use crate::features::accidents::{
    routes as accidents_routes, AccidentService, AccidentStore, ClassificationRetryWorker,
    DecisionEngine, DecisionPolicy, HttpClassifier, InMemoryAccidentStore, PgAccidentStore,
};
use crate::features::auth;
use crate::features::dispatch::{
    routes as dispatch_routes, AcceptanceCoordinator, DispatchBroadcaster,
    DispatchSessionService, ZoneDirectory,
};
use axum::{middleware::from_fn, Router};
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Log system info
    let available_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    tracing::info!(
        "System info: available_cpus={}, tokio_worker_threads={}, pid={}",
        available_cpus,
        worker_threads,
        std::process::id()
    );

    tracing::info!("Configuration loaded successfully");

    // Report store: Postgres when configured, process memory otherwise
    let store: Arc<dyn AccidentStore> = match &config.database {
        Some(db_config) => {
            let pool = database::connect_and_migrate(db_config).await?;
            Arc::new(PgAccidentStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, reports are kept in memory only");
            Arc::new(InMemoryAccidentStore::new())
        }
    };

    // Initialize auth
    let jwt_validator = Arc::new(auth::JwtValidator::new(&config.auth));
    tracing::info!("Auth configuration initialized");

    // Dispatch components
    let zone_directory = Arc::new(ZoneDirectory::new());
    let broadcaster = Arc::new(DispatchBroadcaster::new(Arc::clone(&zone_directory)));
    let coordinator = Arc::new(AcceptanceCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&broadcaster),
    ));
    let session_service = Arc::new(DispatchSessionService::new(
        Arc::clone(&zone_directory),
        coordinator,
    ));
    tracing::info!(
        "Dispatch services initialized (default zone: {})",
        config.dispatch.default_zone_id
    );

    // Classifier client (optional)
    let classifier: Option<Arc<dyn Classifier>> = if config.classifier.enabled {
        let client: Arc<dyn Classifier> = Arc::new(
            HttpClassifier::new(&config.classifier)
                .map_err(|e| anyhow::anyhow!("Failed to build classifier client: {}", e))?,
        );
        tracing::info!(
            "Classifier enabled: {} (timeout {:?}, threshold {})",
            config.classifier.predict_url(),
            config.classifier.timeout,
            config.classifier.confidence_threshold
        );
        Some(client)
    } else {
        tracing::info!("Classifier disabled, reports are decided manually");
        None
    };

    let decision_engine = Arc::new(DecisionEngine::new(
        Arc::clone(&store),
        classifier,
        Arc::clone(&broadcaster),
        DecisionPolicy::from_config(&config.classifier),
    ));
    let accident_service = Arc::new(AccidentService::new(
        Arc::clone(&store),
        Arc::clone(&decision_engine),
        config.dispatch.default_zone_id.clone(),
    ));
    tracing::info!("Accident services initialized");

    // Spawn classification retry worker
    let retry_worker = if decision_engine.classification_enabled() {
        let worker = ClassificationRetryWorker::new(
            Arc::clone(&store),
            Arc::clone(&decision_engine),
            config.classifier.clone(),
        );
        let handle = tokio::spawn(async move {
            worker.run().await;
        });
        tracing::info!("Classification retry worker spawned");
        Some(handle)
    } else {
        None
    };

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    // Build swagger router
    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn(middleware::basic_auth_middleware(Arc::new(
                credentials,
            ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    let accident_state = AccidentState {
        accident_service,
        decision_engine,
    };

    // Protected routes (require JWT authentication)
    let protected_routes = Router::new()
        .merge(accidents_routes::admin_routes(accident_state.clone()))
        .merge(dispatch_routes::admin_routes(Arc::clone(&zone_directory)))
        .route_layer(axum::middleware::from_fn_with_state(
            jwt_validator.clone(),
            middleware::auth_middleware,
        ));

    // Real-time dispatch channel (token may also come from the query string)
    let socket_routes = dispatch_routes::socket_routes(
        session_service,
        config.dispatch.outbox_capacity,
    )
    .route_layer(axum::middleware::from_fn_with_state(
        jwt_validator.clone(),
        middleware::socket_auth_middleware,
    ));

    // Simple health check endpoint (no auth required)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    // Public routes (token optional)
    let public_routes = Router::new()
        .merge(accidents_routes::public_routes(accident_state))
        .route_layer(axum::middleware::from_fn_with_state(
            jwt_validator.clone(),
            middleware::optional_auth_middleware,
        ));

    let app = Router::new()
        .merge(swagger)
        .merge(protected_routes)
        .merge(socket_routes)
        .merge(public_routes)
        .merge(health_route)
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    socket.set_recv_buffer_size(256 * 1024)?;
    socket.set_send_buffer_size(256 * 1024)?;

    // Keepalive also reaps half-open responder sockets
    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(65535)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );
    tracing::info!(
        "Dispatch channel available at {}",
        format!("ws://{}/ws/dispatch", addr)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Teardown
    if let Some(handle) = retry_worker {
        handle.abort();
    }
    let dropped = zone_directory.clear().await;
    tracing::info!("Server stopped, closed {} responder session(s)", dropped);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = signal_or_pending("Ctrl-C", tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Resolves when the signal fires. A listener that cannot be installed
/// never resolves, so it cannot trigger a shutdown on its own.
async fn signal_or_pending<F>(name: &str, signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!("Failed to listen for {}: {}", name, e);
        std::future::pending::<()>().await;
    }
}
