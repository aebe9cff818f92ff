//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every guard route
//! - Attach the rate-limit middleware per route, by action category
//! - Wire up middleware (timeout, request ID, tracing, body limits, metrics)
//! - Own the shared state and swap reloadable settings on config change
//! - Run the rate-limit sweeper for the lifetime of the server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{HeaderName, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{GuardConfig, PromptConfig, RateLimitConfig, SecurityConfig};
use crate::http::handlers;
use crate::http::request::{request_id, REQUEST_ID_HEADER};
use crate::lifecycle::{shutdown, Shutdown};
use crate::observability::metrics;
use crate::ordering::{InMemoryOrderStore, OrderStore, OrderingCoordinator};
use crate::security::rate_limit::{rate_limit_middleware, spawn_sweeper, RateLimitGuard};
use crate::security::{ActionCategory, FileIntegrityValidator, RateLimiter};

/// The reloadable part of the configuration, swapped atomically on change.
pub struct GuardSettings {
    pub rate_limit: RateLimitConfig,
    pub uploads: FileIntegrityValidator,
    pub prompts: PromptConfig,
    pub security: SecurityConfig,
}

impl GuardSettings {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            rate_limit: config.rate_limit.clone(),
            uploads: FileIntegrityValidator::new(config.uploads.clone()),
            prompts: config.prompts.clone(),
            security: config.security.clone(),
        }
    }
}

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub settings: Arc<ArcSwap<GuardSettings>>,
    pub ordering: Arc<OrderingCoordinator>,
}

/// HTTP server for the guard service.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GuardConfig,
}

impl HttpServer {
    /// Create a server backed by an in-memory order store.
    pub fn new(config: GuardConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryOrderStore::new()))
    }

    /// Create a server whose reorder endpoint writes through `store`.
    pub fn with_store(config: GuardConfig, store: Arc<dyn OrderStore>) -> Self {
        let state = AppState {
            limiter: Arc::new(RateLimiter::new()),
            settings: Arc::new(ArcSwap::from_pointee(GuardSettings::from_config(&config))),
            ordering: Arc::new(OrderingCoordinator::new(store)),
        };
        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GuardConfig, state: AppState) -> Router {
        let upload_limit = usize::try_from(config.uploads.max_size_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(1);
        let id_header = HeaderName::from_static(REQUEST_ID_HEADER);

        Router::new()
            .route(
                "/v1/urls/validate",
                limited(
                    &state,
                    ActionCategory::BookmarkCreate,
                    post(handlers::validate_url_handler),
                ),
            )
            .route(
                "/v1/text/strip",
                limited(&state, ActionCategory::Mutation, post(handlers::strip_text_handler)),
            )
            .route(
                "/v1/prompts/sanitize",
                limited(
                    &state,
                    ActionCategory::AiInvocation,
                    post(handlers::sanitize_prompt_handler),
                ),
            )
            .route(
                "/v1/uploads",
                limited(
                    &state,
                    ActionCategory::FileUpload,
                    post(handlers::upload_handler)
                        .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                        .layer(RequestBodyLimitLayer::new(upload_limit)),
                ),
            )
            .route("/v1/items", get(handlers::list_items_handler))
            .route(
                "/v1/items/reorder",
                limited(&state, ActionCategory::Mutation, post(handlers::reorder_handler)),
            )
            .route("/health", get(handlers::health))
            .route_layer(middleware::from_fn(record_metrics))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(id_header.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(SetRequestIdLayer::new(id_header, MakeRequestUuid))
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Validated configs arriving on `config_updates` replace the reloadable
    /// settings; listener, timeout and upload body limit keep their startup values.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweep_every = Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1));
        let sweeper = spawn_sweeper(self.state.limiter.clone(), sweep_every, shutdown.subscribe());
        tokio::spawn(apply_config_updates(
            self.state.settings.clone(),
            config_updates,
            shutdown.subscribe(),
        ));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown.subscribe()))
            .await?;

        let _ = sweeper.await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn limited(
    state: &AppState,
    action: ActionCategory,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.layer(middleware::from_fn_with_state(
        RateLimitGuard {
            state: state.clone(),
            action,
        },
        rate_limit_middleware,
    ))
}

async fn record_metrics(path: MatchedPath, request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    metrics::record_request(path.as_str(), response.status().as_u16(), start);
    response
}

async fn apply_config_updates(
    settings: Arc<ArcSwap<GuardSettings>>,
    mut updates: mpsc::UnboundedReceiver<GuardConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    settings.store(Arc::new(GuardSettings::from_config(&config)));
                    tracing::info!(
                        rate_limit_enabled = config.rate_limit.enabled,
                        max_upload_bytes = config.uploads.max_size_bytes,
                        "Configuration reloaded"
                    );
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}
