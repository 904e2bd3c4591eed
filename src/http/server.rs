//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Serve until shutdown, then let deferred cache writes finish
//! - Sweep expired cache entries while serving

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::Request as HttpRequest;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::cache::{spawn_sweeper, CacheStore, MemoryCacheStore};
use crate::config::GatewayConfig;
use crate::http::dispatcher::Dispatcher;
use crate::http::request::{request_id_layer, X_REQUEST_ID};
use crate::lifecycle::DeferredTasks;
use crate::upstream::{ReqwestUpstream, UpstreamClient, UpstreamError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    tasks: DeferredTasks,
    store: Arc<dyn CacheStore>,
    config: GatewayConfig,
}

impl HttpServer {
    /// Server with the `reqwest` client and the in-process cache store.
    pub fn new(config: GatewayConfig) -> Result<Self, UpstreamError> {
        let client = Arc::new(ReqwestUpstream::new(&config.upstream)?);
        let store = Arc::new(MemoryCacheStore::from_config(&config.cache));
        Ok(Self::with_components(config, client, store))
    }

    /// Server with injected upstream client and cache store.
    pub fn with_components(
        config: GatewayConfig,
        client: Arc<dyn UpstreamClient>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let tasks = DeferredTasks::new();
        let dispatcher = Dispatcher::new(config.clone(), client, store.clone(), tasks.clone());
        let state = AppState {
            dispatcher: Arc::new(dispatcher),
        };
        Self {
            router: Self::build_router(state),
            tasks,
            store,
            config,
        }
    }

    fn build_router(state: AppState) -> Router {
        let trace = TraceLayer::new_for_http().make_span_with(|req: &HttpRequest<Body>| {
            let request_id = req
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "request",
                method = %req.method(),
                path = %req.uri().path(),
                request_id = %request_id,
            )
        });

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(trace)
            .layer(request_id_layer())
    }

    /// The router, for in-process use (tests drive it with `oneshot`).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Deferred work scheduled by requests served through this server.
    pub fn tasks(&self) -> &DeferredTasks {
        &self.tasks
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then drain deferred work.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            platforms = self.config.platforms.len(),
            cache_enabled = self.config.cache.enabled,
            "HTTP server starting"
        );

        let sweeper = self.config.cache.enabled.then(|| {
            spawn_sweeper(
                self.store.clone(),
                Duration::from_secs(self.config.cache.purge_interval_secs),
                shutdown.resubscribe(),
            )
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        self.tasks.drain().await;
        if let Some(sweeper) = sweeper {
            if let Err(err) = sweeper.await {
                tracing::warn!(error = %err, "Cache sweeper ended abnormally");
            }
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    state.dispatcher.handle(request).await
}
