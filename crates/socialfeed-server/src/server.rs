use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    BoxError, Json, Router,
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use socialfeed_cache::{CacheLayer, create_cache_layer};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    handlers, middleware as app_middleware,
    store::{FeedStore, InMemoryFeedStore},
};

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheLayer,
    pub store: Arc<dyn FeedStore>,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(cache: CacheLayer, store: Arc<dyn FeedStore>, cfg: &AppConfig) -> Self {
        Self {
            cache,
            store,
            trust_forwarded_for: cfg.server.trust_forwarded_for,
        }
    }
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    // Login and signup: limited per client address.
    let ip_limited = Router::new()
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/login", post(handlers::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::ip_rate_limit,
        ));

    // Authenticated writes that are limited per user. Layers run bottom-up:
    // authenticate first, then the limiter.
    let user_limited = Router::new()
        .route("/api/posts", post(handlers::create_post))
        .route("/api/posts/like/{post_id}", post(handlers::toggle_like))
        .route("/api/posts/bookmarks/{post_id}", post(handlers::add_bookmark))
        .route(
            "/api/posts/remove-bookmark/{post_id}",
            post(handlers::remove_bookmark),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::user_rate_limit,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authenticate,
        ));

    let authenticated = Router::new()
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/posts/feed", get(handlers::feed))
        .route("/api/posts/bookmarks", get(handlers::bookmarks))
        .route("/api/posts/edit/{post_id}", post(handlers::edit_post))
        .route("/api/posts/{post_id}", delete(handlers::delete_post))
        .route("/api/users/updateProfile", post(handlers::update_profile))
        .route("/api/users/follow", post(handlers::toggle_follow))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::authenticate,
        ));

    Router::new()
        // Health and info endpoints
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .route("/internal/cache/reconnect", post(handlers::reconnect_cache))
        // Public cached reads
        .route("/api/posts/trending", get(handlers::trending_posts))
        .route("/api/users/{username}", get(handlers::user_by_handle))
        .merge(ip_limited)
        .merge(user_limited)
        .merge(authenticated)
        .layer(middleware::from_fn(app_middleware::track_http_metrics))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(cfg.request_timeout()),
        )
        .layer(TraceLayer::new_for_http().make_span_with(
            |req: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    uri = %req.uri(),
                )
            },
        ))
        .with_state(state)
}

async fn handle_timeout_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({ "message": "request timed out" })),
        )
    } else {
        tracing::error!(error = %err, "unhandled middleware error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "internal server error" })),
        )
    }
}

/// Connect the cache layer and assemble the state over the in-process store.
pub async fn build_state(cfg: &AppConfig) -> AppState {
    let cache = create_cache_layer(&cfg.redis, &cfg.cache, &cfg.rate_limit).await;
    tracing::info!(
        backend = cache.connection.backend(),
        state = %cache.connection.state(),
        "Cache layer initialized"
    );
    AppState::new(cache, Arc::new(InMemoryFeedStore::new()), cfg)
}

pub struct SocialfeedServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> SocialfeedServer {
        let state = build_state(&self.config).await;
        let app = build_app(state, &self.config);

        SocialfeedServer {
            addr: self.addr,
            app,
        }
    }
}

impl SocialfeedServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
