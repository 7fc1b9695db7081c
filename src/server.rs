//! HTTP server wiring and run loop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::metadata::{self, MetadataStore};
use crate::voms::{AttributeValidator, VomsAuthState, VomsPolicy, voms_auth_middleware};
use crate::{Error, Result};

/// The metadata server.
pub struct Server {
    config: Config,
    validator: Arc<dyn AttributeValidator>,
}

impl Server {
    /// Create a server from configuration and a validation boundary.
    pub fn new(config: Config, validator: Arc<dyn AttributeValidator>) -> Self {
        Self { config, validator }
    }

    /// Run until ctrl-c / SIGTERM.
    ///
    /// Loads the VO policy exactly once; a bad policy file aborts startup
    /// rather than serving with an undefined allow-list.
    pub async fn run(self) -> Result<()> {
        let policy = VomsPolicy::load(&self.config.voms.policy_file)?;
        if policy.is_empty() {
            warn!(
                policy_file = %self.config.voms.policy_file.display(),
                "VO allow-list is empty - every request will be denied"
            );
        }

        let auth = Arc::new(VomsAuthState {
            policy,
            validator: self.validator,
        });
        let store = Arc::new(MetadataStore::new());
        let app = create_router(auth, store, self.config.metadata.max_document_bytes);

        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("VOMS METADATA SERVER v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(policy_file = %self.config.voms.policy_file.display(), "VO policy loaded");
        if self.config.voms.skip_verify {
            warn!("AC VERIFICATION disabled - do not run this configuration in production");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Create the router: metadata routes behind the VOMS middleware, plus an
/// unauthenticated health probe.
pub fn create_router(
    auth: Arc<VomsAuthState>,
    store: Arc<MetadataStore>,
    max_document_bytes: usize,
) -> Router {
    let protected = metadata::routes()
        .layer(middleware::from_fn_with_state(auth, voms_auth_middleware))
        .layer(DefaultBodyLimit::max(max_document_bytes))
        .with_state(store);

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// GET /health - liveness probe, outside the auth layer
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
