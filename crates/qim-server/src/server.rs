//! `GatewayServer`: socket channel listener plus static asset listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use qim_rpc::Dispatcher;
use qim_session::SessionConnector;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::lifecycle::{ConnectionContext, run_connection};
use crate::websocket::registry::ConnectionRegistry;

/// Browser-side socket library, served from the assets directory.
pub const SOCKET_IO_ASSET: &str = "socket.io.js";
/// Browser-side session library, served from the assets directory.
pub const QIMESSAGING_ASSET: &str = "qimessaging.js";

/// State for the HTTP listener.
#[derive(Clone)]
struct HttpState {
    registry: Arc<ConnectionRegistry>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

/// The gateway: owns configuration, the dispatcher and shutdown.
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    context: Arc<ConnectionContext>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl GatewayServer {
    /// Create a server that opens sessions through `connector`.
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn SessionConnector>,
        metrics: PrometheusHandle,
    ) -> Self {
        let config = Arc::new(config);
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let dispatcher = Dispatcher::new().with_timeout(config.call_timeout());
        let context = Arc::new(ConnectionContext {
            config: Arc::clone(&config),
            connector,
            dispatcher: Arc::new(dispatcher),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: shutdown.token(),
        });
        Self {
            config,
            context,
            shutdown,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Router for the socket channel listener.
    pub fn socket_router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .with_state(Arc::clone(&self.context))
            .layer(CorsLayer::permissive())
    }

    /// Router for static assets, `/health` and `/metrics`.
    pub fn http_router(&self) -> Router {
        let state = HttpState {
            registry: Arc::clone(&self.context.registry),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };
        let assets = &self.config.assets_dir;

        Router::new()
            .route_service(
                &format!("/{SOCKET_IO_ASSET}"),
                ServeFile::new(assets.join(SOCKET_IO_ASSET)),
            )
            .route_service(
                &format!("/{QIMESSAGING_ASSET}"),
                ServeFile::new(assets.join(QIMESSAGING_ASSET)),
            )
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind both listeners and serve until shutdown.
    pub async fn listen(&self) -> std::io::Result<ListenHandle> {
        let socket_listener = TcpListener::bind(self.config.socket_addr()).await?;
        let http_listener = TcpListener::bind(self.config.http_addr()).await?;
        let socket_addr = socket_listener.local_addr()?;
        let http_addr = http_listener.local_addr()?;

        let socket_task = spawn_listener(
            "socket",
            socket_listener,
            self.socket_router(),
            &self.shutdown,
        );
        let http_task = spawn_listener("http", http_listener, self.http_router(), &self.shutdown);

        info!(
            %socket_addr,
            %http_addr,
            discovery_url = %self.config.discovery_url,
            "gateway listening"
        );

        Ok(ListenHandle {
            socket_addr,
            http_addr,
            tasks: vec![socket_task, http_task],
        })
    }

    /// Stop both listeners and wait for them, closing every connection.
    pub async fn stop(&self, handle: ListenHandle) {
        self.shutdown.graceful_shutdown(handle.tasks, None).await;
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Open socket connections.
    pub async fn connections(&self) -> usize {
        self.context.registry.count().await
    }
}

/// Addresses actually bound plus the listener tasks.
pub struct ListenHandle {
    /// Socket channel address.
    pub socket_addr: SocketAddr,
    /// Static asset / health / metrics address.
    pub http_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenHandle {
    /// Wait for both listeners to stop.
    pub async fn join(self) {
        let _ = futures::future::join_all(self.tasks).await;
    }
}

fn spawn_listener(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: &ShutdownCoordinator,
) -> JoinHandle<()> {
    let token = shutdown.token();
    tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        match served {
            Ok(()) => info!(listener = name, "listener stopped"),
            Err(e) => error!(listener = name, error = %e, "listener failed"),
        }
    })
}

/// GET / and /ws: upgrade to the socket channel.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<ConnectionContext>>,
) -> impl IntoResponse {
    let client_id = Uuid::now_v7().to_string();
    ws.max_message_size(ctx.config.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, client_id, ctx))
}

/// GET /health
async fn health_handler(State(state): State<HttpState>) -> Json<HealthResponse> {
    let connections = state.registry.count().await;
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<HttpState>) -> String {
    state.metrics.render()
}
