//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

pub use qim_rpc::dispatch::{CALL_DURATION_SECONDS, CALL_ERRORS_TOTAL, CALLS_TOTAL};

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a global
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle backed by a recorder that is not installed globally.
///
/// Renders nothing; used when no global recorder is wanted.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Socket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "qim_ws_connections_total";
/// Socket connections whose session could not be opened (counter).
pub const WS_CONNECT_FAILURES_TOTAL: &str = "qim_ws_connect_failures_total";
/// Open socket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "qim_ws_connections_active";
/// Socket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "qim_ws_connection_duration_seconds";
