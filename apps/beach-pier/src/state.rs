use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::gauge;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::router::RelayRouter;

/// Shared state handed to every request and connection task.
#[derive(Clone)]
pub struct PierState {
    router: RelayRouter,
    outbound_buffer: usize,
    active_connections: Arc<AtomicUsize>,
    metrics: Option<PrometheusHandle>,
}

impl PierState {
    pub fn new(
        router: RelayRouter,
        outbound_buffer: usize,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            router,
            outbound_buffer,
            active_connections: Arc::new(AtomicUsize::new(0)),
            metrics,
        }
    }

    pub fn router(&self) -> &RelayRouter {
        &self.router
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn render_metrics(&self) -> Option<String> {
        self.metrics.as_ref().map(|handle| handle.render())
    }

    pub(crate) fn connection_opened(&self) {
        let active = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("beach_pier_connections_active", active as f64);
    }

    pub(crate) fn connection_closed(&self) {
        let active = self
            .active_connections
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        gauge!("beach_pier_connections_active", active as f64);
    }
}
