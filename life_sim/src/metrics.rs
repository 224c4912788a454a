use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters shared by every session.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    steps: AtomicU64,
    cells_stepped: AtomicU64,
    protocol_errors: AtomicU64,
}

/// Point-in-time copy of [`ServerMetrics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub steps: u64,
    pub cells_stepped: u64,
    pub protocol_errors: u64,
}

impl MetricsSnapshot {
    pub fn active_connections(&self) -> u64 {
        self.connections_opened
            .saturating_sub(self.connections_closed)
    }
}

impl ServerMetrics {
    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step(&self, cells: u64) {
        self.steps.fetch_add(1, Ordering::Relaxed);
        self.cells_stepped.fetch_add(cells, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
            cells_stepped: self.cells_stepped.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }
}
