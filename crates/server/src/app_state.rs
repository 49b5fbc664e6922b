use std::sync::atomic::{AtomicU64, Ordering};

use coordinator::Coordinator;
use shared::domain::ConnectionId;

pub(crate) struct AppState {
    pub(crate) coordinator: Coordinator,
    pub(crate) max_frame_bytes: usize,
    next_connection_id: AtomicU64,
}

impl AppState {
    pub(crate) fn new(coordinator: Coordinator, max_frame_bytes: usize) -> Self {
        Self {
            coordinator,
            max_frame_bytes,
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }
}
