//! Shared application state handed to every HTTP/WebSocket handler
//! (`spec.md` §6). Grounded on the teacher pack's `AppState` shape in the
//! `other_examples` sinyalist backend — a small bag of `Arc`s, cheap to
//! clone per-request via axum's `State` extractor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::broadcaster::Broadcaster;
use crate::config::Config;
use crate::registry::Registry;
use crate::routing_client::RoutingClient;
use crate::upload_store::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub broadcaster: Arc<Broadcaster>,
    pub upload_store: Arc<UploadStore>,
    pub routing_client: RoutingClient,
    next_client_id: Arc<AtomicU64>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let routing_client =
            RoutingClient::new(config.osrm_url.clone(), config.job_timeout, config.osrm_request_delay);
        Self {
            registry: Arc::new(Registry::new(config.max_jobs_kept)),
            broadcaster: Arc::new(Broadcaster::new()),
            upload_store: Arc::new(UploadStore::new(config.upload_dir.clone())),
            routing_client,
            config,
            next_client_id: Arc::new(AtomicU64::new(1)),
            started_at: Instant::now(),
        }
    }

    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
