//! Job Registry (C7, `spec.md` §4.7).
//!
//! `DashMap`-backed, exactly the table-of-live-records idiom the teacher
//! crate uses for its replica table in `routing.rs`, plus a background
//! eviction loop modeled on the teacher's `start_metrics_task` interval
//! loop in `main.rs`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::model::job::{Job, JobSnapshot, JobStatus, Progress};
use crate::model::route_outcome::RouteOutcome;
use crate::model::routing_config::RoutingConfiguration;
use crate::model::upload::UploadDescriptor;

pub struct Registry {
    jobs: DashMap<String, Arc<RwLock<Job>>>,
    uploads: DashMap<String, UploadDescriptor>,
    /// Insertion order, oldest first, used by the eviction loop to decide
    /// which completed jobs to drop once `max_jobs_kept` is exceeded.
    order: Mutex<VecDeque<String>>,
    max_jobs_kept: usize,
}

impl Registry {
    pub fn new(max_jobs_kept: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            uploads: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_jobs_kept,
        }
    }

    pub fn register_upload(&self, descriptor: UploadDescriptor) {
        self.uploads.insert(descriptor.file_id.clone(), descriptor);
    }

    pub fn upload_descriptor_for_file(&self, file_id: &str) -> Option<UploadDescriptor> {
        self.uploads.get(file_id).map(|entry| entry.clone())
    }

    /// Creates a new job in `pending` state and returns its id
    /// (`spec.md` §4.6 step 1).
    pub fn create(&self, configuration: RoutingConfiguration, total_rows: usize, results_dir: &std::path::Path) -> String {
        let job = Job::new(configuration, total_rows, results_dir);
        let id = job.id.clone();
        self.jobs.insert(id.clone(), Arc::new(RwLock::new(job)));
        self.order.lock().push_back(id.clone());
        id
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<RwLock<Job>>> {
        self.jobs.get(job_id).map(|entry| Arc::clone(&entry))
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.jobs.get(job_id).map(|entry| entry.read().snapshot())
    }

    pub fn list_snapshots(&self) -> Vec<JobSnapshot> {
        self.jobs.iter().map(|entry| entry.value().read().snapshot()).collect()
    }

    /// Records one routed row's outcome and returns the updated progress,
    /// or `None` if the job was evicted mid-flight (`spec.md` §8 invariant
    /// 2: `processed == successful + failed` after every call). Successes
    /// also feed the job's running distance/duration totals (`spec.md`
    /// §4.5, the metadata document's cumulative summary).
    pub fn record_outcome(&self, job_id: &str, outcome: &RouteOutcome) -> Option<Progress> {
        let job = self.jobs.get(job_id)?;
        let mut guard = job.write();
        match outcome {
            RouteOutcome::Success(success) => guard.progress.record_success(success.distance_m, success.duration_s),
            RouteOutcome::Failure(_) => guard.progress.record_failure(),
        }
        Some(guard.progress)
    }

    /// Forward-only terminal transition, returning the post-transition
    /// snapshot so the caller can broadcast it (`spec.md` §4.6).
    pub fn finish(&self, job_id: &str, status: JobStatus, error: Option<String>) -> Option<JobSnapshot> {
        let job = self.jobs.get(job_id)?;
        let mut guard = job.write();
        guard.finish(status, error);
        Some(guard.snapshot())
    }

    /// Signals cooperative cancellation for a running job (`spec.md` §4.6,
    /// §4.7 "Cancel"). Sets the cancellation token iff the job is both
    /// present and non-terminal and not already cancelled, returning
    /// whether the signal was freshly set (`spec.md` §4.7, §8 idempotence:
    /// "cancel(j) after terminal state returns false and changes
    /// nothing").
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.jobs.get(job_id) {
            Some(job) => {
                let guard = job.read();
                if guard.status.is_terminal() || guard.cancel.is_cancelled() {
                    false
                } else {
                    guard.cancel.cancel();
                    true
                }
            }
            None => false,
        }
    }

    /// Cancels every job not yet in a terminal state. Called on process
    /// shutdown: graceful shutdown cancels every non-terminal job rather
    /// than leaving its dispatcher task running past the server's own
    /// lifetime (`spec.md` §5 "Timeouts").
    pub fn cancel_all_non_terminal(&self) {
        for entry in self.jobs.iter() {
            let guard = entry.value().read();
            if !guard.status.is_terminal() {
                guard.cancel.cancel();
            }
        }
    }

    /// Removes a single terminal job's bookkeeping entry. Does not delete
    /// its result/metadata files — those are a separate explicit cleanup
    /// operation (`spec.md` §4.7 "Cleanup"), kept deliberately distinct so
    /// a client can still poll results after the in-memory record ages
    /// out until it calls cleanup itself.
    pub fn evict(&self, job_id: &str) -> bool {
        let removed = self.jobs.remove(job_id).is_some();
        if removed {
            self.order.lock().retain(|id| id != job_id);
        }
        removed
    }

    /// Drops the oldest *terminal* jobs once the registry holds more than
    /// `max_jobs_kept`, leaving running jobs untouched regardless of age
    /// (`spec.md` §4.7 eviction policy).
    fn evict_oldest_over_capacity(&self) {
        if self.jobs.len() <= self.max_jobs_kept {
            return;
        }
        let candidates: Vec<String> = self.order.lock().iter().cloned().collect();
        let mut to_drop = self.jobs.len().saturating_sub(self.max_jobs_kept);
        for id in candidates {
            if to_drop == 0 {
                break;
            }
            let is_terminal = self.jobs.get(&id).map(|j| j.read().status.is_terminal()).unwrap_or(true);
            if is_terminal && self.evict(&id) {
                to_drop -= 1;
            }
        }
    }

    /// Spawns the background eviction loop (`spec.md` §4.7). Grounded on
    /// the teacher's `start_metrics_task`/interval-loop shape in `main.rs`.
    pub fn spawn_eviction_loop(self: &Arc<Self>, interval: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.evict_oldest_over_capacity();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::route_outcome::{FailureReason, RouteFailure, RouteSuccess};
    use crate::model::routing_config::{FieldPair, GeometryPolicy};
    use indexmap::IndexMap;

    fn config() -> RoutingConfiguration {
        RoutingConfiguration {
            file_id: "f1".into(),
            reference: "EPSG:4326".into(),
            origin_fields: FieldPair { x: "ox".into(), y: "oy".into() },
            destination_fields: FieldPair { x: "dx".into(), y: "dy".into() },
            geometry: GeometryPolicy {
                export_geometry: true,
                straight_line: false,
                simplify: false,
                simplify_tolerance: None,
            },
            output_format: None,
        }
    }

    #[test]
    fn create_then_snapshot_reflects_pending_state() {
        let registry = Registry::new(10);
        let id = registry.create(config(), 5, std::path::Path::new("/tmp"));
        let snapshot = registry.snapshot(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.progress.total, 5);
    }

    #[test]
    fn record_outcome_updates_progress_and_finish_is_terminal() {
        let registry = Registry::new(10);
        let id = registry.create(config(), 2, std::path::Path::new("/tmp"));
        registry.record_outcome(
            &id,
            &RouteOutcome::Success(RouteSuccess {
                row_index: 0,
                original_fields: IndexMap::new(),
                distance_m: 1200.0,
                duration_s: 180.0,
                line: vec![],
            }),
        );
        registry.record_outcome(
            &id,
            &RouteOutcome::Failure(RouteFailure {
                row_index: 1,
                original_fields: IndexMap::new(),
                reason: FailureReason::NoRoute,
            }),
        );
        let snapshot = registry.snapshot(&id).unwrap();
        assert_eq!(snapshot.progress.processed, 2);
        assert_eq!(snapshot.progress.total_distance_m, 1200.0);
        assert_eq!(snapshot.progress.total_duration_s, 180.0);

        registry.finish(&id, JobStatus::Completed, None);
        let snapshot = registry.snapshot(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
    }

    #[test]
    fn cancel_marks_the_cancellation_token() {
        let registry = Registry::new(10);
        let id = registry.create(config(), 1, std::path::Path::new("/tmp"));
        assert!(registry.cancel(&id));
        let job = registry.get(&id).unwrap();
        assert!(job.read().cancel.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent_and_noop_once_terminal() {
        let registry = Registry::new(10);
        let id = registry.create(config(), 1, std::path::Path::new("/tmp"));
        assert!(registry.cancel(&id));
        // Second call against an already-cancelled, still-running job changes nothing.
        assert!(!registry.cancel(&id));

        let other = registry.create(config(), 1, std::path::Path::new("/tmp"));
        registry.finish(&other, JobStatus::Completed, None);
        assert!(!registry.cancel(&other));
        let job = registry.get(&other).unwrap();
        assert!(!job.read().cancel.is_cancelled());
    }

    #[test]
    fn eviction_never_drops_a_running_job() {
        let registry = Registry::new(1);
        let running = registry.create(config(), 1, std::path::Path::new("/tmp"));
        registry.get(&running).unwrap().write().start();
        let completed = registry.create(config(), 1, std::path::Path::new("/tmp"));
        registry.finish(&completed, JobStatus::Completed, None);

        registry.evict_oldest_over_capacity();

        assert!(registry.get(&running).is_some());
        assert!(registry.get(&completed).is_none());
    }

    #[test]
    fn unknown_job_operations_are_harmless() {
        let registry = Registry::new(10);
        assert!(registry.snapshot("missing").is_none());
        assert!(!registry.cancel("missing"));
        assert!(!registry.evict("missing"));
    }
}
