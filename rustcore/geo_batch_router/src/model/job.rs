//! Job (`spec.md` §3) — created by submission, destroyed by cleanup.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::model::routing_config::RoutingConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    /// Running sum of `distance_m` across every successful outcome so far
    /// (`spec.md` §4.5, the metadata document's "cumulative distance").
    pub total_distance_m: f64,
    /// Running sum of `duration_s` across every successful outcome so far
    /// (`spec.md` §4.5, the metadata document's "cumulative duration").
    pub total_duration_s: f64,
}

impl Progress {
    /// `spec.md` §8 invariant 2: `processed == successful + failed` at every
    /// observation point.
    pub fn record_success(&mut self, distance_m: f64, duration_s: f64) {
        self.processed += 1;
        self.successful += 1;
        self.total_distance_m += distance_m;
        self.total_duration_s += duration_s;
    }

    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }
}

/// A snapshot of a `Job`, safe to serialize and hand to a reader without
/// holding any lock on the live record (`spec.md` §3, "Ownership").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub progress: Progress,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub configuration: RoutingConfiguration,
    pub error: Option<String>,
}

/// The live, mutable job record. Exclusively owned by the Job Registry
/// (`spec.md` §3, "Ownership"); the dispatcher holds a write reference for
/// the duration of its run, HTTP handlers only ever read a `JobSnapshot`.
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub progress: Progress,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub configuration: RoutingConfiguration,
    pub error: Option<String>,
    pub cancel: CancellationToken,
    pub result_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl Job {
    pub fn new(configuration: RoutingConfiguration, total: usize, results_dir: &std::path::Path) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            result_path: results_dir.join(format!("routing_results_{id}.geojson")),
            metadata_path: results_dir.join(format!("routing_metadata_{id}.json")),
            id,
            status: JobStatus::Pending,
            progress: Progress {
                total,
                ..Default::default()
            },
            started_at: None,
            completed_at: None,
            configuration,
            error: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Forward-only transition to `processing` (`spec.md` §4.6 state machine).
    pub fn start(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Forward-only transition to a terminal state. Once terminal, calling
    /// this again is a no-op (`spec.md` §4.6: "Only forward transitions are
    /// permitted; once terminal, no transition occurs").
    pub fn finish(&mut self, status: JobStatus, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            started_at: self.started_at,
            completed_at: self.completed_at,
            configuration: self.configuration.clone(),
            error: self.error.clone(),
        }
    }
}

/// Broadcaster event kinds (`spec.md` §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobEventKind {
    Progress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: String,
    pub kind: JobEventKind,
    pub progress: Option<Progress>,
    pub status: Option<JobStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::routing_config::{FieldPair, GeometryPolicy, RoutingConfiguration};

    fn sample_config() -> RoutingConfiguration {
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
    fn finish_is_idempotent_once_terminal() {
        let mut job = Job::new(sample_config(), 10, std::path::Path::new("/tmp"));
        job.start();
        job.finish(JobStatus::Completed, None);
        assert_eq!(job.status, JobStatus::Completed);
        let completed_at = job.completed_at;

        // Second transition attempt must not change anything.
        job.finish(JobStatus::Failed, Some("cancelled by user".into()));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, completed_at);
        assert!(job.error.is_none());
    }

    #[test]
    fn progress_counters_stay_consistent() {
        let mut p = Progress { total: 3, ..Default::default() };
        p.record_success(1200.0, 180.0);
        p.record_failure();
        assert_eq!(p.processed, p.successful + p.failed);
        assert!(p.processed <= p.total);
        assert_eq!(p.total_distance_m, 1200.0);
        assert_eq!(p.total_duration_s, 180.0);
    }
}
