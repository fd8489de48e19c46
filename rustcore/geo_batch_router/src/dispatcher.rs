//! Dispatcher (C6, `spec.md` §4.6) — the core windowed fan-out/fan-in
//! engine. A job's rows are consumed in B-sized windows; within a window,
//! up to K route requests are in flight against the routing daemon at
//! once. Grounded on the teacher's `metrics_task`/`tcp_task` concurrent
//! loop shape in `main.rs` (`tokio::select!` over long-running tasks)
//! generalized to a two-level batch/sub-batch pipeline, since the
//! teacher itself has no batch-of-requests concept.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broadcaster::Broadcaster;
use crate::model::job::{Job, JobEvent, JobEventKind, JobStatus};
use crate::model::route_outcome::{FailureReason, RouteFailure, RouteOutcome, RouteSuccess};
use crate::model::routing_config::RoutingConfiguration;
use crate::model::upload::UploadDescriptor;
use crate::projection;
use crate::registry::Registry;
use crate::result_writer::{self, ResultWriter};
use crate::routing_client::{RouteRequest, RoutingClient};
use crate::row_iterator::{self, Row, RowIterator, RowIteratorError};
use crate::{geometry, upload_store::UploadStore};

/// Runs a job to completion (or to cancellation, or to a fatal error) and
/// updates the registry/broadcaster as it goes. Intended to be spawned
/// onto its own task immediately after a job is created (`spec.md` §4.6
/// step 1, "submission returns `202 Accepted` without waiting").
#[tracing::instrument(skip(registry, broadcaster, routing_client, upload_store), fields(job_id = %job_id))]
pub async fn run(
    job_id: String,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
    routing_client: RoutingClient,
    upload_store: Arc<UploadStore>,
    batch_size: usize,
    osrm_max_concurrent: usize,
) {
    let outcome = run_inner(
        &job_id,
        &registry,
        &broadcaster,
        &routing_client,
        &upload_store,
        batch_size,
        osrm_max_concurrent,
    )
    .await;

    let (status, error) = match outcome {
        Ok(()) => (JobStatus::Completed, None),
        Err(DispatchError::Cancelled) => (JobStatus::Failed, Some("cancelled by user".to_string())),
        Err(DispatchError::Fatal(message)) => {
            tracing::error!(%message, "job_fatal");
            (JobStatus::Failed, Some(message))
        }
    };

    if let Some(snapshot) = registry.finish(&job_id, status, error) {
        broadcaster.publish(JobEvent {
            job_id: job_id.clone(),
            kind: if status == JobStatus::Completed { JobEventKind::Completed } else { JobEventKind::Failed },
            progress: Some(snapshot.progress),
            status: Some(snapshot.status),
        });
    }
}

enum DispatchError {
    Cancelled,
    Fatal(String),
}

async fn run_inner(
    job_id: &str,
    registry: &Arc<Registry>,
    broadcaster: &Arc<Broadcaster>,
    routing_client: &RoutingClient,
    upload_store: &Arc<UploadStore>,
    batch_size: usize,
    osrm_max_concurrent: usize,
) -> Result<(), DispatchError> {
    let (configuration, cancel, result_path, metadata_path, upload_path) = {
        let job = registry.get(job_id).ok_or_else(|| DispatchError::Fatal("job vanished before start".into()))?;
        let mut guard = job.write();
        guard.start();
        let upload_path = upload_store
            .resolve(&guard.configuration.file_id)
            .map_err(|e| DispatchError::Fatal(e.to_string()))?;
        (
            guard.configuration.clone(),
            guard.cancel.clone(),
            guard.result_path.clone(),
            guard.metadata_path.clone(),
            upload_path,
        )
    };

    let descriptor = registry
        .upload_descriptor_for_file(&configuration.file_id)
        .ok_or_else(|| DispatchError::Fatal("missing upload descriptor".into()))?;

    let mut rows = RowIterator::open(&upload_path, &descriptor)
        .map_err(|e| DispatchError::Fatal(format!("opening upload: {e}")))?;

    let mut writer = ResultWriter::create(result_path.clone())
        .await
        .map_err(|e| DispatchError::Fatal(format!("creating result file: {e}")))?;

    let result = process_all_windows(
        job_id,
        registry,
        broadcaster,
        routing_client,
        &configuration,
        &cancel,
        &mut rows,
        &mut writer,
        batch_size,
        osrm_max_concurrent,
    )
    .await;

    match &result {
        Ok(()) => {
            writer.finish().await.map_err(|e| DispatchError::Fatal(format!("finalizing result file: {e}")))?;
        }
        Err(_) => {
            writer.abort().await.ok();
        }
    }

    if let Some(snapshot) = registry.snapshot(job_id) {
        result_writer::write_metadata_to(&metadata_path, &result_path, &snapshot).await.ok();
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn process_all_windows(
    job_id: &str,
    registry: &Arc<Registry>,
    broadcaster: &Arc<Broadcaster>,
    routing_client: &RoutingClient,
    configuration: &RoutingConfiguration,
    cancel: &CancellationToken,
    rows: &mut RowIterator,
    writer: &mut ResultWriter,
    batch_size: usize,
    osrm_max_concurrent: usize,
) -> Result<(), DispatchError> {
    loop {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let window = take_window(rows, batch_size);
        if window.is_empty() {
            return Ok(());
        }

        for sub_window in window.chunks(osrm_max_concurrent) {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }

            let outcomes = dispatch_sub_window(routing_client, configuration, sub_window, cancel).await;

            for outcome in outcomes {
                // Failed rows are counted but never written as features
                // (`spec.md` §4.5 "omitted from the feature collection but
                // counted in the summary", §8 invariant 4).
                if let RouteOutcome::Success(success) = &outcome {
                    writer
                        .write_success(success)
                        .await
                        .map_err(|e| DispatchError::Fatal(format!("writing feature: {e}")))?;
                }
                let progress = registry.record_outcome(job_id, &outcome);
                if let Some(progress) = progress {
                    broadcaster.publish(JobEvent {
                        job_id: job_id.to_string(),
                        kind: JobEventKind::Progress,
                        progress: Some(progress),
                        status: Some(JobStatus::Processing),
                    });
                }
            }
        }
    }
}

fn take_window(rows: &mut RowIterator, size: usize) -> Vec<Result<Row, RowIteratorError>> {
    let mut window = Vec::with_capacity(size);
    for _ in 0..size {
        match rows.next_row() {
            Some(row) => window.push(row),
            None => break,
        }
    }
    window
}

/// Parses, reprojects, and routes every row in a sub-window concurrently,
/// bounded at `sub_window.len() <= K` in-flight daemon calls (`spec.md`
/// §4.1, §4.6 step 4).
async fn dispatch_sub_window(
    routing_client: &RoutingClient,
    configuration: &RoutingConfiguration,
    sub_window: &[Result<Row, RowIteratorError>],
    cancel: &CancellationToken,
) -> Vec<RouteOutcome> {
    let mut prepared = Vec::with_capacity(sub_window.len());
    let mut requests = Vec::new();
    let mut request_slots = Vec::new();

    for (slot, row_result) in sub_window.iter().enumerate() {
        match row_result {
            Err(_) => {
                prepared.push(None);
            }
            Ok(row) => match prepare_request(row, configuration) {
                Ok(request) => {
                    prepared.push(None);
                    request_slots.push(slot);
                    requests.push(request);
                }
                Err(reason) => {
                    prepared.push(Some(RouteOutcome::Failure(RouteFailure {
                        row_index: row.index,
                        original_fields: row.fields.clone(),
                        reason,
                    })));
                }
            },
        }
    }

    let call_outcomes = routing_client.calculate_batch(requests, cancel).await;

    for (call_outcome, slot) in call_outcomes.into_iter().zip(request_slots.into_iter()) {
        let row = sub_window[slot].as_ref().expect("slot is only populated for Ok rows");
        prepared[slot] = Some(match call_outcome {
            Ok(success) => {
                let line = geometry::transform(&success.line, configuration.geometry.effective());
                RouteOutcome::Success(RouteSuccess {
                    row_index: row.index,
                    original_fields: row.fields.clone(),
                    distance_m: success.distance_m,
                    duration_s: success.duration_s,
                    line,
                })
            }
            Err(reason) => RouteOutcome::Failure(RouteFailure {
                row_index: row.index,
                original_fields: row.fields.clone(),
                reason,
            }),
        });
    }

    sub_window
        .iter()
        .zip(prepared.into_iter())
        .enumerate()
        .map(|(slot, (row_result, outcome))| match outcome {
            Some(outcome) => outcome,
            None => match row_result {
                // A record that failed to even parse out of the CSV reader has no
                // assigned `Row::index`; the sub-window slot is the closest
                // identifier available for the failure report.
                Err(_) => RouteOutcome::Failure(RouteFailure {
                    row_index: slot,
                    original_fields: Default::default(),
                    reason: FailureReason::MalformedRow,
                }),
                Ok(_) => unreachable!("every Ok row is assigned an outcome before this point"),
            },
        })
        .collect()
}

/// Parses the origin/destination fields named by the job configuration
/// and reprojects them to WGS84 (`spec.md` §4.2, §4.6 step 4).
fn prepare_request(row: &Row, configuration: &RoutingConfiguration) -> Result<RouteRequest, FailureReason> {
    let ox = row.fields.get(&configuration.origin_fields.x).and_then(|v| row_iterator::parse_coordinate(v));
    let oy = row.fields.get(&configuration.origin_fields.y).and_then(|v| row_iterator::parse_coordinate(v));
    let dx = row.fields.get(&configuration.destination_fields.x).and_then(|v| row_iterator::parse_coordinate(v));
    let dy = row.fields.get(&configuration.destination_fields.y).and_then(|v| row_iterator::parse_coordinate(v));

    let (ox, oy, dx, dy) = match (ox, oy, dx, dy) {
        (Some(ox), Some(oy), Some(dx), Some(dy)) => (ox, oy, dx, dy),
        _ => return Err(FailureReason::MalformedRow),
    };

    let origin = projection::to_wgs84(ox, oy, &configuration.reference).map_err(|_| FailureReason::OutOfRange)?;
    let destination =
        projection::to_wgs84(dx, dy, &configuration.reference).map_err(|_| FailureReason::OutOfRange)?;

    Ok(RouteRequest { origin, destination })
}

/// Validates that a freshly submitted configuration is consistent with
/// its referenced upload before a job is even created (`spec.md` §4.6
/// step 2, fail-fast before any daemon call is made).
pub fn validate_submission(
    configuration: &RoutingConfiguration,
    upload: &UploadDescriptor,
) -> Result<(), crate::error::ApiError> {
    configuration.validate_against(upload)?;
    crate::catalog::find(&configuration.reference)
        .ok_or_else(|| crate::error::ApiError::Validation(format!("unknown reference system {:?}", configuration.reference)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::upload::{DecimalMark, DetectedEncoding};
    use indexmap::IndexMap;

    fn row(index: usize, fields: &[(&str, &str)]) -> Row {
        let mut map = IndexMap::new();
        for (k, v) in fields {
            map.insert(k.to_string(), v.to_string());
        }
        Row { index, fields: map }
    }

    fn config() -> RoutingConfiguration {
        use crate::model::routing_config::{FieldPair, GeometryPolicy};
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
    fn prepare_request_parses_and_reprojects_valid_row() {
        let r = row(0, &[("ox", "2.35"), ("oy", "48.85"), ("dx", "2.29"), ("dy", "48.87")]);
        let request = prepare_request(&r, &config()).unwrap();
        assert!((request.origin.0 - 2.35).abs() < 1e-9);
    }

    #[test]
    fn prepare_request_rejects_missing_column_values() {
        let r = row(0, &[("ox", "2.35"), ("oy", "48.85")]);
        let err = prepare_request(&r, &config()).unwrap_err();
        assert_eq!(err, FailureReason::MalformedRow);
    }

    #[test]
    fn prepare_request_rejects_non_numeric_coordinates() {
        let r = row(0, &[("ox", "not-a-number"), ("oy", "48.85"), ("dx", "2.29"), ("dy", "48.87")]);
        let err = prepare_request(&r, &config()).unwrap_err();
        assert_eq!(err, FailureReason::MalformedRow);
    }

    #[test]
    fn validate_submission_rejects_unknown_reference() {
        let mut conf = config();
        conf.reference = "EPSG:999999".into();
        let upload = UploadDescriptor {
            file_id: "f1".into(),
            original_name: "f.csv".into(),
            byte_size: 0,
            encoding: DetectedEncoding::Utf8,
            separator: b',',
            decimal_mark: DecimalMark::Dot,
            columns: vec!["ox".into(), "oy".into(), "dx".into(), "dy".into()],
            row_count: 1,
        };
        assert!(validate_submission(&conf, &upload).is_err());
    }
}
