//! Result Writer (C5, `spec.md` §4.5).
//!
//! Streams a GeoJSON `FeatureCollection` to disk one feature at a time —
//! header, features joined by commas, footer — so a job with a million
//! rows never holds more than a single feature's geometry in memory at
//! once. The sibling metadata document is written atomically (temp file
//! + rename) once the job reaches a terminal state, the same
//! write-then-rename idiom the teacher pack's daemon lifecycle module
//! uses for its own state file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::model::job::JobSnapshot;
use crate::model::route_outcome::{LonLat, RouteSuccess};
use crate::model::routing_config::RoutingConfiguration;

pub struct ResultWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    wrote_any_feature: bool,
}

impl ResultWriter {
    /// Opens `path` and writes the `FeatureCollection` header. Callers must
    /// call [`ResultWriter::finish`] (success) or [`ResultWriter::abort`]
    /// (failure) exactly once.
    pub async fn create(path: PathBuf) -> std::io::Result<Self> {
        let file = File::create(&path).await?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(br#"{"type":"FeatureCollection","features":["#)
            .await?;
        Ok(Self { writer, path, wrote_any_feature: false })
    }

    async fn write_feature_separator(&mut self) -> std::io::Result<()> {
        if self.wrote_any_feature {
            self.writer.write_all(b",").await?;
        }
        self.wrote_any_feature = true;
        Ok(())
    }

    /// Appends one successful route as a GeoJSON `LineString` feature
    /// (`spec.md` §4.5 feature shape). `line` may be empty when geometry
    /// export is disabled, in which case the feature carries a `null`
    /// geometry but keeps its properties — the row is still a success.
    pub async fn write_success(&mut self, success: &RouteSuccess) -> std::io::Result<()> {
        self.write_feature_separator().await?;

        let geometry = if success.line.is_empty() {
            serde_json::Value::Null
        } else {
            json!({
                "type": "LineString",
                "coordinates": success.line.iter().map(|(lon, lat)| json!([lon, lat])).collect::<Vec<_>>(),
            })
        };

        let mut properties = serde_json::Map::new();
        for (k, v) in &success.original_fields {
            properties.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        properties.insert("rowIndex".into(), json!(success.row_index));
        properties.insert("distance".into(), json!(success.distance_m));
        properties.insert("duration".into(), json!(success.duration_s));
        properties.insert("distance_km".into(), json!(round_to(success.distance_m / 1000.0, 2)));
        properties.insert("duration_minutes".into(), json!(round_to(success.duration_s / 60.0, 2)));

        let feature = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        });

        self.writer.write_all(feature.to_string().as_bytes()).await
    }

    /// Writes the footer and flushes. Consumes `self` so a writer can only
    /// be finished once.
    pub async fn finish(mut self) -> std::io::Result<()> {
        self.writer.write_all(b"]}").await?;
        self.writer.flush().await
    }

    /// Drops the writer and removes the partial file (`spec.md` §7: a job
    /// that fails fatally mid-stream must not leave a corrupt, half-written
    /// GeoJSON document behind).
    pub async fn abort(self) -> std::io::Result<()> {
        drop(self.writer);
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Aggregate outcome counts and cumulative distance/duration across every
/// row routed so far (`spec.md` §4.5 "aggregate summary").
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_distance_m: f64,
    pub total_duration_s: f64,
}

#[derive(Debug, Serialize)]
pub struct JobTiming {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// The sibling metadata document written alongside a job's GeoJSON result
/// file (`spec.md` §4.5): the bare `JobSnapshot` alone is missing the
/// cumulative summary, a generation timestamp, elapsed duration, and the
/// names of both files, so this is a dedicated shape rather than a
/// re-serialized snapshot.
#[derive(Debug, Serialize)]
pub struct JobMetadataDocument {
    pub job_id: String,
    pub status: crate::model::job::JobStatus,
    pub summary: JobSummary,
    pub generated_at: DateTime<Utc>,
    pub configuration: RoutingConfiguration,
    pub timing: JobTiming,
    pub error: Option<String>,
    pub result_file: String,
    pub metadata_file: String,
}

fn file_name_of(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Writes the job's metadata document atomically: a temp file is written
/// in full, then renamed into place, so a reader never observes a
/// half-written metadata file (`spec.md` §4.5).
pub async fn write_metadata_to(metadata_path: &Path, result_path: &Path, snapshot: &JobSnapshot) -> std::io::Result<()> {
    let duration_ms = match (snapshot.started_at, snapshot.completed_at) {
        (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
        _ => None,
    };

    let document = JobMetadataDocument {
        job_id: snapshot.id.clone(),
        status: snapshot.status,
        summary: JobSummary {
            total: snapshot.progress.total,
            processed: snapshot.progress.processed,
            successful: snapshot.progress.successful,
            failed: snapshot.progress.failed,
            total_distance_m: snapshot.progress.total_distance_m,
            total_duration_s: snapshot.progress.total_duration_s,
        },
        generated_at: Utc::now(),
        configuration: snapshot.configuration.clone(),
        timing: JobTiming {
            started_at: snapshot.started_at,
            completed_at: snapshot.completed_at,
            duration_ms,
        },
        error: snapshot.error.clone(),
        result_file: file_name_of(result_path),
        metadata_file: file_name_of(metadata_path),
    };

    let tmp_path = metadata_path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(&document)?;
    {
        let mut tmp = File::create(&tmp_path).await?;
        tmp.write_all(&body).await?;
        tmp.flush().await?;
    }
    tokio::fs::rename(&tmp_path, metadata_path).await
}

/// Re-exported so dispatcher code can build a `RouteSuccess` without
/// importing the model module directly in every call site.
pub type Line = Vec<LonLat>;

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn fields() -> IndexMap<String, String> {
        let mut m = IndexMap::new();
        m.insert("name".into(), "Alice".into());
        m
    }

    #[tokio::test]
    async fn streams_a_valid_feature_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        let mut writer = ResultWriter::create(path.clone()).await.unwrap();

        writer
            .write_success(&RouteSuccess {
                row_index: 0,
                original_fields: fields(),
                distance_m: 1200.0,
                duration_s: 180.0,
                line: vec![(2.35, 48.85), (2.29, 48.87)],
            })
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        let features = parsed["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["distance_km"], 1.2);
    }

    /// `spec.md` §4.5 "failed rows are omitted from the feature collection
    /// but counted in the summary": a job where every row fails must leave
    /// behind an empty, but still valid, `FeatureCollection`.
    #[tokio::test]
    async fn all_failed_rows_yield_an_empty_feature_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.geojson");
        let writer = ResultWriter::create(path.clone()).await.unwrap();
        writer.finish().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["type"], "FeatureCollection");
        assert!(parsed["features"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abort_removes_the_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.geojson");
        let writer = ResultWriter::create(path.clone()).await.unwrap();
        writer.abort().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn metadata_write_is_atomic_and_readable() {
        use crate::model::job::{JobSnapshot, JobStatus, Progress};
        use crate::model::routing_config::{FieldPair, GeometryPolicy, RoutingConfiguration};

        let dir = tempfile::tempdir().unwrap();
        let result_path = dir.path().join("routing_results_job-1.geojson");
        let path = dir.path().join("routing_metadata_job-1.json");
        let started = Utc::now();
        let completed = started + chrono::Duration::milliseconds(2500);
        let snapshot = JobSnapshot {
            id: "job-1".into(),
            status: JobStatus::Completed,
            progress: Progress {
                total: 1,
                processed: 1,
                successful: 1,
                failed: 0,
                total_distance_m: 1200.0,
                total_duration_s: 180.0,
            },
            started_at: Some(started),
            completed_at: Some(completed),
            configuration: RoutingConfiguration {
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
            },
            error: None,
        };

        write_metadata_to(&path, &result_path, &snapshot).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let read_back: serde_json::Value = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(read_back["job_id"], "job-1");
        assert_eq!(read_back["summary"]["total_distance_m"], 1200.0);
        assert_eq!(read_back["summary"]["total_duration_s"], 180.0);
        assert_eq!(read_back["timing"]["duration_ms"], 2500);
        assert_eq!(read_back["result_file"], "routing_results_job-1.geojson");
        assert_eq!(read_back["metadata_file"], "routing_metadata_job-1.json");
        assert!(read_back["generated_at"].is_string());
    }
}
