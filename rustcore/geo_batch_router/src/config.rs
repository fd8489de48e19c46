//! Environment-driven configuration, mirroring the `spec.md` §6 variable table.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub osrm_url: String,
    pub results_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub log_dir: PathBuf,
    /// B — the dispatcher's row-window size (`spec.md` §4.6 step 3).
    pub batch_size: usize,
    /// K — the routing client's concurrent-request window size (`spec.md` §4.1).
    pub osrm_max_concurrent: usize,
    /// Optional per-request jitter; see `spec.md` §9 "Open question — OSRM_REQUEST_DELAY".
    pub osrm_request_delay: Duration,
    pub max_jobs_kept: usize,
    #[allow(dead_code)] // surfaced for parity with spec.md §6; enforced by the (excluded) housekeeper
    pub max_results_kept: usize,
    /// Per-request timeout for a single routing-client call (`spec.md` §4.1, default 30s).
    pub job_timeout: Duration,
    #[allow(dead_code)] // governs the excluded file-cleanup scheduler, see SPEC_FULL.md §9
    pub file_cleanup_interval: Duration,
    #[allow(dead_code)]
    pub immediate_cleanup: bool,
    pub bind_addr: std::net::SocketAddr,
    pub max_upload_bytes: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let batch_size: usize = env_or("BATCH_SIZE", 100).context("BATCH_SIZE")?;
        let osrm_max_concurrent: usize =
            env_or("OSRM_MAX_CONCURRENT", 50).context("OSRM_MAX_CONCURRENT")?;
        let osrm_request_delay_ms: u64 =
            env_or("OSRM_REQUEST_DELAY", 0).context("OSRM_REQUEST_DELAY")?;
        let job_timeout_s: u64 = env_or("JOB_TIMEOUT", 30).context("JOB_TIMEOUT")?;
        let file_cleanup_interval_s: u64 =
            env_or("FILE_CLEANUP_INTERVAL", 3600).context("FILE_CLEANUP_INTERVAL")?;
        let port: u16 = env_or("PORT", 3000).context("PORT")?;

        Ok(Self {
            osrm_url: std::env::var("OSRM_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
            results_dir: std::env::var("RESULTS_DIR")
                .unwrap_or_else(|_| "./results".to_string())
                .into(),
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "./uploads".to_string())
                .into(),
            log_dir: std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()).into(),
            batch_size,
            osrm_max_concurrent,
            osrm_request_delay: Duration::from_millis(osrm_request_delay_ms),
            max_jobs_kept: env_or("MAX_JOBS_KEPT", 100).context("MAX_JOBS_KEPT")?,
            max_results_kept: env_or("MAX_RESULTS_KEPT", 100).context("MAX_RESULTS_KEPT")?,
            job_timeout: Duration::from_secs(job_timeout_s),
            file_cleanup_interval: Duration::from_secs(file_cleanup_interval_s),
            immediate_cleanup: env_or("IMMEDIATE_CLEANUP", false)
                .context("IMMEDIATE_CLEANUP")?,
            bind_addr: std::net::SocketAddr::from(([0, 0, 0, 0], port)),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)
                .context("MAX_UPLOAD_BYTES")?,
        })
    }

    pub async fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.results_dir, &self.upload_dir, &self.log_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating directory {dir:?}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default_when_unset() {
        std::env::remove_var("GBR_TEST_KEY_NOT_SET");
        let v: usize = env_or("GBR_TEST_KEY_NOT_SET", 7).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn env_or_rejects_malformed_values() {
        std::env::set_var("GBR_TEST_KEY_BAD", "not-a-number");
        let result = env_or::<usize>("GBR_TEST_KEY_BAD", 7);
        assert!(result.is_err());
        std::env::remove_var("GBR_TEST_KEY_BAD");
    }
}
