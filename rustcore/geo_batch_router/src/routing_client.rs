//! Routing Client (C1, `spec.md` §4.1).
//!
//! A single-request call against an OSRM-compatible routing daemon, plus a
//! bounded-concurrency batch helper. Grounded on the teacher crate's
//! `RoutingEngine::route_request` (`routing.rs`) for the shape of "call
//! out, time the call, return a typed response or a typed failure" — the
//! teacher picks among known replicas, this picks a route from an external
//! daemon instead, but the request/response/metrics shape is the same
//! idiom. The outbound HTTP plumbing itself is enriched from the pack's
//! `reqwest`-based services since the teacher speaks a custom TCP framing
//! protocol, not HTTP.

use std::time::Duration;

use futures::stream::{FuturesOrdered, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::model::route_outcome::{FailureReason, LonLat};

#[derive(Debug, Clone, Copy)]
pub struct RouteRequest {
    pub origin: LonLat,
    pub destination: LonLat,
}

#[derive(Debug, Clone)]
pub struct RouteSuccess {
    pub distance_m: f64,
    pub duration_s: f64,
    pub line: Vec<LonLat>,
}

pub type RouteOutcome = Result<RouteSuccess, FailureReason>;

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: Option<OsrmGeometry>,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    routes: Option<Vec<OsrmRoute>>,
    #[allow(dead_code)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct RoutingClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    request_delay: Duration,
}

impl RoutingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, request_delay: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
            request_delay,
        }
    }

    /// Single-request call: `GET {base}/route/v1/driving/{o};{d}?overview=full&geometries=geojson`
    /// (`spec.md` §6 "External routing daemon protocol").
    pub async fn calculate(&self, request: RouteRequest, cancel: &CancellationToken) -> RouteOutcome {
        if cancel.is_cancelled() {
            return Err(FailureReason::Cancelled);
        }

        if !self.request_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.request_delay) => {}
                _ = cancel.cancelled() => return Err(FailureReason::Cancelled),
            }
        }

        let url = format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url.trim_end_matches('/'),
            request.origin.0,
            request.origin.1,
            request.destination.0,
            request.destination.1,
        );

        let call = self.http.get(&url).send();

        let response = tokio::select! {
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    return Err(classify_transport_error(&e));
                }
                Err(_elapsed) => return Err(FailureReason::Timeout),
            },
            _ = cancel.cancelled() => return Err(FailureReason::Cancelled),
        };

        if !response.status().is_success() {
            return Err(FailureReason::InvalidRequest);
        }

        let body: OsrmResponse = tokio::select! {
            result = response.json() => result.map_err(|_| FailureReason::MalformedResponse)?,
            _ = cancel.cancelled() => return Err(FailureReason::Cancelled),
        };

        if body.code != "Ok" {
            return Err(FailureReason::NoRoute);
        }

        let route = body
            .routes
            .and_then(|routes| routes.into_iter().next())
            .ok_or(FailureReason::NoRoute)?;

        let geometry = route.geometry.ok_or(FailureReason::MalformedResponse)?;
        if geometry.coordinates.len() < 2 {
            return Err(FailureReason::MalformedResponse);
        }

        Ok(RouteSuccess {
            distance_m: route.distance.max(0.0),
            duration_s: route.duration.max(0.0),
            line: geometry.coordinates.into_iter().map(|c| (c[0], c[1])).collect(),
        })
    }

    /// Fires a window of up to K requests fully in parallel (fan-out) and
    /// returns once every one of them has settled (fan-in), in submission
    /// order (`spec.md` §4.1 "Batch helper", §5 "Ordering guarantees").
    pub async fn calculate_batch(
        &self,
        requests: Vec<RouteRequest>,
        cancel: &CancellationToken,
    ) -> Vec<RouteOutcome> {
        let mut futures = FuturesOrdered::new();
        for request in requests {
            futures.push_back(self.calculate(request, cancel));
        }
        futures.collect().await
    }
}

fn classify_transport_error(error: &reqwest::Error) -> FailureReason {
    if error.is_timeout() {
        FailureReason::Timeout
    } else if error.is_connect() {
        FailureReason::Unreachable
    } else if error.is_decode() {
        FailureReason::MalformedResponse
    } else {
        FailureReason::Unreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::net::SocketAddr;

    async fn spawn_stub(body: &'static str, status: u16) -> String {
        let app = Router::new().route(
            "/route/v1/driving/*rest",
            get(move || async move {
                (
                    axum::http::StatusCode::from_u16(status).unwrap(),
                    [("content-type", "application/json")],
                    body,
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn successful_route_is_parsed() {
        let body = r#"{"code":"Ok","routes":[{"distance":1200.5,"duration":180.0,"geometry":{"type":"LineString","coordinates":[[2.35,48.85],[2.29,48.87]]}}]}"#;
        let base_url = spawn_stub(body, 200).await;
        let client = RoutingClient::new(base_url, Duration::from_secs(5), Duration::ZERO);
        let cancel = CancellationToken::new();

        let outcome = client
            .calculate(
                RouteRequest { origin: (2.35, 48.85), destination: (2.29, 48.87) },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(outcome.distance_m, 1200.5);
        assert_eq!(outcome.duration_s, 180.0);
        assert_eq!(outcome.line.len(), 2);
    }

    #[tokio::test]
    async fn no_route_daemon_code_is_row_failed() {
        let body = r#"{"code":"NoRoute","routes":null,"message":"no route found"}"#;
        let base_url = spawn_stub(body, 200).await;
        let client = RoutingClient::new(base_url, Duration::from_secs(5), Duration::ZERO);
        let cancel = CancellationToken::new();

        let outcome = client
            .calculate(
                RouteRequest { origin: (0.0, 0.0), destination: (1.0, 1.0) },
                &cancel,
            )
            .await;

        assert_eq!(outcome.unwrap_err(), FailureReason::NoRoute);
    }

    #[tokio::test]
    async fn unreachable_daemon_is_row_failed_not_job_fatal() {
        // Port 0 bound-and-dropped connections fail fast with connection refused.
        let client = RoutingClient::new("http://127.0.0.1:1", Duration::from_secs(2), Duration::ZERO);
        let cancel = CancellationToken::new();

        let outcome = client
            .calculate(
                RouteRequest { origin: (0.0, 0.0), destination: (1.0, 1.0) },
                &cancel,
            )
            .await;

        assert_eq!(outcome.unwrap_err(), FailureReason::Unreachable);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_any_request() {
        let client = RoutingClient::new("http://127.0.0.1:1", Duration::from_secs(2), Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = client
            .calculate(
                RouteRequest { origin: (0.0, 0.0), destination: (1.0, 1.0) },
                &cancel,
            )
            .await;

        assert_eq!(outcome.unwrap_err(), FailureReason::Cancelled);
    }

    #[tokio::test]
    async fn batch_preserves_submission_order() {
        let body = r#"{"code":"Ok","routes":[{"distance":1.0,"duration":1.0,"geometry":{"type":"LineString","coordinates":[[0.0,0.0],[1.0,1.0]]}}]}"#;
        let base_url = spawn_stub(body, 200).await;
        let client = RoutingClient::new(base_url, Duration::from_secs(5), Duration::ZERO);
        let cancel = CancellationToken::new();

        let requests: Vec<_> = (0..5)
            .map(|i| RouteRequest { origin: (i as f64, 0.0), destination: (i as f64, 1.0) })
            .collect();
        let outcomes = client.calculate_batch(requests, &cancel).await;
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.is_ok()));
    }
}
