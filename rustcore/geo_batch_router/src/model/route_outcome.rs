//! Route Outcome (`spec.md` §3) — the per-row result the dispatcher
//! produces, either a successful route or a recorded failure reason.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Discriminated row-level failure reasons (`spec.md` §4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidRequest,
    NoRoute,
    Unreachable,
    Timeout,
    Cancelled,
    MalformedResponse,
    MalformedRow,
    OutOfRange,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::InvalidRequest => "invalid_request",
            FailureReason::NoRoute => "no_route",
            FailureReason::Unreachable => "unreachable",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
            FailureReason::MalformedResponse => "malformed_response",
            FailureReason::MalformedRow => "malformed_row",
            FailureReason::OutOfRange => "out_of_range",
        };
        f.write_str(s)
    }
}

/// An ordered `(lon, lat)` pair. `-180 <= lon <= 180`, `-90 <= lat <= 90`.
pub type LonLat = (f64, f64);

#[derive(Debug, Clone)]
pub struct RouteSuccess {
    pub row_index: usize,
    pub original_fields: IndexMap<String, String>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub line: Vec<LonLat>,
}

#[derive(Debug, Clone)]
pub struct RouteFailure {
    pub row_index: usize,
    pub original_fields: IndexMap<String, String>,
    pub reason: FailureReason,
}

#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Success(RouteSuccess),
    Failure(RouteFailure),
}

impl RouteOutcome {
    pub fn row_index(&self) -> usize {
        match self {
            RouteOutcome::Success(s) => s.row_index,
            RouteOutcome::Failure(f) => f.row_index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RouteOutcome::Success(_))
    }
}
