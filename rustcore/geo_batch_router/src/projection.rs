//! Projection Transformer (C2, `spec.md` §4.2).
//!
//! Compiled proj4 transforms are cached in a `DashMap` keyed by CRS
//! identifier, the same cache-by-key idiom the teacher crate uses for its
//! replica/zone tables in `routing.rs`.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use proj4rs::Proj;

use crate::catalog;
use crate::model::route_outcome::LonLat;

static TRANSFORM_CACHE: Lazy<DashMap<String, Arc<Proj>>> = Lazy::new(DashMap::new);
static WGS84: Lazy<Arc<Proj>> = Lazy::new(|| {
    Arc::new(
        Proj::from_proj_string("+proj=longlat +datum=WGS84 +no_defs")
            .expect("WGS84 is a valid proj4 string"),
    )
});

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("unknown reference system: {0}")]
    UnknownReference(String),
    #[error("transform failed: {0}")]
    TransformFailed(String),
    #[error("result out of the WGS84 geographic envelope")]
    OutOfRange,
}

fn compiled_transform(code: &str) -> Result<Arc<Proj>, ProjectionError> {
    if let Some(existing) = TRANSFORM_CACHE.get(code) {
        return Ok(Arc::clone(&existing));
    }
    let descriptor = catalog::find(code).ok_or_else(|| ProjectionError::UnknownReference(code.to_string()))?;
    let proj = Arc::new(
        Proj::from_proj_string(&descriptor.proj4)
            .map_err(|e| ProjectionError::TransformFailed(e.to_string()))?,
    );
    TRANSFORM_CACHE.insert(code.to_string(), Arc::clone(&proj));
    Ok(proj)
}

/// Transforms `(x, y)` in the named reference system to WGS84 `(lon, lat)`.
///
/// Per `spec.md` §4.2's tie-break, inputs already tagged `EPSG:4326` still
/// traverse the transform so the pipeline has a single uniform code path.
pub fn to_wgs84(x: f64, y: f64, reference_code: &str) -> Result<LonLat, ProjectionError> {
    let source = compiled_transform(reference_code)?;

    let mut point = (x.to_radians_if_geographic(&source), y.to_radians_if_geographic(&source), 0.0_f64);
    proj4rs::transform::transform(source.as_ref(), WGS84.as_ref(), &mut point)
        .map_err(|e| ProjectionError::TransformFailed(e.to_string()))?;

    let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
    if !lon.is_finite() || !lat.is_finite() || !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(ProjectionError::OutOfRange);
    }
    Ok((lon, lat))
}

/// `proj4rs` expects geographic inputs in radians but projected (metric)
/// inputs in their native units; this helper keeps `to_wgs84`'s call site
/// free of that distinction.
trait RadiansIfGeographic {
    fn to_radians_if_geographic(self, proj: &Proj) -> f64;
}

impl RadiansIfGeographic for f64 {
    fn to_radians_if_geographic(self, proj: &Proj) -> f64 {
        if proj.is_latlong() {
            self.to_radians()
        } else {
            self
        }
    }
}
