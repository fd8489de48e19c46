//! Coordinate Reference Descriptor (`spec.md` §3).

use serde::{Deserialize, Serialize};

/// An immutable, process-lifetime description of a coordinate reference system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceDescriptor {
    /// e.g. `"EPSG:4326"`.
    pub code: String,
    pub name: String,
    pub region: String,
    pub datum: String,
    pub proj4: String,
}
