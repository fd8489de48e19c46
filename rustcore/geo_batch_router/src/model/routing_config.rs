//! Routing Configuration (`spec.md` §3).

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::model::upload::UploadDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPair {
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryPolicy {
    #[serde(default = "default_true")]
    pub export_geometry: bool,
    #[serde(default)]
    pub straight_line: bool,
    #[serde(default)]
    pub simplify: bool,
    pub simplify_tolerance: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl GeometryPolicy {
    /// `straightLine` and `simplify` are mutually exclusive; when both are
    /// requested, straight-line wins (`spec.md` §3 invariant).
    pub fn effective(&self) -> EffectiveGeometryPolicy {
        if !self.export_geometry {
            EffectiveGeometryPolicy::None
        } else if self.straight_line {
            EffectiveGeometryPolicy::StraightLine
        } else if self.simplify {
            EffectiveGeometryPolicy::Simplify(self.simplify_tolerance.unwrap_or(0.0))
        } else {
            EffectiveGeometryPolicy::Identity
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectiveGeometryPolicy {
    None,
    StraightLine,
    Simplify(f64),
    Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfiguration {
    pub file_id: String,
    pub reference: String,
    pub origin_fields: FieldPair,
    pub destination_fields: FieldPair,
    pub geometry: GeometryPolicy,
    pub output_format: Option<String>,
}

impl RoutingConfiguration {
    /// Validates the invariant from `spec.md` §3: the four named columns
    /// must exist in the referenced upload.
    pub fn validate_against(&self, upload: &UploadDescriptor) -> Result<(), ApiError> {
        let required = [
            &self.origin_fields.x,
            &self.origin_fields.y,
            &self.destination_fields.x,
            &self.destination_fields.y,
        ];
        for column in required {
            if !upload.has_column(column) {
                return Err(ApiError::Validation(format!(
                    "column {column:?} not present in upload {:?}",
                    upload.file_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_wins_over_simplify() {
        let policy = GeometryPolicy {
            export_geometry: true,
            straight_line: true,
            simplify: true,
            simplify_tolerance: Some(0.001),
        };
        assert_eq!(policy.effective(), EffectiveGeometryPolicy::StraightLine);
    }

    #[test]
    fn export_geometry_false_wins_over_everything() {
        let policy = GeometryPolicy {
            export_geometry: false,
            straight_line: true,
            simplify: true,
            simplify_tolerance: Some(0.001),
        };
        assert_eq!(policy.effective(), EffectiveGeometryPolicy::None);
    }

    #[test]
    fn identity_when_no_policy_selected() {
        let policy = GeometryPolicy {
            export_geometry: true,
            straight_line: false,
            simplify: false,
            simplify_tolerance: None,
        };
        assert_eq!(policy.effective(), EffectiveGeometryPolicy::Identity);
    }
}
