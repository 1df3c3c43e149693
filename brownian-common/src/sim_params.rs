use serde::{Deserialize, Serialize};
use crate::config::{BoundaryMode, ClaimPolicy};
use crate::vecmath::Vec3;

/// Simulation parameters derived from the configuration, used every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Universe
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    pub volume: f64,
    pub boundary: BoundaryMode,

    // Motion
    pub max_attempts: u32,
    pub half_width: f64,
    pub claim_policy: ClaimPolicy,
}
