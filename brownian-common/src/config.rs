use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use crate::vecmath::Vec3;
use std::path::Path;

// How positions leaving the universe box are treated by the host.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Positions are never touched.
    #[default]
    Open,
    /// Positions are clamped onto the box faces.
    Closed,
    /// Positions wrap around periodically.
    Torus,
}

// Extent of the simulated space
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UniverseConfig {
    pub min: [f64; 3],
    pub max: [f64; 3],
    #[serde(default)]
    pub boundary: BoundaryMode,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub total_ticks: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval_ticks: u32,
}

fn default_record_interval() -> u32 {
    1
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub num_agents: u32,
    pub placement_seed: u64,
}

/// How a sampled candidate is validated and committed to the registry.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClaimPolicy {
    /// Check with `is_occupied`, write the position, then `occupy`.
    /// Two concurrent agents can both accept the same free candidate.
    #[default]
    CheckThenClaim,
    /// Claim each candidate with a single insert-if-absent.
    AtomicClaim,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MotionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Each displacement component is drawn from `[-half_width, half_width]`.
    #[serde(default = "default_half_width")]
    pub half_width: f64,
    #[serde(default)]
    pub claim_policy: ClaimPolicy,
}

fn default_max_attempts() -> u32 {
    100
}

fn default_half_width() -> f64 {
    0.5
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            max_attempts: default_max_attempts(),
            half_width: default_half_width(),
            claim_policy: ClaimPolicy::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_positions: bool,
    pub save_stats: bool,
    #[serde(default)]
    pub save_positions_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub universe: UniverseConfig,
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub motion: MotionConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_conditions.num_agents == 0 {
            anyhow::bail!("num_agents must be greater than 0.");
        }
        if self.motion.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0.");
        }
        if !(self.motion.half_width.is_finite() && self.motion.half_width > 0.0) {
            anyhow::bail!("half_width must be positive and finite.");
        }
        let (min, max) = (Vec3::from_array(self.universe.min), Vec3::from_array(self.universe.max));
        if !(min.is_finite() && max.is_finite()) {
            anyhow::bail!("universe bounds must be finite.");
        }
        if min.x >= max.x || min.y >= max.y || min.z >= max.z {
            anyhow::bail!("universe min must be below max on every axis.");
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let bounds_min = Vec3::from_array(self.universe.min);
        let bounds_max = Vec3::from_array(self.universe.max);
        let extent = bounds_max.sub(bounds_min);

        SimParams {
            bounds_min,
            bounds_max,
            volume: extent.x * extent.y * extent.z,
            boundary: self.universe.boundary,
            max_attempts: self.motion.max_attempts,
            half_width: self.motion.half_width,
            claim_policy: self.motion.claim_policy,
        }
    }
}
