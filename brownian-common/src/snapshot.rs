use serde::{Serialize, Deserialize};

/// Occupancy and motion statistics at a specific tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// The tick after which the snapshot was taken (0 = initial placement).
    pub tick: u32,
    pub agent_count: u32,
    /// Number of entries in the occupancy registry.
    pub occupied_count: u32,
    /// Agents that accepted a fresh candidate during the last tick.
    pub moved_count: u32,
    /// Agents that exhausted their attempt budget and stayed in place.
    pub stalled_count: u32,
    /// Stalled agents whose original position had been taken meanwhile.
    pub contended_count: u32,
    /// Agents sharing their exact coordinate with at least one other agent.
    pub duplicate_positions: u32,
    /// Longest run of consecutive stalled ticks over all agents.
    pub max_stalled_ticks: u32,
    /// Mean candidates sampled per agent during the last tick.
    pub mean_attempts: f64,
    // Always written, bincode output has no field names to skip by.
    #[serde(default)]
    pub positions: Option<Vec<[f64; 3]>>,
}
