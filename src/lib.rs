//! Random motion for point agents that may not share a position.
//!
//! [`occupancy::OccupancyTracker`] is the shared registry of claimed
//! positions; [`motion::BrownianMotion`] moves one agent per call against it.
//! The remaining modules form a small host that seeds agents, runs ticks on
//! the rayon pool and writes results.

pub mod boundary;
pub mod motion;
pub mod occupancy;
pub mod output;
pub mod simulation;

pub use motion::{step_global, Agent, BrownianMotion, RandomSource, StepOutcome};
pub use occupancy::OccupancyTracker;
pub use simulation::{Particle, Simulation, TickStats};
