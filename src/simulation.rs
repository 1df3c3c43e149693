use crate::boundary;
use crate::motion::{Agent, BrownianMotion, StepOutcome};
use crate::occupancy::OccupancyTracker;
use brownian_common::{Position, PositionKey, SimParams, SimulationConfig, Snapshot, Vec3};
use anyhow::Result;
use log::{debug, info};
use rand::distr::Uniform;
use rand::prelude::*;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

// Placement gives up on an agent after this many occupied samples.
const MAX_PLACEMENT_TRIES: u32 = 1_000;

/// A point agent moved by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: u64,
    pub position: Position,
    /// Consecutive ticks the particle failed to move.
    pub stalled_ticks: u32,
}

impl Particle {
    pub fn new(id: u64, position: Position) -> Self {
        Self { id, position, stalled_ticks: 0 }
    }
}

impl Agent for Particle {
    fn position(&self) -> Position {
        self.position
    }

    fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}

/// Aggregated outcomes of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickStats {
    pub moved: u32,
    pub stalled: u32,
    pub contended: u32,
    pub total_attempts: u64,
    /// Agents moved again by boundary handling.
    pub bounded: u32,
}

impl TickStats {
    fn record(outcome: &StepOutcome, bounded: bool) -> Self {
        TickStats {
            moved: outcome.moved() as u32,
            stalled: (!outcome.moved()) as u32,
            contended: outcome.contended() as u32,
            total_attempts: outcome.attempts() as u64,
            bounded: bounded as u32,
        }
    }

    fn merge(self, other: Self) -> Self {
        TickStats {
            moved: self.moved + other.moved,
            stalled: self.stalled + other.stalled,
            contended: self.contended + other.contended,
            total_attempts: self.total_attempts + other.total_attempts,
            bounded: self.bounded + other.bounded,
        }
    }

    pub fn mean_attempts(&self) -> f64 {
        let steps = self.moved + self.stalled;
        if steps > 0 {
            self.total_attempts as f64 / steps as f64
        } else {
            0.0
        }
    }
}

/// Host-side driver: owns the particles and the shared occupancy registry.
pub struct Simulation {
    config: SimulationConfig,
    params: SimParams,
    motion: BrownianMotion,
    particles: Vec<Particle>,
    tracker: Arc<OccupancyTracker>,
    /// The current tick number.
    current_tick: u32,
    last_tick: TickStats,
    recorded_snapshots: Vec<Snapshot>,
}

impl Simulation {
    /// Creates a simulation with a fresh registry and randomly placed particles.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        Self::with_tracker(config, OccupancyTracker::shared())
    }

    /// Like [`Simulation::new`] but registers particles in the given tracker.
    pub fn with_tracker(config: SimulationConfig, tracker: Arc<OccupancyTracker>) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let mut rng = StdRng::seed_from_u64(config.initial_conditions.placement_seed);

        let positions = place_initial_agents(&config, &params, &tracker, &mut rng)?;
        let particles = positions
            .into_iter()
            .enumerate()
            .map(|(idx, pos)| Particle::new(idx as u64, pos))
            .collect();

        Ok(Self {
            motion: BrownianMotion::from_params(&params),
            config,
            params,
            particles,
            tracker,
            current_tick: 0,
            last_tick: TickStats::default(),
            recorded_snapshots: Vec::new(),
        })
    }

    /// Advances every particle by one motion step, in parallel.
    pub fn step(&mut self) -> Result<TickStats> {
        let tick = self.current_tick;
        let seed = self.config.initial_conditions.placement_seed;
        let motion = self.motion;
        let params = &self.params;
        let tracker = &*self.tracker;

        let stats = self
            .particles
            .par_iter_mut()
            .enumerate()
            .map(|(idx, particle)| {
                // Per-particle stream so no RNG is shared between threads.
                let particle_seed = seed
                    .wrapping_add(idx as u64)
                    .wrapping_add((tick as u64) << 32);
                let mut rng = StdRng::seed_from_u64(particle_seed);

                let outcome = motion.step(particle, &mut rng, tracker);
                let bounded = boundary::enforce(particle, tracker, params);
                if outcome.moved() {
                    particle.stalled_ticks = 0;
                } else {
                    particle.stalled_ticks += 1;
                }
                TickStats::record(&outcome, bounded)
            })
            .reduce(TickStats::default, TickStats::merge);

        debug!(
            "Tick {}: moved={} stalled={} contended={} bounded={} mean_attempts={:.2}",
            tick,
            stats.moved,
            stats.stalled,
            stats.contended,
            stats.bounded,
            stats.mean_attempts()
        );

        self.last_tick = stats;
        self.current_tick += 1;
        Ok(stats)
    }

    /// Collects the current statistics and stores them as a Snapshot.
    pub fn record_snapshot(&mut self) -> Result<()> {
        debug!("Recording snapshot at tick {}...", self.current_tick);

        let positions = if self.config.output.save_positions_in_snapshot {
            Some(self.get_results())
        } else {
            None
        };

        let max_stalled_ticks = self.particles.iter().map(|p| p.stalled_ticks).max().unwrap_or(0);

        let snapshot = Snapshot {
            tick: self.current_tick,
            agent_count: self.particles.len() as u32,
            occupied_count: self.tracker.len() as u32,
            moved_count: self.last_tick.moved,
            stalled_count: self.last_tick.stalled,
            contended_count: self.last_tick.contended,
            duplicate_positions: self.count_duplicate_positions(),
            max_stalled_ticks,
            mean_attempts: self.last_tick.mean_attempts(),
            positions,
        };
        if snapshot.duplicate_positions > 0 {
            info!(
                "Tick {}: {} agents share a coordinate with another agent.",
                snapshot.tick, snapshot.duplicate_positions
            );
        }

        self.recorded_snapshots.push(snapshot);
        Ok(())
    }

    /// Agents whose exact coordinate is also held by another agent.
    pub fn count_duplicate_positions(&self) -> u32 {
        let mut counts: HashMap<PositionKey, u32> = HashMap::with_capacity(self.particles.len());
        for particle in &self.particles {
            *counts.entry(particle.position.key()).or_insert(0) += 1;
        }
        counts.values().filter(|&&c| c > 1).sum()
    }

    /// Releases the occupancy registry. Call once after the last tick.
    pub fn shutdown(&self) {
        self.tracker.shutdown();
        info!("Occupancy registry released after {} ticks.", self.current_tick);
    }

    pub fn get_results(&self) -> Vec<[f64; 3]> {
        self.particles.iter().map(|p| p.position.to_array()).collect()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn current_agent_count(&self) -> u32 {
        self.particles.len() as u32
    }

    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    pub fn tracker(&self) -> &Arc<OccupancyTracker> {
        &self.tracker
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn get_recorded_snapshots(&self) -> &Vec<Snapshot> {
        &self.recorded_snapshots
    }
}

/// Samples each agent uniformly inside the universe box, skipping occupied positions.
fn place_initial_agents(
    config: &SimulationConfig,
    params: &SimParams,
    tracker: &OccupancyTracker,
    rng: &mut StdRng,
) -> Result<Vec<Position>> {
    let count = config.initial_conditions.num_agents as usize;
    let (min, max) = (params.bounds_min, params.bounds_max);
    let dist_x = Uniform::new(min.x, max.x)?;
    let dist_y = Uniform::new(min.y, max.y)?;
    let dist_z = Uniform::new(min.z, max.z)?;

    let mut positions = Vec::with_capacity(count);
    for agent in 0..count {
        let mut placed = false;
        for _ in 0..MAX_PLACEMENT_TRIES {
            let pos = Vec3::new(rng.sample(&dist_x), rng.sample(&dist_y), rng.sample(&dist_z));
            if tracker.try_claim(pos) {
                positions.push(pos);
                placed = true;
                break;
            }
        }
        if !placed {
            anyhow::bail!("Could not find a free position for agent {} of {}.", agent, count);
        }
    }
    info!("Placed {} agents in a {:.2} volume box.", positions.len(), params.volume);
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brownian_common::{BoundaryMode, ClaimPolicy};

    fn config(num_agents: u32, boundary: &str, policy: &str) -> SimulationConfig {
        let text = format!(
            r#"
            [universe]
            min = [0.0, 0.0, 0.0]
            max = [4.0, 4.0, 4.0]
            boundary = "{boundary}"

            [timing]
            total_ticks = 10

            [initial_conditions]
            num_agents = {num_agents}
            placement_seed = 42

            [motion]
            claim_policy = "{policy}"

            [output]
            base_filename = "test"
            save_positions = false
            save_stats = false
            save_positions_in_snapshot = true
            "#
        );
        SimulationConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn placement_registers_every_agent() {
        let sim = Simulation::new(config(50, "open", "check_then_claim")).unwrap();
        assert_eq!(sim.current_agent_count(), 50);
        assert_eq!(sim.tracker().len(), 50);
        assert!(sim
            .particles()
            .iter()
            .all(|p| p.position.within(Vec3::zero(), Vec3::splat(4.0))));
    }

    #[test]
    fn ticks_keep_registry_in_sync() {
        let mut sim = Simulation::new(config(64, "torus", "atomic_claim")).unwrap();
        assert_eq!(sim.params().boundary, BoundaryMode::Torus);
        assert_eq!(sim.params().claim_policy, ClaimPolicy::AtomicClaim);

        for _ in 0..10 {
            let stats = sim.step().unwrap();
            assert_eq!(stats.moved + stats.stalled, 64);
            assert_eq!(sim.tracker().len(), 64);
            for p in sim.particles() {
                assert!(sim.tracker().is_occupied(p.position));
            }
        }
        assert_eq!(sim.count_duplicate_positions(), 0);
        assert_eq!(sim.current_tick(), 10);
    }

    #[test]
    fn snapshot_reports_last_tick() {
        let mut sim = Simulation::new(config(8, "closed", "check_then_claim")).unwrap();
        sim.record_snapshot().unwrap();
        sim.step().unwrap();
        sim.record_snapshot().unwrap();

        let snapshots = sim.get_recorded_snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].tick, 0);
        assert_eq!(snapshots[1].tick, 1);
        assert_eq!(snapshots[1].moved_count + snapshots[1].stalled_count, 8);
        assert!(snapshots[1].mean_attempts >= 1.0);
        assert_eq!(snapshots[1].positions.as_ref().map(Vec::len), Some(8));
    }

    #[test]
    fn stalled_ticks_accumulate_and_reset() {
        let mut sim = Simulation::new(config(5, "open", "check_then_claim")).unwrap();
        let start = sim.get_results();

        // No attempts allowed: every particle stays put.
        sim.motion = BrownianMotion::new(0);
        for _ in 0..3 {
            let stats = sim.step().unwrap();
            assert_eq!(stats.stalled, 5);
        }
        assert_eq!(sim.get_results(), start);
        assert!(sim.particles().iter().all(|p| p.stalled_ticks == 3));
        sim.record_snapshot().unwrap();

        sim.motion = BrownianMotion::default();
        sim.step().unwrap();
        assert!(sim.particles().iter().all(|p| p.stalled_ticks == 0));
        sim.record_snapshot().unwrap();

        let snapshots = sim.get_recorded_snapshots();
        assert_eq!(snapshots[0].max_stalled_ticks, 3);
        assert_eq!(snapshots[0].stalled_count, 5);
        assert_eq!(snapshots[1].max_stalled_ticks, 0);
    }

    #[test]
    fn duplicates_are_counted_per_agent() {
        let mut sim = Simulation::new(config(3, "open", "check_then_claim")).unwrap();
        let shared = sim.particles[0].position;
        sim.particles[1].position = shared;
        assert_eq!(sim.count_duplicate_positions(), 2);
    }

    #[test]
    fn shutdown_releases_registry() {
        let sim = Simulation::new(config(10, "open", "check_then_claim")).unwrap();
        sim.shutdown();
        assert!(sim.tracker().is_empty());
    }
}
