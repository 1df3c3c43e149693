//! Bounded-retry random displacement.
//!
//! One call to [`BrownianMotion::step`] moves one agent: it releases the
//! agent's current position, samples up to `max_attempts` candidate positions
//! in a cube around it and keeps the first one nobody occupies. When every
//! candidate is taken the agent stays where it was.
//!
//! Steps for different agents may run on different threads at the same time.
//! With [`ClaimPolicy::CheckThenClaim`] the free-check and the final claim are
//! separate registry operations, so two agents racing for the same candidate
//! can both accept it. [`ClaimPolicy::AtomicClaim`] closes that gap.

use crate::occupancy::OccupancyTracker;
use brownian_common::{ClaimPolicy, Position, SimParams, Vec3};
use log::{trace, warn};
use rand::rngs::{StdRng, ThreadRng};
use rand::Rng;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;
pub const DEFAULT_HALF_WIDTH: f64 = 0.5;

/// Anything with an authoritative position the motion step can read and write.
pub trait Agent {
    fn position(&self) -> Position;
    fn set_position(&mut self, position: Position);
}

/// Source of uniformly distributed reals.
pub trait RandomSource {
    /// Sample from the closed interval `[low, high]`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

impl RandomSource for StdRng {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.random_range(low..=high)
    }
}

impl RandomSource for ThreadRng {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        self.random_range(low..=high)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        (**self).uniform(low, high)
    }
}

/// Result of one motion step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// A free candidate was accepted.
    Moved { to: Position, attempts: u32 },
    /// The attempt budget ran out and the agent kept its position.
    /// `contended` is set when another agent claimed that position while it was released;
    /// only [`ClaimPolicy::AtomicClaim`] can detect this.
    Stalled { attempts: u32, contended: bool },
}

impl StepOutcome {
    /// Number of candidates sampled.
    pub fn attempts(&self) -> u32 {
        match *self {
            StepOutcome::Moved { attempts, .. } | StepOutcome::Stalled { attempts, .. } => attempts,
        }
    }

    pub fn moved(&self) -> bool {
        matches!(self, StepOutcome::Moved { .. })
    }

    pub fn contended(&self) -> bool {
        matches!(self, StepOutcome::Stalled { contended: true, .. })
    }
}

/// Random-walk behavior with exclusive occupancy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrownianMotion {
    max_attempts: u32,
    half_width: f64,
    claim_policy: ClaimPolicy,
}

impl Default for BrownianMotion {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl BrownianMotion {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            half_width: DEFAULT_HALF_WIDTH,
            claim_policy: ClaimPolicy::CheckThenClaim,
        }
    }

    pub fn from_params(params: &SimParams) -> Self {
        Self::new(params.max_attempts)
            .with_half_width(params.half_width)
            .with_claim_policy(params.claim_policy)
    }

    pub fn with_half_width(mut self, half_width: f64) -> Self {
        self.half_width = half_width;
        self
    }

    pub fn with_claim_policy(mut self, claim_policy: ClaimPolicy) -> Self {
        self.claim_policy = claim_policy;
        self
    }

    fn sample_displacement<R: RandomSource + ?Sized>(&self, rng: &mut R) -> Vec3 {
        let h = self.half_width;
        let x = rng.uniform(-h, h);
        let y = rng.uniform(-h, h);
        let z = rng.uniform(-h, h);
        Vec3::new(x, y, z)
    }

    /// Moves `agent` by one random displacement and records the result in `tracker`.
    ///
    /// The old position is released before sampling so the agent never blocks
    /// itself. On exhaustion the agent is put back on its old position, which
    /// is occupied again without checking whether someone else took it in the
    /// meantime (`CheckThenClaim`), or with a claim that reports the conflict
    /// (`AtomicClaim`).
    pub fn step<A, R>(&self, agent: &mut A, rng: &mut R, tracker: &OccupancyTracker) -> StepOutcome
    where
        A: Agent + ?Sized,
        R: RandomSource + ?Sized,
    {
        let origin = agent.position();
        tracker.free(origin);

        let mut attempts = 0;
        let mut accepted = None;
        while attempts < self.max_attempts {
            attempts += 1;
            let candidate = origin.add(self.sample_displacement(rng));
            let free = match self.claim_policy {
                ClaimPolicy::CheckThenClaim => !tracker.is_occupied(candidate),
                ClaimPolicy::AtomicClaim => tracker.try_claim(candidate),
            };
            if free {
                accepted = Some(candidate);
                break;
            }
        }

        let outcome = match accepted {
            Some(to) => StepOutcome::Moved { to, attempts },
            None => {
                let contended = match self.claim_policy {
                    ClaimPolicy::CheckThenClaim => false,
                    ClaimPolicy::AtomicClaim => !tracker.try_claim(origin),
                };
                if contended {
                    warn!(
                        "Position ({}, {}, {}) was claimed by another agent while released; staying anyway.",
                        origin.x, origin.y, origin.z
                    );
                }
                StepOutcome::Stalled { attempts, contended }
            }
        };

        let new_position = match outcome {
            StepOutcome::Moved { to, .. } => to,
            StepOutcome::Stalled { .. } => origin,
        };
        agent.set_position(new_position);
        if self.claim_policy == ClaimPolicy::CheckThenClaim {
            tracker.occupy(new_position);
        }

        trace!("Step from {:?} -> {:?} after {} attempts", origin, new_position, attempts);
        outcome
    }
}

/// One step against the process-wide tracker.
pub fn step_global<A, R>(agent: &mut A, rng: &mut R, max_attempts: u32) -> StepOutcome
where
    A: Agent + ?Sized,
    R: RandomSource + ?Sized,
{
    BrownianMotion::new(max_attempts).step(agent, rng, OccupancyTracker::global())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct Dot(Position);

    impl Agent for Dot {
        fn position(&self) -> Position {
            self.0
        }

        fn set_position(&mut self, position: Position) {
            self.0 = position;
        }
    }

    /// Replays a fixed list of samples, cycling when exhausted.
    struct Scripted {
        values: Vec<f64>,
        calls: usize,
    }

    impl RandomSource for Scripted {
        fn uniform(&mut self, _low: f64, _high: f64) -> f64 {
            let v = self.values[self.calls % self.values.len()];
            self.calls += 1;
            v
        }
    }

    /// Another agent lands on `origin` while the stepping agent samples.
    /// Every sample is `high`, so candidates are always `origin + high`.
    struct Intruder<'a> {
        tracker: &'a OccupancyTracker,
        origin: Position,
    }

    impl RandomSource for Intruder<'_> {
        fn uniform(&mut self, _low: f64, high: f64) -> f64 {
            self.tracker.occupy(self.origin);
            high
        }
    }

    #[test]
    fn empty_registry_moves_within_cube() {
        let tracker = OccupancyTracker::new();
        let mut rng = StdRng::seed_from_u64(11);
        let mut dot = Dot(Vec3::zero());
        tracker.occupy(dot.0);

        let outcome = BrownianMotion::default().step(&mut dot, &mut rng, &tracker);

        assert_eq!(outcome.attempts(), 1);
        assert!(dot.0.within(Vec3::splat(-0.5), Vec3::splat(0.5)));
        assert_eq!(tracker.occupied_positions(), vec![dot.0]);
    }

    #[test]
    fn stalls_after_exact_budget() {
        let tracker = OccupancyTracker::new();
        let origin = Vec3::splat(2.0);
        tracker.occupy(origin.add(Vec3::splat(0.25)));
        let mut rng = Scripted { values: vec![0.25], calls: 0 };
        let mut dot = Dot(origin);

        let outcome = BrownianMotion::new(7).step(&mut dot, &mut rng, &tracker);

        assert_eq!(outcome, StepOutcome::Stalled { attempts: 7, contended: false });
        assert_eq!(rng.calls, 21);
        assert_eq!(dot.0, origin);
        assert!(tracker.is_occupied(origin));
    }

    #[test]
    fn last_attempt_can_still_succeed() {
        let tracker = OccupancyTracker::new();
        let origin = Vec3::zero();
        tracker.occupy(Vec3::splat(0.1));
        let mut rng = Scripted {
            values: vec![0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.2, 0.2, 0.2],
            calls: 0,
        };
        let mut dot = Dot(origin);

        let outcome = BrownianMotion::new(3).step(&mut dot, &mut rng, &tracker);

        assert_eq!(outcome, StepOutcome::Moved { to: Vec3::splat(0.2), attempts: 3 });
    }

    #[test]
    fn zero_budget_samples_nothing() {
        let tracker = OccupancyTracker::new();
        let mut rng = Scripted { values: vec![0.0], calls: 0 };
        let mut dot = Dot(Vec3::splat(1.0));

        let outcome = BrownianMotion::new(0).step(&mut dot, &mut rng, &tracker);

        assert_eq!(outcome.attempts(), 0);
        assert_eq!(rng.calls, 0);
        assert!(tracker.is_occupied(Vec3::splat(1.0)));
    }

    #[test]
    fn atomic_claim_reports_taken_origin() {
        let tracker = OccupancyTracker::new();
        let origin = Vec3::zero();
        let blocked = Vec3::splat(0.5);
        tracker.occupy(blocked);

        let mut dot = Dot(origin);
        let mut rng = Intruder { tracker: &tracker, origin };
        let outcome = BrownianMotion::new(4)
            .with_claim_policy(ClaimPolicy::AtomicClaim)
            .step(&mut dot, &mut rng, &tracker);

        assert_eq!(outcome, StepOutcome::Stalled { attempts: 4, contended: true });
        assert_eq!(dot.0, origin);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn check_then_claim_reoccupies_taken_origin_unchecked() {
        let tracker = OccupancyTracker::new();
        let origin = Vec3::zero();
        tracker.occupy(Vec3::splat(0.5));

        let mut dot = Dot(origin);
        let mut rng = Intruder { tracker: &tracker, origin };
        let outcome = BrownianMotion::new(4).step(&mut dot, &mut rng, &tracker);

        assert_eq!(outcome, StepOutcome::Stalled { attempts: 4, contended: false });
        assert!(!outcome.contended());
        assert_eq!(dot.0, origin);
        // The intruder and this agent now share one registry entry.
        assert!(tracker.is_occupied(origin));
        assert_eq!(tracker.len(), 2);
        let origin_entries = tracker
            .occupied_positions()
            .into_iter()
            .filter(|&p| p == origin)
            .count();
        assert_eq!(origin_entries, 1);
    }

    #[test]
    fn thread_rng_drives_a_step() {
        let tracker = OccupancyTracker::new();
        let mut rng = rand::rng();
        let mut dot = Dot(Vec3::splat(-1.0));

        let outcome = BrownianMotion::default().step(&mut dot, &mut rng, &tracker);

        assert!(outcome.moved());
        assert!(dot.0.within(Vec3::splat(-1.5), Vec3::splat(-0.5)));
    }

    #[test]
    fn half_width_scales_samples() {
        let tracker = OccupancyTracker::new();
        let mut rng = StdRng::seed_from_u64(3);
        let motion = BrownianMotion::default().with_half_width(0.01);
        let mut dot = Dot(Vec3::zero());
        for _ in 0..50 {
            let before = dot.0;
            motion.step(&mut dot, &mut rng, &tracker);
            let d = dot.0.sub(before);
            let limit = 0.01 + 1e-12;
            assert!(d.x.abs() <= limit && d.y.abs() <= limit && d.z.abs() <= limit);
        }
        assert_eq!(tracker.len(), 1);
    }
}
