use crate::motion::Agent;
use crate::occupancy::OccupancyTracker;
use brownian_common::{clamp, wrap, BoundaryMode, Position, SimParams};
use log::debug;

/// Maps a position into the universe box according to `mode`.
#[inline(always)]
pub fn bounded_position(pos: Position, mode: BoundaryMode, params: &SimParams) -> Position {
    let (min, max) = (params.bounds_min, params.bounds_max);
    match mode {
        BoundaryMode::Open => pos,
        BoundaryMode::Closed => Position::new(
            clamp(pos.x, min.x, max.x),
            clamp(pos.y, min.y, max.y),
            clamp(pos.z, min.z, max.z),
        ),
        BoundaryMode::Torus => Position::new(
            wrap(pos.x, min.x, max.x),
            wrap(pos.y, min.y, max.y),
            wrap(pos.z, min.z, max.z),
        ),
    }
}

/// Applies the configured boundary to an agent that has just stepped.
///
/// The registry follows the agent: the bounded position is claimed and the
/// stepped one released. If the bounded position belongs to someone else the
/// agent keeps its stepped position until the next tick. Returns `true` when
/// the agent was moved.
pub fn enforce<A: Agent + ?Sized>(agent: &mut A, tracker: &OccupancyTracker, params: &SimParams) -> bool {
    let stepped = agent.position();
    let bounded = bounded_position(stepped, params.boundary, params);
    if bounded == stepped {
        return false;
    }
    if !tracker.try_claim(bounded) {
        debug!("Boundary target {:?} already occupied, keeping {:?} this tick.", bounded, stepped);
        return false;
    }
    tracker.free(stepped);
    agent.set_position(bounded);
    true
}
