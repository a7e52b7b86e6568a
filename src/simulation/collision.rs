//! Collision checks
//!
//! Two separate tests live here. The player test is a box overlap with a
//! footprint smaller than the sprite. The agent test is a longitudinal
//! following-distance check used by the engine's resolution phase. The two
//! use different thresholds and must not be merged.

use super::agent::TrafficAgent;
use super::config::CollisionConfig;
use super::types::{AgentId, Position};

/// Axis-aligned collision box centred on a vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub half_width: f32,
    pub half_length: f32,
}

impl Footprint {
    pub fn from_config(config: &CollisionConfig) -> Self {
        Self {
            half_width: config.half_width,
            half_length: config.half_length,
        }
    }

    /// Whether boxes of this footprint centred at `a` and `b` overlap
    pub fn overlaps(&self, a: &Position, b: &Position) -> bool {
        (a.x - b.x).abs() < 2.0 * self.half_width && (a.y - b.y).abs() < 2.0 * self.half_length
    }
}

/// First agent whose footprint overlaps the player's, if any.
pub fn player_struck_by<'a>(
    player: &Position,
    agents: &'a [TrafficAgent],
    footprint: &Footprint,
) -> Option<&'a TrafficAgent> {
    agents
        .iter()
        .find(|agent| footprint.overlaps(player, &agent.position))
}

/// Whether a follower at `follower_y` would sit closer than
/// `min_gap` behind a leader at `leader_y`.
pub fn violates_following_distance(follower_y: f32, leader_y: f32, min_gap: f32) -> bool {
    follower_y - leader_y < min_gap
}

/// Pairs of agents sharing a lane that are closer than `min_gap`.
///
/// Diagnostic scan over a consistent snapshot; the engine itself checks
/// pairs incrementally while resolving moves.
pub fn following_violations(agents: &[TrafficAgent], min_gap: f32) -> Vec<(AgentId, AgentId)> {
    let mut violations = Vec::new();
    for (i, a) in agents.iter().enumerate() {
        for b in &agents[i + 1..] {
            if a.is_changing_lane() || b.is_changing_lane() || a.lane != b.lane {
                continue;
            }
            let (leader, follower) = if a.position.y <= b.position.y {
                (a, b)
            } else {
                (b, a)
            };
            if violates_following_distance(follower.position.y, leader.position.y, min_gap) {
                violations.push((leader.id, follower.id));
            }
        }
    }
    violations
}
