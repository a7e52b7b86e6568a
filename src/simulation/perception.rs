//! Perception and decision: the first phase of an engine tick.
//!
//! Everything here reads the agent list as it stood at the start of the
//! tick and never writes to it. The resolution phase applies the
//! resulting [`Decision`]s.

use super::agent::TrafficAgent;
use super::config::TrafficConfig;
use super::kinematics::{steady_target_mph, BrakeLevel, SpeedScale};
use super::player::PlayerSnapshot;
use super::road::LaneGeometry;

/// Nearest vehicle found in a lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    /// Longitudinal centre-to-centre distance, never negative
    pub distance: f32,
    /// Forward speed in units/tick
    pub speed: f32,
    pub is_player: bool,
}

/// What one agent can see this tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Perception {
    pub ahead: Option<Obstacle>,
    pub behind: Option<Obstacle>,
    /// Lane `lane - 1` unusable under the normal safety margin
    pub slower_blocked: bool,
    pub faster_blocked: bool,
    /// Same, using only the hard following distance
    pub slower_hard_blocked: bool,
    pub faster_hard_blocked: bool,
    /// Nothing inside the lookahead in the slower lane
    pub slower_clear_ahead: bool,
    /// Current lane stops being drivable within the lookahead
    pub lane_ending: bool,
}

/// Why an agent wants to change lanes, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LaneChangeReason {
    /// Boxed in and stopped for too long
    Unstick,
    /// Lane ends ahead
    LaneEnding,
    /// Something closing fast from behind
    Escape,
    /// Stuck behind a slower car
    Overtake,
    /// Drift back toward the slowest lane
    KeepSlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneChangeRequest {
    pub target_lane: usize,
    pub reason: LaneChangeReason,
}

impl LaneChangeRequest {
    /// Whether the destination check may drop to the hard following distance
    pub fn is_relaxed(&self) -> bool {
        self.reason == LaneChangeReason::Unstick
    }
}

/// Outcome of the decision phase for one agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub target_speed: f32,
    pub brake: BrakeLevel,
    pub lane_change: Option<LaneChangeRequest>,
    /// An obstacle sits within one following distance
    pub blocked_ahead: bool,
    /// A leader within the lookahead is slower than we want to go
    pub held_up: bool,
}

/// Shared inputs for one tick of perception
pub struct PerceptionContext<'a> {
    pub config: &'a TrafficConfig,
    pub scale: SpeedScale,
    pub geometry: &'a dyn LaneGeometry,
    pub player: &'a PlayerSnapshot,
    pub player_lane: Option<usize>,
    pub now: u64,
}

impl PerceptionContext<'_> {
    fn lane_change_ticks(&self) -> f32 {
        (1.0 / self.config.lane_change.progress_step).ceil()
    }

    /// Steady-state target for a lane in units/tick
    pub fn lane_target_speed(&self, lane: usize) -> f32 {
        self.scale
            .to_units(steady_target_mph(&self.config.speed, lane))
    }
}

/// Longitudinal clearance a vehicle behind needs, given how fast it closes.
fn behind_margin(margin: f32, own_speed: f32, other_speed: f32, change_ticks: f32) -> f32 {
    margin + (other_speed - own_speed).max(0.0) * change_ticks
}

fn closer(current: Option<Obstacle>, candidate: Obstacle) -> Option<Obstacle> {
    match current {
        Some(existing) if existing.distance <= candidate.distance => Some(existing),
        _ => Some(candidate),
    }
}

/// Whether `lane` is unusable for `agent` with the given clearance.
fn lane_blocked(
    index: usize,
    agents: &[TrafficAgent],
    lane: usize,
    margin: f32,
    ctx: &PerceptionContext,
) -> bool {
    let agent = &agents[index];
    if lane == 0 || !ctx.geometry.segment_at(agent.position.y).is_drivable(lane) {
        return true;
    }
    let change_ticks = ctx.lane_change_ticks();
    let too_close = |y: f32, speed: f32| {
        let dy = agent.position.y - y;
        if dy >= 0.0 {
            dy < margin
        } else {
            -dy < behind_margin(margin, agent.speed, speed, change_ticks)
        }
    };

    if ctx.player_lane == Some(lane) && too_close(ctx.player.position.y, ctx.player.speed) {
        return true;
    }
    agents
        .iter()
        .enumerate()
        .filter(|(j, other)| *j != index && other.occupies(lane))
        .any(|(_, other)| too_close(other.position.y, other.speed))
}

/// Scan the start-of-tick state for what `agents[index]` can see.
pub fn perceive(index: usize, agents: &[TrafficAgent], ctx: &PerceptionContext) -> Perception {
    let agent = &agents[index];
    let mut perception = Perception::default();
    let lookahead = ctx.config.speed.lookahead_distance;

    let mut consider = |y: f32, speed: f32, is_player: bool| {
        let dy = agent.position.y - y;
        if dy >= 0.0 {
            perception.ahead = closer(
                perception.ahead,
                Obstacle {
                    distance: dy,
                    speed,
                    is_player,
                },
            );
        } else {
            perception.behind = closer(
                perception.behind,
                Obstacle {
                    distance: -dy,
                    speed,
                    is_player,
                },
            );
        }
    };

    for (j, other) in agents.iter().enumerate() {
        if j == index || !other.position.is_finite() || !agent.shares_lane_with(other) {
            continue;
        }
        consider(other.position.y, other.speed, false);
    }
    if let Some(player_lane) = ctx.player_lane {
        if agent.occupies(player_lane) {
            consider(ctx.player.position.y, ctx.player.speed, true);
        }
    }

    let block_margin = ctx.config.lane_change.block_margin;
    let hard_margin = ctx.config.speed.min_following_distance;
    let slower = agent.lane.checked_sub(1);
    let faster = agent.lane + 1;

    match slower {
        Some(lane) => {
            perception.slower_blocked = lane_blocked(index, agents, lane, block_margin, ctx);
            perception.slower_hard_blocked = lane_blocked(index, agents, lane, hard_margin, ctx);
            perception.slower_clear_ahead = !perception.slower_blocked
                && !agents.iter().enumerate().any(|(j, other)| {
                    let dy = agent.position.y - other.position.y;
                    j != index && other.occupies(lane) && dy >= 0.0 && dy < lookahead
                });
        }
        None => {
            perception.slower_blocked = true;
            perception.slower_hard_blocked = true;
        }
    }
    perception.faster_blocked = lane_blocked(index, agents, faster, block_margin, ctx);
    perception.faster_hard_blocked = lane_blocked(index, agents, faster, hard_margin, ctx);

    perception.lane_ending = !agent.is_changing_lane()
        && !ctx
            .geometry
            .segment_at(agent.position.y - lookahead)
            .is_drivable(agent.lane);

    perception
}

/// Turn a perception into a target speed and at most one lane change.
pub fn decide(agent: &TrafficAgent, perception: &Perception, ctx: &PerceptionContext) -> Decision {
    let speed_config = &ctx.config.speed;
    let lane_config = &ctx.config.lane_change;
    let lane_target = ctx.lane_target_speed(agent.effective_lane());

    // Graduated braking
    let mut target_speed = lane_target;
    let mut brake = BrakeLevel::None;
    if let Some(ahead) = perception.ahead {
        let following = speed_config.following_distance;
        if ahead.distance <= following * 0.5 {
            brake = BrakeLevel::Emergency;
            target_speed = target_speed.min(ahead.speed * 0.5);
        } else if ahead.distance <= following {
            brake = BrakeLevel::Sharp;
            target_speed = target_speed.min(ahead.speed * 0.9);
        } else if ahead.distance <= speed_config.lookahead_distance {
            brake = BrakeLevel::Mild;
            target_speed = target_speed.min(ahead.speed);
        }
    }

    let blocked_ahead = perception
        .ahead
        .is_some_and(|ahead| ahead.distance <= speed_config.following_distance);
    let held_up = perception.ahead.is_some_and(|ahead| {
        ahead.distance <= speed_config.lookahead_distance
            && ahead.speed < lane_target - lane_config.overtake_speed_margin
    });

    let lane_change = if agent.is_changing_lane() {
        None
    } else {
        choose_lane_change(agent, perception, ctx, held_up)
    };

    Decision {
        target_speed,
        brake,
        lane_change,
        blocked_ahead,
        held_up,
    }
}

fn choose_lane_change(
    agent: &TrafficAgent,
    perception: &Perception,
    ctx: &PerceptionContext,
    held_up: bool,
) -> Option<LaneChangeRequest> {
    let lane_config = &ctx.config.lane_change;
    let slower = agent.lane.checked_sub(1).filter(|lane| *lane >= 1);
    let faster = agent.lane + 1;
    let request = |target_lane, reason| Some(LaneChangeRequest { target_lane, reason });

    // Anti-deadlock: boxed in for too long, fall back to the hard distance
    // and ignore the cooldown.
    if agent.stalled_ticks >= lane_config.stall_ticks
        && perception.slower_blocked
        && perception.faster_blocked
    {
        if let Some(lane) = slower.filter(|_| !perception.slower_hard_blocked) {
            return request(lane, LaneChangeReason::Unstick);
        }
        if !perception.faster_hard_blocked {
            return request(faster, LaneChangeReason::Unstick);
        }
        return None;
    }

    let slower_open = slower.filter(|_| !perception.slower_blocked);
    let faster_open = (!perception.faster_blocked).then_some(faster);

    // A merge off an ending lane cannot wait for the cooldown either.
    if perception.lane_ending {
        if let Some(lane) = slower_open.or(faster_open) {
            return request(lane, LaneChangeReason::LaneEnding);
        }
    }

    if !agent.cooldown_elapsed(ctx.now, lane_config.cooldown_ticks) {
        return None;
    }

    let closing_fast = perception.behind.is_some_and(|behind| {
        behind.distance <= lane_config.escape_distance
            && behind.speed - agent.speed > lane_config.escape_closing_speed
    });
    if closing_fast {
        if let Some(lane) = slower_open.or(faster_open) {
            return request(lane, LaneChangeReason::Escape);
        }
    }

    if held_up && agent.stuck_behind_ticks >= lane_config.overtake_patience_ticks {
        if let Some(lane) = faster_open.or(slower_open) {
            return request(lane, LaneChangeReason::Overtake);
        }
    }

    if !held_up && perception.slower_clear_ahead {
        if let Some(lane) = slower_open {
            return request(lane, LaneChangeReason::KeepSlow);
        }
    }

    None
}
