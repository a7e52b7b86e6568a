//! Traffic agents and their lane state machine
//!
//! An agent is either cruising in its lane or part way through a single
//! lane change. While changing, its `x` is owned by the lane change lerp.

use super::types::{AgentId, Position, VehicleColor};

/// An in-progress move from `lane` to `target_lane`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneChange {
    pub target_lane: usize,
    /// In (0, 1]; reaching 1 commits the change
    pub progress: f32,
    /// Centre of the lane being left, fixed when the change started
    pub from_x: f32,
    /// Centre of the destination lane, fixed when the change started
    pub to_x: f32,
}

impl LaneChange {
    /// Lateral position for the current progress
    pub fn x(&self) -> f32 {
        self.from_x + (self.to_x - self.from_x) * self.progress
    }
}

/// Lane state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LaneState {
    #[default]
    Cruising,
    ChangingLane(LaneChange),
}

/// An autonomous traffic vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficAgent {
    pub id: AgentId,
    pub color: VehicleColor,
    pub position: Position,
    /// Forward speed in world units per tick; `y` drops by this each tick
    pub speed: f32,
    /// Speed the agent is converging toward
    pub target_speed: f32,
    /// Current lane, always >= 1
    pub lane: usize,
    pub lane_state: LaneState,
    /// Tick of the last committed lane change (or of the spawn)
    pub last_lane_change_at: u64,
    /// Set once the player has driven past
    pub passed_by_player: bool,
    /// Consecutive ticks stopped behind an obstacle
    pub stalled_ticks: u32,
    /// Consecutive ticks held up by a slower leader
    pub stuck_behind_ticks: u32,
}

impl TrafficAgent {
    pub fn new(
        id: AgentId,
        color: VehicleColor,
        lane: usize,
        position: Position,
        speed: f32,
        spawned_at: u64,
    ) -> Self {
        Self {
            id,
            color,
            position,
            speed,
            target_speed: speed,
            lane,
            lane_state: LaneState::Cruising,
            last_lane_change_at: spawned_at,
            passed_by_player: false,
            stalled_ticks: 0,
            stuck_behind_ticks: 0,
        }
    }

    pub fn is_changing_lane(&self) -> bool {
        matches!(self.lane_state, LaneState::ChangingLane(_))
    }

    /// Destination lane, or the current lane while cruising
    pub fn target_lane(&self) -> usize {
        match self.lane_state {
            LaneState::Cruising => self.lane,
            LaneState::ChangingLane(change) => change.target_lane,
        }
    }

    /// 0 while cruising
    pub fn lane_change_progress(&self) -> f32 {
        match self.lane_state {
            LaneState::Cruising => 0.0,
            LaneState::ChangingLane(change) => change.progress,
        }
    }

    /// Whether the agent takes up room in `lane`. A changing agent
    /// occupies both its origin and its destination.
    pub fn occupies(&self, lane: usize) -> bool {
        self.lane == lane || self.target_lane() == lane
    }

    /// Whether two agents have a lane in common
    pub fn shares_lane_with(&self, other: &TrafficAgent) -> bool {
        other.occupies(self.lane) || other.occupies(self.target_lane())
    }

    /// Lane the agent mostly sits in: the destination once past halfway.
    pub fn effective_lane(&self) -> usize {
        match self.lane_state {
            LaneState::ChangingLane(change) if change.progress > 0.5 => change.target_lane,
            _ => self.lane,
        }
    }

    /// Whether the lane change cooldown has run out at `now`
    pub fn cooldown_elapsed(&self, now: u64, cooldown_ticks: u64) -> bool {
        now.saturating_sub(self.last_lane_change_at) >= cooldown_ticks
    }

    /// Enter `ChangingLane` with the first `step` of progress already
    /// applied. Only valid while cruising.
    pub(crate) fn begin_lane_change(&mut self, target_lane: usize, to_x: f32, step: f32) -> bool {
        if self.is_changing_lane() || target_lane == self.lane || !(step > 0.0) {
            return false;
        }
        let change = LaneChange {
            target_lane,
            progress: step.min(1.0),
            from_x: self.position.x,
            to_x,
        };
        self.position.x = change.x();
        self.lane_state = LaneState::ChangingLane(change);
        true
    }

    /// Advance an in-progress lane change by `step` and place `x` on the
    /// lerp. Returns `true` when the change committed this call.
    pub(crate) fn advance_lane_change(&mut self, step: f32, now: u64) -> bool {
        let LaneState::ChangingLane(mut change) = self.lane_state else {
            return false;
        };
        change.progress = (change.progress + step).min(1.0);
        self.position.x = change.x();
        if change.progress >= 1.0 {
            self.lane = change.target_lane;
            self.lane_state = LaneState::Cruising;
            self.last_lane_change_at = now;
            self.stuck_behind_ticks = 0;
            true
        } else {
            self.lane_state = LaneState::ChangingLane(change);
            false
        }
    }
}
