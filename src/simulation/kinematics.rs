//! Longitudinal speed model shared by traffic and the player.

use super::config::SpeedConfig;

/// Converts MPH into world units per tick.
///
/// Built once when the engine starts and never recomputed per agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedScale {
    units_per_tick_per_mph: f32,
}

impl SpeedScale {
    pub fn new(units_per_second_per_mph: f32, tick_rate: u32) -> Self {
        Self {
            units_per_tick_per_mph: units_per_second_per_mph / tick_rate as f32,
        }
    }

    pub fn units_per_tick_per_mph(&self) -> f32 {
        self.units_per_tick_per_mph
    }

    pub fn to_units(&self, mph: f32) -> f32 {
        mph * self.units_per_tick_per_mph
    }

    pub fn to_mph(&self, units_per_tick: f32) -> f32 {
        units_per_tick / self.units_per_tick_per_mph
    }
}

/// Posted speed limit of a lane in MPH
pub fn speed_limit_mph(config: &SpeedConfig, lane: usize) -> f32 {
    config.base_limit_mph + lane as f32 * config.per_lane_step_mph
}

/// Speed traffic settles at in a lane, in MPH
pub fn steady_target_mph(config: &SpeedConfig, lane: usize) -> f32 {
    (speed_limit_mph(config, lane) - config.under_limit_mph).max(0.0)
}

/// How hard a vehicle is braking this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum BrakeLevel {
    #[default]
    None,
    /// Obstacle inside the lookahead but beyond one following distance
    Mild,
    /// Obstacle within one following distance
    Sharp,
    /// Obstacle within half a following distance
    Emergency,
}

impl BrakeLevel {
    /// Speed shed per tick at this level
    pub fn deceleration(&self, config: &SpeedConfig) -> f32 {
        match self {
            BrakeLevel::None | BrakeLevel::Mild => config.comfortable_decel,
            BrakeLevel::Sharp => config.sharp_decel,
            BrakeLevel::Emergency => config.emergency_decel,
        }
    }
}

/// Move `current` toward `target` by at most `acceleration` up or
/// `deceleration` down. Never returns a negative speed.
pub fn approach_speed(current: f32, target: f32, acceleration: f32, deceleration: f32) -> f32 {
    let next = if current < target {
        (current + acceleration).min(target)
    } else {
        (current - deceleration).max(target)
    };
    next.max(0.0)
}
