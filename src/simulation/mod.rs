//! Standalone highway traffic simulation module
//!
//! This module contains the traffic core: lane geometry, agent behavior,
//! the two-phase tick engine, the spawner and collision checks. It runs
//! headless and can be tested from the console.

mod agent;
mod collision;
mod config;
mod engine;
mod kinematics;
mod perception;
mod player;
mod road;
mod spawner;
mod stats;
mod types;
mod world;

// Re-export public types for external use
pub use agent::{LaneChange, LaneState, TrafficAgent};
pub use collision::{
    following_violations, player_struck_by, violates_following_distance, Footprint,
};
pub use config::{
    CollisionConfig, LaneChangeConfig, SpawnerConfig, SpeedConfig, TrafficConfig,
    DEFAULT_SANITY_BOUND, DEFAULT_TICK_RATE, DEFAULT_UNITS_PER_SECOND_PER_MPH,
};
pub use engine::{LaneChangeDenial, LaneChangeOutcome, TickReport, TrafficEngine, TrafficHandle};
pub use kinematics::{approach_speed, speed_limit_mph, steady_target_mph, BrakeLevel, SpeedScale};
#[allow(unused_imports)]
pub use perception::{
    decide, perceive, Decision, LaneChangeReason, LaneChangeRequest, Obstacle, Perception,
    PerceptionContext,
};
pub use player::{CarSpec, PlayerInput, PlayerSnapshot, PlayerVehicle};
pub use road::{Highway, LaneGeometry, LaneType, RoadSegment};
#[allow(unused_imports)]
pub use spawner::{SpawnContext, SpawnDirection, SpawnOutcome, SpawnRejection, Spawner};
pub use stats::TrafficStats;
pub use types::{AgentId, Position, SimId, VehicleColor, PLAYER_HOME_LANE, SPRITE_LENGTH, SPRITE_WIDTH};
pub use world::{SimWorld, AUTOPILOT_MPH};
