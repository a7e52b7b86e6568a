//! Density-aware creation of traffic around the player

use log::debug;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand::SeedableRng;

use super::agent::TrafficAgent;
use super::config::{SpawnerConfig, SpeedConfig};
use super::kinematics::{steady_target_mph, SpeedScale};
use super::player::PlayerSnapshot;
use super::road::{LaneGeometry, RoadSegment};
use super::types::{AgentId, Position, SimId, VehicleColor};

/// Which side of the player a candidate is proposed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnDirection {
    Ahead,
    Behind,
}

impl SpawnDirection {
    pub const BOTH: [SpawnDirection; 2] = [SpawnDirection::Ahead, SpawnDirection::Behind];
}

/// Why a spawn candidate was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnRejection {
    AtCapacity,
    LaneNotDrivable,
    /// Another agent in the lane is inside the lane's spacing
    TooClose,
    /// Too many agents around the candidate across all lanes
    Clustered,
    /// Already one agent ahead of the player in the player's lane
    PlayerLaneOccupied,
}

/// Inputs the spawner reads but does not own
pub struct SpawnContext<'a> {
    pub geometry: &'a dyn LaneGeometry,
    pub player: &'a PlayerSnapshot,
    pub speed: &'a SpeedConfig,
    pub scale: SpeedScale,
    pub now: u64,
}

impl SpawnContext<'_> {
    fn player_lane(&self) -> Option<usize> {
        self.geometry
            .segment_at(self.player.position.y)
            .lane_at_x(self.player.position.x)
    }
}

/// Result of one spawner pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnOutcome {
    pub spawned: Vec<AgentId>,
    pub rejected: usize,
}

pub struct Spawner {
    config: SpawnerConfig,
    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,
    /// Ticks until the next evaluation
    cooldown: u32,
    next_id: usize,
}

impl Spawner {
    pub fn new(config: SpawnerConfig, seed: Option<u64>) -> Self {
        Self {
            config,
            rng: seed.map(StdRng::seed_from_u64),
            cooldown: 0,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::Range<f32>) -> f32 {
        if range.is_empty() {
            return range.start;
        }
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    fn random_color(&mut self) -> VehicleColor {
        const COLORS: &[VehicleColor] = &VehicleColor::ALL;
        let color = match &mut self.rng {
            Some(rng) => COLORS.choose(rng),
            None => COLORS.choose(&mut rand::rng()),
        };
        color.copied().unwrap_or(VehicleColor::White)
    }

    fn next_interval(&mut self) -> u32 {
        let base = self.config.interval_ticks as f32;
        let jitter = self.config.interval_jitter as f32;
        let interval = self.random_range(base - jitter..base + jitter + 1.0);
        interval.max(1.0) as u32
    }

    /// Forget the evaluation cooldown, e.g. on a level reset
    pub fn reset(&mut self) {
        self.cooldown = 0;
    }

    /// Same-lane spacing required in `lane`; faster lanes need more room.
    pub fn min_spacing(&self, lane: usize) -> f32 {
        self.config.base_spacing + lane as f32 * self.config.per_lane_spacing
    }

    /// Build an agent cruising at its lane's steady speed.
    pub fn create_agent(
        &mut self,
        lane: usize,
        y: f32,
        speed: Option<f32>,
        segment: &RoadSegment,
        ctx: &SpawnContext,
    ) -> Option<TrafficAgent> {
        let x = segment.lane_center_x(lane)?;
        let speed = speed.unwrap_or_else(|| ctx.scale.to_units(steady_target_mph(ctx.speed, lane)));
        let id = AgentId(SimId(self.next_id));
        self.next_id += 1;
        let color = self.random_color();
        let mut agent = TrafficAgent::new(id, color, lane, Position::new(x, y), speed, ctx.now);
        agent.target_speed = ctx.scale.to_units(steady_target_mph(ctx.speed, lane));
        Some(agent)
    }

    /// Check a candidate against the density rules.
    pub fn check_candidate(
        &self,
        agents: &[TrafficAgent],
        lane: usize,
        y: f32,
        direction: SpawnDirection,
        ctx: &SpawnContext,
    ) -> Result<(), SpawnRejection> {
        if agents.len() >= self.config.max_agents {
            return Err(SpawnRejection::AtCapacity);
        }
        if lane == 0 || !ctx.geometry.segment_at(y).is_drivable(lane) {
            return Err(SpawnRejection::LaneNotDrivable);
        }

        let spacing = self.min_spacing(lane);
        if agents
            .iter()
            .any(|agent| agent.occupies(lane) && (agent.position.y - y).abs() < spacing)
        {
            return Err(SpawnRejection::TooClose);
        }

        let nearby = agents
            .iter()
            .filter(|agent| (agent.position.y - y).abs() < self.config.cluster_radius)
            .count();
        if nearby >= self.config.max_cluster {
            return Err(SpawnRejection::Clustered);
        }

        if direction == SpawnDirection::Ahead && ctx.player_lane() == Some(lane) {
            let player_y = ctx.player.position.y;
            if agents
                .iter()
                .any(|agent| agent.occupies(lane) && agent.position.y < player_y)
            {
                return Err(SpawnRejection::PlayerLaneOccupied);
            }
        }

        Ok(())
    }

    fn propose_y(&mut self, direction: SpawnDirection, player_y: f32) -> f32 {
        let offset = self.random_range(self.config.dead_zone..self.config.spawn_range);
        match direction {
            SpawnDirection::Ahead => player_y - offset,
            SpawnDirection::Behind => player_y + offset,
        }
    }

    /// Propose, check and create one agent.
    fn try_spawn(
        &mut self,
        agents: &mut Vec<TrafficAgent>,
        lane: usize,
        direction: SpawnDirection,
        ctx: &SpawnContext,
        outcome: &mut SpawnOutcome,
    ) {
        let y = self.propose_y(direction, ctx.player.position.y);
        if let Err(reason) = self.check_candidate(agents, lane, y, direction, ctx) {
            outcome.rejected += 1;
            debug!("Spawn in lane {} at y={:.0} rejected: {:?}", lane, y, reason);
            return;
        }
        let segment = ctx.geometry.segment_at(y);
        match self.create_agent(lane, y, None, segment, ctx) {
            Some(agent) => {
                debug!(
                    "Spawned {:?} in lane {} at y={:.0} ({:?})",
                    agent.id, lane, y, direction
                );
                outcome.spawned.push(agent.id);
                agents.push(agent);
            }
            None => outcome.rejected += 1,
        }
    }

    /// Run one tick of the spawner; evaluates only when the cooldown expires.
    pub fn update(&mut self, agents: &mut Vec<TrafficAgent>, ctx: &SpawnContext) -> SpawnOutcome {
        let mut outcome = SpawnOutcome::default();
        if !self.config.enabled {
            return outcome;
        }
        if self.cooldown > 0 {
            self.cooldown -= 1;
            return outcome;
        }
        self.cooldown = self.next_interval();

        let highest_lane = ctx.geometry.segment_at(ctx.player.position.y).highest_lane();
        for lane in 1..=highest_lane {
            for direction in SpawnDirection::BOTH {
                self.try_spawn(agents, lane, direction, ctx, &mut outcome);
            }
        }
        outcome
    }

    /// Populate a fresh level. Ignores the cooldown but not the density rules.
    pub fn spawn_initial(
        &mut self,
        agents: &mut Vec<TrafficAgent>,
        segment: &RoadSegment,
        ctx: &SpawnContext,
    ) -> SpawnOutcome {
        let mut outcome = SpawnOutcome::default();
        if !self.config.enabled {
            return outcome;
        }
        let lanes: Vec<usize> = segment.traffic_lanes().collect();
        for lane in lanes {
            for direction in SpawnDirection::BOTH {
                for _ in 0..self.config.initial_attempts {
                    self.try_spawn(agents, lane, direction, ctx, &mut outcome);
                }
            }
        }
        self.cooldown = self.next_interval();
        outcome
    }
}
