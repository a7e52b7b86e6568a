//! The traffic engine: single owner of the agent list.
//!
//! Each tick takes the write lock once and runs two phases over the whole
//! list. Perception reads the start-of-tick state only; resolution walks
//! the agents front to back and checks every move against positions that
//! have already been updated this tick. Readers such as renderers or
//! overlays go through a [`TrafficHandle`] and only ever see a complete
//! tick.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use ordered_float::OrderedFloat;

use super::agent::TrafficAgent;
use super::collision::{player_struck_by, violates_following_distance, Footprint};
use super::config::TrafficConfig;
use super::kinematics::{approach_speed, steady_target_mph, SpeedScale};
use super::perception::{decide, perceive, Decision, LaneChangeReason, PerceptionContext};
use super::player::PlayerSnapshot;
use super::road::{LaneGeometry, RoadSegment};
use super::spawner::{SpawnContext, Spawner};
use super::stats::TrafficStats;
use super::types::AgentId;

type SharedAgents = Arc<RwLock<Vec<TrafficAgent>>>;

fn read_lock(agents: &RwLock<Vec<TrafficAgent>>) -> RwLockReadGuard<'_, Vec<TrafficAgent>> {
    agents.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock(agents: &RwLock<Vec<TrafficAgent>>) -> RwLockWriteGuard<'_, Vec<TrafficAgent>> {
    agents.write().unwrap_or_else(PoisonError::into_inner)
}

/// Why a lane change request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneChangeDenial {
    Cooldown,
    AlreadyChanging,
    /// Lane 0, not adjacent, or not drivable here
    InvalidLane,
    Blocked,
    UnknownAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneChangeOutcome {
    Started,
    Denied(LaneChangeDenial),
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub player_struck: bool,
    /// Agent that hit the player, if any
    pub struck_by: Option<AgentId>,
    pub spawned: usize,
    pub despawned: usize,
    pub lane_changes_started: usize,
    pub lane_changes_completed: usize,
    /// Agents the player overtook this tick
    pub passed_by_player: usize,
    pub perception_skipped: usize,
}

/// Cheap, cloneable read access to the agent list for other threads.
#[derive(Clone)]
pub struct TrafficHandle {
    agents: SharedAgents,
}

impl TrafficHandle {
    /// Hold the read lock for a whole traversal.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<TrafficAgent>> {
        read_lock(&self.agents)
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Copy of the agent list as of the last completed tick.
    pub fn snapshot(&self) -> Vec<TrafficAgent> {
        self.read().clone()
    }

    /// Agents per lane; a changing agent counts toward its origin lane.
    pub fn lane_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for agent in self.read().iter() {
            *counts.entry(agent.lane).or_insert(0) += 1;
        }
        counts
    }
}

pub struct TrafficEngine {
    config: TrafficConfig,
    scale: SpeedScale,
    footprint: Footprint,
    geometry: Arc<dyn LaneGeometry>,
    agents: SharedAgents,
    spawner: Spawner,
    tick: u64,
    stats: TrafficStats,
}

impl TrafficEngine {
    pub fn new(
        config: TrafficConfig,
        geometry: Arc<dyn LaneGeometry>,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate().context("Invalid traffic configuration")?;
        let scale = SpeedScale::new(config.units_per_second_per_mph, config.tick_rate);
        let footprint = Footprint::from_config(&config.collision);
        let spawner = Spawner::new(config.spawner.clone(), seed);
        info!(
            "Traffic engine ready: {} Hz, {:.3} units/tick per MPH, seed {:?}",
            config.tick_rate,
            scale.units_per_tick_per_mph(),
            seed
        );
        Ok(Self {
            config,
            scale,
            footprint,
            geometry,
            agents: Arc::new(RwLock::new(Vec::new())),
            spawner,
            tick: 0,
            stats: TrafficStats::default(),
        })
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    pub fn scale(&self) -> SpeedScale {
        self.scale
    }

    pub fn footprint(&self) -> Footprint {
        self.footprint
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn stats(&self) -> &TrafficStats {
        &self.stats
    }

    pub fn geometry(&self) -> &dyn LaneGeometry {
        self.geometry.as_ref()
    }

    /// Read-only view of every agent.
    pub fn agents(&self) -> RwLockReadGuard<'_, Vec<TrafficAgent>> {
        read_lock(&self.agents)
    }

    pub fn handle(&self) -> TrafficHandle {
        TrafficHandle {
            agents: Arc::clone(&self.agents),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.agents().len()
    }

    pub fn get_agent(&self, id: AgentId) -> Option<TrafficAgent> {
        self.agents().iter().find(|agent| agent.id == id).cloned()
    }

    /// Steady-state speed of a lane in units/tick
    pub fn lane_target_speed(&self, lane: usize) -> f32 {
        self.scale.to_units(steady_target_mph(&self.config.speed, lane))
    }

    /// Place an agent cruising at its lane's steady speed.
    pub fn add_agent(&mut self, lane: usize, y: f32) -> Result<AgentId> {
        let speed = self.lane_target_speed(lane);
        self.add_agent_with_speed(lane, y, speed)
    }

    /// Place an agent directly, bypassing the spawner's density rules.
    pub fn add_agent_with_speed(&mut self, lane: usize, y: f32, speed: f32) -> Result<AgentId> {
        if lane == 0 {
            return Err(anyhow!("Lane 0 is reserved for the player"));
        }
        if !y.is_finite() || !speed.is_finite() {
            return Err(anyhow!("Agent needs finite y and speed, got y={} speed={}", y, speed));
        }
        if speed < 0.0 {
            return Err(anyhow!("Agent speed cannot be negative, got {}", speed));
        }
        let segment = self.geometry.segment_at(y);
        if !segment.is_drivable(lane) {
            return Err(anyhow!("Lane {} is not drivable at y={}", lane, y));
        }

        let player = PlayerSnapshot::default();
        let ctx = SpawnContext {
            geometry: self.geometry.as_ref(),
            player: &player,
            speed: &self.config.speed,
            scale: self.scale,
            now: self.tick,
        };
        let agent = self
            .spawner
            .create_agent(lane, y, Some(speed), segment, &ctx)
            .with_context(|| format!("Could not place agent in lane {}", lane))?;
        let id = agent.id;
        write_lock(&self.agents).push(agent);
        self.stats.agents_spawned += 1;
        debug!("Added {:?} in lane {} at y={:.0}", id, lane, y);
        Ok(id)
    }

    /// Populate a fresh level around the player. Returns how many agents
    /// were created.
    pub fn spawn_initial(&mut self, segment: &RoadSegment, player: &PlayerSnapshot) -> usize {
        let lock = Arc::clone(&self.agents);
        let mut agents = write_lock(&lock);
        self.populate(&mut agents, segment, player)
    }

    /// Drop every agent and repopulate under a single write lock, so
    /// readers never see the empty list in between. Counters keep running.
    pub fn reset(&mut self, segment: &RoadSegment, player: &PlayerSnapshot) -> usize {
        let lock = Arc::clone(&self.agents);
        let mut agents = write_lock(&lock);
        let cleared = agents.len();
        agents.clear();
        self.stats.agents_despawned += cleared;
        self.spawner.reset();
        info!("Traffic reset at tick {}, cleared {} agents", self.tick, cleared);
        self.populate(&mut agents, segment, player)
    }

    fn populate(
        &mut self,
        agents: &mut Vec<TrafficAgent>,
        segment: &RoadSegment,
        player: &PlayerSnapshot,
    ) -> usize {
        let ctx = SpawnContext {
            geometry: self.geometry.as_ref(),
            player,
            speed: &self.config.speed,
            scale: self.scale,
            now: self.tick,
        };
        let outcome = self.spawner.spawn_initial(agents, segment, &ctx);
        self.stats.agents_spawned += outcome.spawned.len();
        self.stats.spawn_rejections += outcome.rejected;
        info!(
            "Initial population: {} agents ({} candidates rejected)",
            outcome.spawned.len(),
            outcome.rejected
        );
        outcome.spawned.len()
    }

    /// Ask an agent to start a lane change right away.
    ///
    /// The cooldown is checked before anything about the target lane, so a
    /// fresh agent is refused no matter what traffic surrounds it.
    pub fn request_lane_change(&mut self, id: AgentId, target_lane: usize) -> LaneChangeOutcome {
        let outcome = self.try_request_lane_change(id, target_lane);
        match outcome {
            LaneChangeOutcome::Started => {
                self.stats.lane_changes_started += 1;
                debug!("{:?} starting requested change to lane {}", id, target_lane);
            }
            LaneChangeOutcome::Denied(reason) => {
                self.stats.lane_change_denials += 1;
                debug!("{:?} lane change to {} denied: {:?}", id, target_lane, reason);
            }
        }
        outcome
    }

    fn try_request_lane_change(&self, id: AgentId, target_lane: usize) -> LaneChangeOutcome {
        let mut agents = write_lock(&self.agents);
        let Some(index) = agents.iter().position(|agent| agent.id == id) else {
            return LaneChangeOutcome::Denied(LaneChangeDenial::UnknownAgent);
        };
        let agent = &agents[index];
        if agent.is_changing_lane() {
            return LaneChangeOutcome::Denied(LaneChangeDenial::AlreadyChanging);
        }
        if !agent.cooldown_elapsed(self.tick, self.config.lane_change.cooldown_ticks) {
            return LaneChangeOutcome::Denied(LaneChangeDenial::Cooldown);
        }
        let segment = self.geometry.segment_at(agent.position.y);
        let adjacent = target_lane.abs_diff(agent.lane) == 1;
        let Some(to_x) = segment
            .lane_center_x(target_lane)
            .filter(|_| target_lane >= 1 && adjacent && segment.is_drivable(target_lane))
        else {
            return LaneChangeOutcome::Denied(LaneChangeDenial::InvalidLane);
        };
        if !self.target_lane_clear(&agents, index, target_lane, false, None) {
            return LaneChangeOutcome::Denied(LaneChangeDenial::Blocked);
        }
        let step = self.config.lane_change.progress_step;
        if agents[index].begin_lane_change(target_lane, to_x, step) {
            LaneChangeOutcome::Started
        } else {
            LaneChangeOutcome::Denied(LaneChangeDenial::InvalidLane)
        }
    }

    /// Whether `agents[index]` may move into `lane` given current positions.
    ///
    /// A relaxed check only demands the hard following distance, plus one
    /// step of the agent's own travel ahead of it.
    fn target_lane_clear(
        &self,
        agents: &[TrafficAgent],
        index: usize,
        lane: usize,
        relaxed: bool,
        player: Option<(&PlayerSnapshot, Option<usize>)>,
    ) -> bool {
        let agent = &agents[index];
        if lane == 0 || !self.geometry.segment_at(agent.position.y).is_drivable(lane) {
            return false;
        }
        let min_gap = self.config.speed.min_following_distance;
        let (ahead_gap, behind_gap) = if relaxed {
            (min_gap + agent.speed, min_gap)
        } else {
            let margin = self.config.lane_change.block_margin;
            (margin, margin)
        };
        let too_close = |y: f32| {
            let dy = agent.position.y - y;
            if dy >= 0.0 {
                dy < ahead_gap
            } else {
                -dy < behind_gap
            }
        };

        if let Some((snapshot, player_lane)) = player {
            if player_lane == Some(lane) && too_close(snapshot.position.y) {
                return false;
            }
        }
        !agents.iter().enumerate().any(|(j, other)| {
            j != index
                && other.position.is_finite()
                && other.occupies(lane)
                && too_close(other.position.y)
        })
    }

    fn perception_in_range(&self, agent: &TrafficAgent) -> bool {
        let bound = self.config.sanity_bound;
        agent.position.is_finite()
            && agent.position.x.abs() <= bound
            && agent.position.y.abs() <= bound
            && agent.speed.is_finite()
    }

    /// Advance the simulation by one tick.
    pub fn tick(&mut self, player: &PlayerSnapshot) -> TickReport {
        let lock = Arc::clone(&self.agents);
        let mut agents = write_lock(&lock);

        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        let player_lane = self
            .geometry
            .segment_at(player.position.y)
            .lane_at_x(player.position.x);

        let decisions = self.perceive_all(&agents, player, player_lane, &mut report);
        self.resolve_all(&mut agents, &decisions, player, player_lane, &mut report);
        self.despawn(&mut agents, player, &mut report);

        let ctx = SpawnContext {
            geometry: self.geometry.as_ref(),
            player,
            speed: &self.config.speed,
            scale: self.scale,
            now: self.tick,
        };
        let outcome = self.spawner.update(&mut agents, &ctx);
        report.spawned = outcome.spawned.len();
        self.stats.agents_spawned += outcome.spawned.len();
        self.stats.spawn_rejections += outcome.rejected;

        if let Some(agent) = player_struck_by(&player.position, &agents, &self.footprint) {
            warn!(
                "Player struck by {:?} in lane {} at tick {}",
                agent.id, agent.lane, self.tick
            );
            report.player_struck = true;
            report.struck_by = Some(agent.id);
            self.stats.player_collisions += 1;
        }

        self.stats.ticks += 1;
        report
    }

    /// Phase 1. `None` marks an agent skipped for out-of-range state.
    fn perceive_all(
        &mut self,
        agents: &[TrafficAgent],
        player: &PlayerSnapshot,
        player_lane: Option<usize>,
        report: &mut TickReport,
    ) -> Vec<Option<Decision>> {
        let ctx = PerceptionContext {
            config: &self.config,
            scale: self.scale,
            geometry: self.geometry.as_ref(),
            player,
            player_lane,
            now: self.tick,
        };
        let mut skipped = 0;
        let decisions = agents
            .iter()
            .enumerate()
            .map(|(index, agent)| {
                if !self.perception_in_range(agent) {
                    warn!(
                        "Skipping perception for {:?}: position ({}, {}) speed {}",
                        agent.id, agent.position.x, agent.position.y, agent.speed
                    );
                    skipped += 1;
                    return None;
                }
                let perception = perceive(index, agents, &ctx);
                Some(decide(agent, &perception, &ctx))
            })
            .collect();
        report.perception_skipped = skipped;
        self.stats.perception_skips += skipped;
        decisions
    }

    /// Phase 2: apply decisions front to back.
    fn resolve_all(
        &mut self,
        agents: &mut [TrafficAgent],
        decisions: &[Option<Decision>],
        player: &PlayerSnapshot,
        player_lane: Option<usize>,
        report: &mut TickReport,
    ) {
        let mut order: Vec<usize> = (0..agents.len())
            .filter(|index| decisions[*index].is_some())
            .collect();
        order.sort_by_key(|index| (OrderedFloat(agents[*index].position.y), agents[*index].id));

        for index in order {
            if let Some(decision) = decisions[index] {
                self.resolve_agent(agents, index, &decision, player, player_lane, report);
            }
        }
    }

    fn resolve_agent(
        &mut self,
        agents: &mut [TrafficAgent],
        index: usize,
        decision: &Decision,
        player: &PlayerSnapshot,
        player_lane: Option<usize>,
        report: &mut TickReport,
    ) {
        let speed_config = &self.config.speed;
        let lane_config = &self.config.lane_change;

        // Speed
        {
            let agent = &mut agents[index];
            agent.target_speed = decision.target_speed;
            agent.speed = approach_speed(
                agent.speed,
                decision.target_speed,
                speed_config.acceleration,
                decision.brake.deceleration(speed_config),
            );
            if agent.speed < speed_config.near_zero_speed && decision.blocked_ahead {
                agent.stalled_ticks = agent.stalled_ticks.saturating_add(1);
            } else {
                agent.stalled_ticks = 0;
            }
            if decision.held_up {
                agent.stuck_behind_ticks = agent.stuck_behind_ticks.saturating_add(1);
            } else {
                agent.stuck_behind_ticks = 0;
            }
        }

        // Lane change request, re-checked against the current tick
        let mut began_change = false;
        if let Some(request) = decision.lane_change {
            let agent = &agents[index];
            let to_x = self
                .geometry
                .segment_at(agent.position.y)
                .lane_center_x(request.target_lane);
            let clear = self.target_lane_clear(
                agents,
                index,
                request.target_lane,
                request.is_relaxed(),
                Some((player, player_lane)),
            );
            began_change = match to_x {
                Some(to_x) if clear => agents[index].begin_lane_change(
                    request.target_lane,
                    to_x,
                    lane_config.progress_step,
                ),
                _ => false,
            };
            if began_change {
                report.lane_changes_started += 1;
                self.stats.lane_changes_started += 1;
                if request.reason == LaneChangeReason::Unstick {
                    self.stats.deadlock_escapes += 1;
                    info!(
                        "{:?} escaping deadlock into lane {}",
                        agents[index].id, request.target_lane
                    );
                }
                debug!(
                    "{:?} changing lane {} -> {} ({:?})",
                    agents[index].id, agents[index].lane, request.target_lane, request.reason
                );
            } else {
                self.stats.lane_change_denials += 1;
            }
        }

        // Longitudinal move, vetoed if it closes on a leader too much
        let new_y = {
            let agent = &agents[index];
            let y = agent.position.y;
            let leader_y = agents
                .iter()
                .enumerate()
                .filter(|(j, other)| {
                    *j != index
                        && other.position.is_finite()
                        && agent.shares_lane_with(other)
                        && (other.position.y < y
                            || (other.position.y == y && other.id < agent.id))
                })
                .map(|(_, other)| OrderedFloat(other.position.y))
                .max()
                .map(|leader| leader.0);

            let tentative = y - agent.speed;
            let min_gap = speed_config.min_following_distance;
            match leader_y {
                Some(leader_y) if violates_following_distance(tentative, leader_y, min_gap) => {
                    let halved = agent.speed * 0.5;
                    let step = halved * speed_config.resolution_step_fraction;
                    let floor = leader_y + min_gap.min(y - leader_y);
                    agents[index].speed = halved;
                    self.stats.resolution_vetoes += 1;
                    (y - step).max(floor)
                }
                _ => tentative,
            }
        };

        let agent = &mut agents[index];
        agent.position.y = new_y;

        // Lateral position
        if agent.is_changing_lane() {
            if !began_change && agent.advance_lane_change(lane_config.progress_step, self.tick) {
                agent.target_speed = self
                    .scale
                    .to_units(steady_target_mph(speed_config, agent.lane));
                report.lane_changes_completed += 1;
                self.stats.lane_changes_completed += 1;
                debug!("{:?} settled in lane {}", agent.id, agent.lane);
            }
        } else if let Some(x) = self.geometry.segment_at(new_y).lane_center_x(agent.lane) {
            agent.position.x = x;
        }

        if !agent.passed_by_player && player.position.y < agent.position.y {
            agent.passed_by_player = true;
            report.passed_by_player += 1;
            self.stats.agents_passed += 1;
        }
    }

    /// Remove agents outside the window around the player, agents with
    /// corrupt state and agents whose lane ended under them.
    fn despawn(
        &mut self,
        agents: &mut Vec<TrafficAgent>,
        player: &PlayerSnapshot,
        report: &mut TickReport,
    ) {
        let window = self.config.spawner.spawn_range + self.config.spawner.despawn_margin;
        let geometry = self.geometry.as_ref();
        let mut lane_drops = 0;
        let before = agents.len();
        agents.retain(|agent| {
            if !agent.position.is_finite() {
                debug!("Removing {:?}: non-finite position", agent.id);
                return false;
            }
            if (agent.position.y - player.position.y).abs() > window {
                debug!("Despawning {:?} at y={:.0}", agent.id, agent.position.y);
                return false;
            }
            if !agent.is_changing_lane()
                && !geometry.segment_at(agent.position.y).is_drivable(agent.lane)
            {
                debug!("Removing {:?}: lane {} ended", agent.id, agent.lane);
                lane_drops += 1;
                return false;
            }
            true
        });
        let removed = before - agents.len();
        report.despawned = removed;
        self.stats.agents_despawned += removed;
        self.stats.lane_drop_removals += lane_drops;
    }
}
