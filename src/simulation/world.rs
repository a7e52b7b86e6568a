//! Game-state layer around the traffic engine
//!
//! Owns the highway, the player and the engine, and decides what a
//! collision means: the level restarts.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use super::config::TrafficConfig;
use super::engine::{TickReport, TrafficEngine};
use super::player::{CarSpec, PlayerInput, PlayerVehicle};
use super::road::{Highway, LaneGeometry, LaneType, RoadSegment};
use super::types::{Position, PLAYER_HOME_LANE};

/// Speed the headless autopilot holds, MPH
pub const AUTOPILOT_MPH: f32 = 60.0;

/// World units covered by one row of the terminal map
const MAP_ROW_UNITS: f32 = 100.0;
/// Rows drawn ahead of and behind the player
const MAP_HALF_ROWS: i32 = 10;

/// The main simulation world
pub struct SimWorld {
    pub highway: Arc<Highway>,
    pub player: PlayerVehicle,
    pub engine: TrafficEngine,
    /// Times the player has been struck
    pub collisions: usize,
    /// Level (re)starts, including the first
    pub level: usize,
    start: Position,
    autopilot_mph: f32,
}

impl SimWorld {
    /// Build a world on `highway` and populate the first level.
    pub fn with_highway(highway: Highway, config: TrafficConfig, seed: Option<u64>) -> Result<Self> {
        let highway = Arc::new(highway);
        let geometry: Arc<dyn LaneGeometry> = highway.clone();
        let engine = TrafficEngine::new(config, geometry, seed)?;

        let start_x = highway
            .segment_at(0.0)
            .lane_center_x(PLAYER_HOME_LANE)
            .context("Highway has no home lane at the start")?;
        let start = Position::new(start_x, 0.0);

        let mut world = Self {
            player: PlayerVehicle::new(CarSpec::default(), start),
            highway,
            engine,
            collisions: 0,
            level: 0,
            start,
            autopilot_mph: AUTOPILOT_MPH,
        };
        world.reset_level();
        Ok(world)
    }

    /// Create a world on the default test highway
    pub fn new(config: TrafficConfig, seed: Option<u64>) -> Result<Self> {
        Self::with_highway(Highway::create_test_highway()?, config, seed)
    }

    /// Create a default test world with a seeded RNG for reproducible simulations
    pub fn create_test_world(seed: u64) -> Result<Self> {
        Self::new(TrafficConfig::default(), Some(seed))
    }

    pub fn set_autopilot_mph(&mut self, mph: f32) {
        self.autopilot_mph = mph.max(0.0);
    }

    /// Put the player back at the start and repopulate traffic.
    pub fn reset_level(&mut self) {
        self.player = PlayerVehicle::new(self.player.spec.clone(), self.start);
        self.player.velocity_y = self.engine.scale().to_units(self.autopilot_mph);
        self.level += 1;

        let segment = self.highway.segment_at(self.start.y);
        let agents = self.engine.reset(segment, &self.player.snapshot());
        info!("Level {} started with {} agents", self.level, agents);
    }

    /// Input that holds the autopilot speed in the home lane
    pub fn autopilot_input(&self) -> PlayerInput {
        let target = self.engine.scale().to_units(self.autopilot_mph);
        let lane_x = self
            .highway
            .segment_at(self.player.position.y)
            .lane_center_x(PLAYER_HOME_LANE)
            .unwrap_or(self.start.x);
        PlayerInput::hold_speed(&self.player, target, lane_x)
    }

    /// Advance one tick under the autopilot
    pub fn tick(&mut self) -> TickReport {
        let input = self.autopilot_input();
        self.tick_with_input(&input)
    }

    /// Advance one tick with explicit driver input.
    pub fn tick_with_input(&mut self, input: &PlayerInput) -> TickReport {
        let was_out_of_fuel = self.player.is_out_of_fuel();
        self.player.update(input, &self.engine.scale());
        if !was_out_of_fuel && self.player.is_out_of_fuel() {
            warn!("Player ran out of fuel at y={:.0}", self.player.position.y);
        }

        let report = self.engine.tick(&self.player.snapshot());
        if report.player_struck {
            self.collisions += 1;
            warn!(
                "Collision at tick {} (by {:?}), restarting level",
                report.tick, report.struck_by
            );
            self.reset_level();
        }
        report
    }

    /// Print a summary of the current state
    pub fn print_summary(&self) {
        let scale = self.engine.scale();
        let stats = self.engine.stats();
        println!("=== Highway Traffic Summary ===");
        println!(
            "Tick: {} (level {}, collisions {})",
            self.engine.tick_count(),
            self.level,
            self.collisions
        );
        println!(
            "Player: y={:.0} x={:.0} speed={:.1} MPH fuel={:.1}",
            self.player.position.y,
            self.player.position.x,
            scale.to_mph(self.player.velocity_y),
            self.player.fuel
        );
        let handle = self.engine.handle();
        println!("Agents: {} {:?}", handle.count(), handle.lane_counts());
        println!(
            "Spawned {} / despawned {} / passed {} / lane changes {}",
            stats.agents_spawned,
            stats.agents_despawned,
            stats.agents_passed,
            stats.lane_changes_completed
        );
    }

    /// Draw the road around the player in the terminal, ahead at the top
    pub fn draw_map(&self) {
        let segments = self.highway.segments();
        let lane_width = segments
            .iter()
            .map(|segment| segment.lane_width)
            .fold(f32::INFINITY, f32::min);
        let min_x = segments
            .iter()
            .map(|segment| segment.left_edge_x)
            .fold(f32::INFINITY, f32::min);
        let max_x = segments
            .iter()
            .map(RoadSegment::right_edge_x)
            .fold(f32::NEG_INFINITY, f32::max);
        let width = ((max_x - min_x) / lane_width).ceil().max(1.0) as usize;
        let to_col = |x: f32| {
            let col = ((x - min_x) / lane_width).floor();
            (col >= 0.0 && (col as usize) < width).then_some(col as usize)
        };

        let agents = self.engine.agents();
        let mut lines = Vec::new();
        for row in -MAP_HALF_ROWS..=MAP_HALF_ROWS {
            let y = self.player.position.y + row as f32 * MAP_ROW_UNITS;
            let segment = self.highway.segment_at(y);
            let mut cells: Vec<char> = (0..width)
                .map(|col| {
                    let x = min_x + (col as f32 + 0.5) * lane_width;
                    match column_type_at(segment, x) {
                        Some(LaneType::Driving) => '.',
                        Some(LaneType::Layby) => '_',
                        Some(LaneType::Closed) => 'x',
                        None => ' ',
                    }
                })
                .collect();

            let in_row = |other_y: f32| (other_y - y).abs() < MAP_ROW_UNITS * 0.5;
            for agent in agents.iter().filter(|agent| in_row(agent.position.y)) {
                if let Some(col) = to_col(agent.position.x) {
                    let glyph = agent.color.glyph();
                    cells[col] = if agent.is_changing_lane() {
                        glyph
                    } else {
                        glyph.to_ascii_uppercase()
                    };
                }
            }
            if in_row(self.player.position.y) {
                if let Some(col) = to_col(self.player.position.x) {
                    cells[col] = 'P';
                }
            }
            lines.push(format!("{:>7.0} |{}|", y, cells.iter().collect::<String>()));
        }

        println!("\n=== Road Map ===");
        println!("Legend: P=Player, R/B/G/Y/W/K=Traffic (lowercase: changing lane), .=Lane, _=Lay-by, x=Closed");
        println!();
        for line in &lines {
            println!("{}", line);
        }
        println!();
    }
}

/// Type of the segment column under a world x, including columns left of
/// the home lane.
fn column_type_at(segment: &RoadSegment, x: f32) -> Option<LaneType> {
    let offset = (x - segment.left_edge_x) / segment.lane_width;
    if !(offset >= 0.0) {
        return None;
    }
    segment.lane_types.get(offset.floor() as usize).copied()
}
