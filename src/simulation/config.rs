//! Tuning for the traffic simulation.
//!
//! Every value has a compiled-in default. Values can be overridden from an
//! INI file:
//!
//! ```ini
//! [simulation]
//! tick_rate = 60
//! units_per_second_per_mph = 6.0
//!
//! [speed]
//! base_limit_mph = 60
//! per_lane_step_mph = 5
//!
//! [spawner]
//! enabled = true
//! max_agents = 40
//! ```
//!
//! Missing keys keep their defaults.

use anyhow::{anyhow, Context, Result};
use configparser::ini::Ini;
use log::info;
use std::path::Path;

use super::types::{SPRITE_LENGTH, SPRITE_WIDTH};

/// Default simulation rate in ticks per second
pub const DEFAULT_TICK_RATE: u32 = 60;
/// World units travelled per second at 1 MPH
pub const DEFAULT_UNITS_PER_SECOND_PER_MPH: f32 = 6.0;
/// Coordinates beyond this are treated as numerical corruption
pub const DEFAULT_SANITY_BOUND: f32 = 1.0e7;

/// Speed limit model and longitudinal behavior
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedConfig {
    /// Speed limit of the player's home lane
    pub base_limit_mph: f32,
    /// Speed limit increase per lane index
    pub per_lane_step_mph: f32,
    /// Traffic drives this far under the limit
    pub under_limit_mph: f32,
    /// Units/tick gained per tick when below target
    pub acceleration: f32,
    /// Units/tick shed per tick for each braking level
    pub comfortable_decel: f32,
    pub sharp_decel: f32,
    pub emergency_decel: f32,
    /// Gap at which perception starts sharp braking
    pub following_distance: f32,
    /// Hard gap enforced by the resolution phase
    pub min_following_distance: f32,
    /// How far ahead obstacles are considered at all
    pub lookahead_distance: f32,
    /// Fraction of the halved speed applied when a move is vetoed
    pub resolution_step_fraction: f32,
    /// Below this an agent counts as stopped
    pub near_zero_speed: f32,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            base_limit_mph: 60.0,
            per_lane_step_mph: 5.0,
            under_limit_mph: 5.0,
            acceleration: 0.05,
            comfortable_decel: 0.08,
            sharp_decel: 0.2,
            emergency_decel: 0.5,
            following_distance: 240.0,
            min_following_distance: 160.0,
            lookahead_distance: 480.0,
            resolution_step_fraction: 0.5,
            near_zero_speed: 0.2,
        }
    }
}

/// Lane change decision tuning
#[derive(Debug, Clone, PartialEq)]
pub struct LaneChangeConfig {
    /// Progress added per tick while changing lanes
    pub progress_step: f32,
    /// Minimum ticks spent in a lane before another change
    pub cooldown_ticks: u64,
    /// Longitudinal clearance required in the destination lane
    pub block_margin: f32,
    /// A follower closer than this may trigger an escape
    pub escape_distance: f32,
    /// Closing speed (units/tick) that counts as "closing fast"
    pub escape_closing_speed: f32,
    /// Ticks stuck behind a slower car before overtaking
    pub overtake_patience_ticks: u32,
    /// Leader must be this much slower than our target to be "slower"
    pub overtake_speed_margin: f32,
    /// Ticks stopped and boxed in before the anti-deadlock escape
    pub stall_ticks: u32,
}

impl Default for LaneChangeConfig {
    fn default() -> Self {
        Self {
            progress_step: 1.0 / 45.0,
            cooldown_ticks: 180,
            block_margin: 200.0,
            escape_distance: 200.0,
            escape_closing_speed: 1.0,
            overtake_patience_ticks: 90,
            overtake_speed_margin: 0.5,
            stall_ticks: 180,
        }
    }
}

/// Spawner tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnerConfig {
    pub enabled: bool,
    /// Far edge of the spawn window, measured from the player
    pub spawn_range: f32,
    /// Extra distance past `spawn_range` before an agent is despawned
    pub despawn_margin: f32,
    /// Near edge of the spawn window, keeps pop-in off screen
    pub dead_zone: f32,
    /// Base ticks between spawn evaluations
    pub interval_ticks: u32,
    /// Random jitter (+/-) applied to the interval
    pub interval_jitter: u32,
    /// Same-lane spacing for lane 1
    pub base_spacing: f32,
    /// Extra same-lane spacing per lane index
    pub per_lane_spacing: f32,
    /// Radius of the all-lane density check
    pub cluster_radius: f32,
    /// Agents allowed inside `cluster_radius` before rejecting
    pub max_cluster: usize,
    pub max_agents: usize,
    /// Candidates tried per lane and direction by `spawn_initial`
    pub initial_attempts: usize,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spawn_range: 2000.0,
            despawn_margin: 300.0,
            dead_zone: 700.0,
            interval_ticks: 30,
            interval_jitter: 10,
            base_spacing: 300.0,
            per_lane_spacing: 60.0,
            cluster_radius: 400.0,
            max_cluster: 3,
            max_agents: 40,
            initial_attempts: 4,
        }
    }
}

/// Collision footprint, smaller than the sprite
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionConfig {
    pub half_width: f32,
    pub half_length: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            half_width: 16.0,
            half_length: 34.0,
        }
    }
}

/// All tuning for a traffic engine
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficConfig {
    pub tick_rate: u32,
    pub units_per_second_per_mph: f32,
    pub sanity_bound: f32,
    pub speed: SpeedConfig,
    pub lane_change: LaneChangeConfig,
    pub spawner: SpawnerConfig,
    pub collision: CollisionConfig,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            units_per_second_per_mph: DEFAULT_UNITS_PER_SECOND_PER_MPH,
            sanity_bound: DEFAULT_SANITY_BOUND,
            speed: SpeedConfig::default(),
            lane_change: LaneChangeConfig::default(),
            spawner: SpawnerConfig::default(),
            collision: CollisionConfig::default(),
        }
    }
}

fn read_f32(ini: &Ini, section: &str, key: &str, field: &mut f32) -> Result<()> {
    let value = ini
        .getfloat(section, key)
        .map_err(|e| anyhow!("[{}] {}: {}", section, key, e))?;
    if let Some(value) = value {
        *field = value as f32;
    }
    Ok(())
}

fn read_u64(ini: &Ini, section: &str, key: &str, field: &mut u64) -> Result<()> {
    let value = ini
        .getuint(section, key)
        .map_err(|e| anyhow!("[{}] {}: {}", section, key, e))?;
    if let Some(value) = value {
        *field = value;
    }
    Ok(())
}

fn read_u32(ini: &Ini, section: &str, key: &str, field: &mut u32) -> Result<()> {
    let mut wide = *field as u64;
    read_u64(ini, section, key, &mut wide)?;
    *field = u32::try_from(wide).with_context(|| format!("[{}] {} out of range", section, key))?;
    Ok(())
}

fn read_usize(ini: &Ini, section: &str, key: &str, field: &mut usize) -> Result<()> {
    let mut wide = *field as u64;
    read_u64(ini, section, key, &mut wide)?;
    *field = usize::try_from(wide).with_context(|| format!("[{}] {} out of range", section, key))?;
    Ok(())
}

fn read_bool(ini: &Ini, section: &str, key: &str, field: &mut bool) -> Result<()> {
    let value = ini
        .getbool(section, key)
        .map_err(|e| anyhow!("[{}] {}: {}", section, key, e))?;
    if let Some(value) = value {
        *field = value;
    }
    Ok(())
}

impl TrafficConfig {
    /// Load a configuration from an INI file on top of the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("Failed to load config file {:?}", path))?;
        let config = Self::from_ini(&ini)?;
        info!(
            "Loaded config from {:?}: {} Hz, {} agents max, spawner {}",
            path,
            config.tick_rate,
            config.spawner.max_agents,
            if config.spawner.enabled { "on" } else { "off" }
        );
        Ok(config)
    }

    /// Parse a configuration from INI text on top of the defaults.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let mut ini = Ini::new();
        ini.read(text.to_string())
            .map_err(|e| anyhow!(e))
            .context("Failed to parse config")?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self> {
        let mut config = Self::default();

        read_u32(ini, "simulation", "tick_rate", &mut config.tick_rate)?;
        read_f32(
            ini,
            "simulation",
            "units_per_second_per_mph",
            &mut config.units_per_second_per_mph,
        )?;
        read_f32(ini, "simulation", "sanity_bound", &mut config.sanity_bound)?;

        let speed = &mut config.speed;
        read_f32(ini, "speed", "base_limit_mph", &mut speed.base_limit_mph)?;
        read_f32(ini, "speed", "per_lane_step_mph", &mut speed.per_lane_step_mph)?;
        read_f32(ini, "speed", "under_limit_mph", &mut speed.under_limit_mph)?;
        read_f32(ini, "speed", "acceleration", &mut speed.acceleration)?;
        read_f32(ini, "speed", "comfortable_decel", &mut speed.comfortable_decel)?;
        read_f32(ini, "speed", "sharp_decel", &mut speed.sharp_decel)?;
        read_f32(ini, "speed", "emergency_decel", &mut speed.emergency_decel)?;
        read_f32(ini, "speed", "following_distance", &mut speed.following_distance)?;
        read_f32(
            ini,
            "speed",
            "min_following_distance",
            &mut speed.min_following_distance,
        )?;
        read_f32(ini, "speed", "lookahead_distance", &mut speed.lookahead_distance)?;
        read_f32(
            ini,
            "speed",
            "resolution_step_fraction",
            &mut speed.resolution_step_fraction,
        )?;
        read_f32(ini, "speed", "near_zero_speed", &mut speed.near_zero_speed)?;

        let lane_change = &mut config.lane_change;
        read_f32(ini, "lane_change", "progress_step", &mut lane_change.progress_step)?;
        read_u64(ini, "lane_change", "cooldown_ticks", &mut lane_change.cooldown_ticks)?;
        read_f32(ini, "lane_change", "block_margin", &mut lane_change.block_margin)?;
        read_f32(ini, "lane_change", "escape_distance", &mut lane_change.escape_distance)?;
        read_f32(
            ini,
            "lane_change",
            "escape_closing_speed",
            &mut lane_change.escape_closing_speed,
        )?;
        read_u32(
            ini,
            "lane_change",
            "overtake_patience_ticks",
            &mut lane_change.overtake_patience_ticks,
        )?;
        read_f32(
            ini,
            "lane_change",
            "overtake_speed_margin",
            &mut lane_change.overtake_speed_margin,
        )?;
        read_u32(ini, "lane_change", "stall_ticks", &mut lane_change.stall_ticks)?;

        let spawner = &mut config.spawner;
        read_bool(ini, "spawner", "enabled", &mut spawner.enabled)?;
        read_f32(ini, "spawner", "spawn_range", &mut spawner.spawn_range)?;
        read_f32(ini, "spawner", "despawn_margin", &mut spawner.despawn_margin)?;
        read_f32(ini, "spawner", "dead_zone", &mut spawner.dead_zone)?;
        read_u32(ini, "spawner", "interval_ticks", &mut spawner.interval_ticks)?;
        read_u32(ini, "spawner", "interval_jitter", &mut spawner.interval_jitter)?;
        read_f32(ini, "spawner", "base_spacing", &mut spawner.base_spacing)?;
        read_f32(ini, "spawner", "per_lane_spacing", &mut spawner.per_lane_spacing)?;
        read_f32(ini, "spawner", "cluster_radius", &mut spawner.cluster_radius)?;
        read_usize(ini, "spawner", "max_cluster", &mut spawner.max_cluster)?;
        read_usize(ini, "spawner", "max_agents", &mut spawner.max_agents)?;
        read_usize(ini, "spawner", "initial_attempts", &mut spawner.initial_attempts)?;

        read_f32(ini, "collision", "half_width", &mut config.collision.half_width)?;
        read_f32(ini, "collision", "half_length", &mut config.collision.half_length)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 {
            return Err(anyhow!("tick_rate must be positive"));
        }
        if !(self.lane_change.progress_step > 0.0 && self.lane_change.progress_step <= 1.0) {
            return Err(anyhow!("lane_change.progress_step must be in (0, 1]"));
        }
        if self.speed.min_following_distance > self.speed.following_distance {
            return Err(anyhow!(
                "min_following_distance ({}) exceeds following_distance ({})",
                self.speed.min_following_distance,
                self.speed.following_distance
            ));
        }
        if self.spawner.dead_zone >= self.spawner.spawn_range {
            return Err(anyhow!(
                "spawner dead_zone ({}) must be inside spawn_range ({})",
                self.spawner.dead_zone,
                self.spawner.spawn_range
            ));
        }
        if self.spawner.base_spacing < self.speed.min_following_distance {
            return Err(anyhow!(
                "spawner base_spacing ({}) is tighter than min_following_distance ({})",
                self.spawner.base_spacing,
                self.speed.min_following_distance
            ));
        }
        if self.collision.half_width * 2.0 > SPRITE_WIDTH
            || self.collision.half_length * 2.0 > SPRITE_LENGTH
        {
            return Err(anyhow!(
                "collision footprint {}x{} is larger than the {}x{} sprite",
                self.collision.half_width * 2.0,
                self.collision.half_length * 2.0,
                SPRITE_WIDTH,
                SPRITE_LENGTH
            ));
        }
        Ok(())
    }

    /// Render the configuration as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        let mut set = |section: &str, key: &str, value: String| {
            ini.set(section, key, Some(value));
        };

        set("simulation", "tick_rate", self.tick_rate.to_string());
        set(
            "simulation",
            "units_per_second_per_mph",
            self.units_per_second_per_mph.to_string(),
        );
        set("simulation", "sanity_bound", self.sanity_bound.to_string());

        let s = &self.speed;
        set("speed", "base_limit_mph", s.base_limit_mph.to_string());
        set("speed", "per_lane_step_mph", s.per_lane_step_mph.to_string());
        set("speed", "under_limit_mph", s.under_limit_mph.to_string());
        set("speed", "acceleration", s.acceleration.to_string());
        set("speed", "comfortable_decel", s.comfortable_decel.to_string());
        set("speed", "sharp_decel", s.sharp_decel.to_string());
        set("speed", "emergency_decel", s.emergency_decel.to_string());
        set("speed", "following_distance", s.following_distance.to_string());
        set("speed", "min_following_distance", s.min_following_distance.to_string());
        set("speed", "lookahead_distance", s.lookahead_distance.to_string());
        set("speed", "resolution_step_fraction", s.resolution_step_fraction.to_string());
        set("speed", "near_zero_speed", s.near_zero_speed.to_string());

        let l = &self.lane_change;
        set("lane_change", "progress_step", l.progress_step.to_string());
        set("lane_change", "cooldown_ticks", l.cooldown_ticks.to_string());
        set("lane_change", "block_margin", l.block_margin.to_string());
        set("lane_change", "escape_distance", l.escape_distance.to_string());
        set("lane_change", "escape_closing_speed", l.escape_closing_speed.to_string());
        set("lane_change", "overtake_patience_ticks", l.overtake_patience_ticks.to_string());
        set("lane_change", "overtake_speed_margin", l.overtake_speed_margin.to_string());
        set("lane_change", "stall_ticks", l.stall_ticks.to_string());

        let p = &self.spawner;
        set("spawner", "enabled", p.enabled.to_string());
        set("spawner", "spawn_range", p.spawn_range.to_string());
        set("spawner", "despawn_margin", p.despawn_margin.to_string());
        set("spawner", "dead_zone", p.dead_zone.to_string());
        set("spawner", "interval_ticks", p.interval_ticks.to_string());
        set("spawner", "interval_jitter", p.interval_jitter.to_string());
        set("spawner", "base_spacing", p.base_spacing.to_string());
        set("spawner", "per_lane_spacing", p.per_lane_spacing.to_string());
        set("spawner", "cluster_radius", p.cluster_radius.to_string());
        set("spawner", "max_cluster", p.max_cluster.to_string());
        set("spawner", "max_agents", p.max_agents.to_string());
        set("spawner", "initial_attempts", p.initial_attempts.to_string());

        set("collision", "half_width", self.collision.half_width.to_string());
        set("collision", "half_length", self.collision.half_length.to_string());

        ini
    }

    /// Save the configuration to an INI file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_ini()
            .write(path)
            .with_context(|| format!("Failed to save config file {:?}", path))?;
        info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_keep_defaults() {
        let config = TrafficConfig::from_ini_str("[spawner]\nmax_agents = 12\n").unwrap();
        assert_eq!(config.spawner.max_agents, 12);
        assert_eq!(config.speed, SpeedConfig::default());
        assert_eq!(config.tick_rate, DEFAULT_TICK_RATE);
    }

    #[test]
    fn written_config_reads_back() {
        let mut config = TrafficConfig::default();
        config.spawner.enabled = false;
        config.lane_change.cooldown_ticks = 42;
        let text = config.to_ini().writes();
        assert_eq!(TrafficConfig::from_ini_str(&text).unwrap(), config);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(TrafficConfig::from_ini_str("[speed]\nacceleration = fast\n").is_err());
        assert!(TrafficConfig::from_ini_str("[simulation]\ntick_rate = 0\n").is_err());
    }
}
