//! Diagnostic counters for the traffic engine

use log::info;

/// Running totals for the lifetime of an engine, across level resets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub ticks: u64,
    pub agents_spawned: usize,
    pub agents_despawned: usize,
    /// Agents removed because their lane ended under them
    pub lane_drop_removals: usize,
    pub spawn_rejections: usize,
    pub lane_changes_started: usize,
    pub lane_changes_completed: usize,
    pub lane_change_denials: usize,
    /// Lane changes forced by the anti-deadlock escape
    pub deadlock_escapes: usize,
    /// Moves vetoed by the resolution phase
    pub resolution_vetoes: usize,
    /// Agents skipped by perception for out-of-range coordinates
    pub perception_skips: usize,
    pub agents_passed: usize,
    pub player_collisions: usize,
}

impl TrafficStats {
    /// Log the end-of-run summary
    pub fn log_summary(&self, active_agents: usize) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Ticks simulated: {}", self.ticks);
        info!("Total agents spawned: {}", self.agents_spawned);
        info!("Total agents despawned: {}", self.agents_despawned);
        info!("Active agents: {}", active_agents);
        info!(
            "Lane changes completed: {} (started {}, denied {}, deadlock escapes {})",
            self.lane_changes_completed,
            self.lane_changes_started,
            self.lane_change_denials,
            self.deadlock_escapes
        );
        info!("Agents passed: {}", self.agents_passed);
        info!("Player collisions: {}", self.player_collisions);
        info!("Perception skips: {}", self.perception_skips);
        info!(
            "Spawn rejections: {}, resolution vetoes: {}, lane drops: {}",
            self.spawn_rejections, self.resolution_vetoes, self.lane_drop_removals
        );
    }
}
