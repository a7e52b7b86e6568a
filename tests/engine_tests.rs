//! Scenario tests for the traffic engine tick

use std::sync::Arc;

use highway_traffic::simulation::{
    following_violations, speed_limit_mph, Highway, LaneChangeDenial, LaneChangeOutcome,
    PlayerSnapshot, Position, RoadSegment, TrafficConfig, TrafficEngine,
};

const TOLERANCE: f32 = 1e-3;

fn quiet_config() -> TrafficConfig {
    let mut config = TrafficConfig::default();
    config.spawner.enabled = false;
    config
}

fn straight_engine(lanes: usize, config: TrafficConfig) -> TrafficEngine {
    let segment = RoadSegment::uniform(lanes, 100.0, 0).unwrap();
    TrafficEngine::new(config, Arc::new(Highway::straight(segment)), Some(1)).unwrap()
}

fn player_at(y: f32, speed: f32) -> PlayerSnapshot {
    PlayerSnapshot {
        position: Position::new(50.0, y),
        speed,
    }
}

#[test]
fn test_free_agent_holds_lane_target() {
    let mut engine = straight_engine(4, quiet_config());
    let id = engine.add_agent(2, -1500.0).unwrap();
    let target = engine.lane_target_speed(2);
    // 70 MPH limit, 5 under
    assert!((target - 6.5).abs() < TOLERANCE);

    let player = player_at(0.0, 0.0);
    let mut last_y = -1500.0;
    for _ in 0..60 {
        engine.tick(&player);
        let agent = engine.get_agent(id).unwrap();
        assert!(agent.position.y < last_y, "y must decrease every tick");
        last_y = agent.position.y;
    }
    let agent = engine.get_agent(id).unwrap();
    assert!((agent.speed - target).abs() < TOLERANCE);
    assert_eq!(agent.lane, 2);
}

#[test]
fn test_agent_from_rest_converges_without_exceeding_limit() {
    let mut engine = straight_engine(4, quiet_config());
    let id = engine.add_agent_with_speed(2, -1500.0, 0.0).unwrap();
    let target = engine.lane_target_speed(2);
    let limit = engine.scale().to_units(speed_limit_mph(&engine.config().speed, 2));

    let player = player_at(0.0, 0.0);
    for _ in 0..150 {
        engine.tick(&player);
        let agent = engine.get_agent(id).unwrap();
        assert!(agent.speed <= limit);
        assert!(agent.speed >= 0.0);
    }
    let agent = engine.get_agent(id).unwrap();
    assert!((agent.speed - target).abs() < TOLERANCE);
}

#[test]
fn test_close_follower_is_slowed_and_gap_kept() {
    let mut engine = straight_engine(4, quiet_config());
    let leader = engine.add_agent(2, -1000.0).unwrap();
    let trailer = engine.add_agent(2, -860.0).unwrap();
    let start_speed = engine.get_agent(trailer).unwrap().speed;

    engine.tick(&player_at(0.0, 0.0));

    let leader = engine.get_agent(leader).unwrap();
    let trailer = engine.get_agent(trailer).unwrap();
    assert!(trailer.speed < start_speed);
    let gap = trailer.position.y - leader.position.y;
    assert!(gap >= 140.0, "gap shrank to {}", gap);
    assert!(engine.stats().resolution_vetoes >= 1);
}

#[test]
fn test_lane_change_denied_during_cooldown() {
    let mut engine = straight_engine(4, quiet_config());
    let id = engine.add_agent(3, -1000.0).unwrap();
    // Traffic next to it does not matter; the cooldown is checked first
    engine.add_agent(2, -1000.0).unwrap();

    assert_eq!(
        engine.request_lane_change(id, 2),
        LaneChangeOutcome::Denied(LaneChangeDenial::Cooldown)
    );
    assert_eq!(engine.get_agent(id).unwrap().lane_change_progress(), 0.0);
    assert_eq!(engine.stats().lane_change_denials, 1);
}

#[test]
fn test_lane_change_request_validation() {
    let mut config = quiet_config();
    config.lane_change.cooldown_ticks = 0;
    let mut engine = straight_engine(4, config);
    let id = engine.add_agent(1, -1000.0).unwrap();
    let blocker = engine.add_agent(2, -1100.0).unwrap();

    assert_eq!(
        engine.request_lane_change(id, 0),
        LaneChangeOutcome::Denied(LaneChangeDenial::InvalidLane)
    );
    assert_eq!(
        engine.request_lane_change(id, 3),
        LaneChangeOutcome::Denied(LaneChangeDenial::InvalidLane)
    );
    assert_eq!(
        engine.request_lane_change(id, 2),
        LaneChangeOutcome::Denied(LaneChangeDenial::Blocked)
    );
    assert_eq!(
        engine.request_lane_change(blocker, 3),
        LaneChangeOutcome::Started
    );
    assert_eq!(
        engine.request_lane_change(blocker, 1),
        LaneChangeOutcome::Denied(LaneChangeDenial::AlreadyChanging)
    );

    let missing = highway_traffic::simulation::AgentId(highway_traffic::simulation::SimId(999));
    assert_eq!(
        engine.request_lane_change(missing, 2),
        LaneChangeOutcome::Denied(LaneChangeDenial::UnknownAgent)
    );
}

#[test]
fn test_lane_change_is_atomic_lerp() {
    let mut engine = straight_engine(4, quiet_config());
    let id = engine.add_agent(1, -500.0).unwrap();
    let cooldown = engine.config().lane_change.cooldown_ticks;

    let mut player_y = 0.0;
    for _ in 0..cooldown {
        player_y -= 6.0;
        engine.tick(&player_at(player_y, 6.0));
    }
    assert_eq!(engine.request_lane_change(id, 2), LaneChangeOutcome::Started);

    let from_x = 150.0;
    let to_x = 250.0;
    let mut last_progress = engine.get_agent(id).unwrap().lane_change_progress();
    assert!(last_progress > 0.0);

    let mut ticks = 0;
    while engine.get_agent(id).unwrap().is_changing_lane() {
        player_y -= 6.0;
        engine.tick(&player_at(player_y, 6.0));
        ticks += 1;
        assert!(ticks <= 60, "lane change never finished");

        let agent = engine.get_agent(id).unwrap();
        if agent.is_changing_lane() {
            let progress = agent.lane_change_progress();
            assert!(progress >= last_progress);
            assert_eq!(agent.target_lane(), 2);
            let expected_x = from_x + (to_x - from_x) * progress;
            assert!((agent.position.x - expected_x).abs() < TOLERANCE);
            last_progress = progress;
        }
    }

    let agent = engine.get_agent(id).unwrap();
    assert_eq!(agent.lane, 2);
    assert!((agent.position.x - to_x).abs() < TOLERANCE);
    assert_eq!(agent.last_lane_change_at, engine.tick_count());
    assert!((agent.target_speed - engine.lane_target_speed(2)).abs() < TOLERANCE);
    assert_eq!(engine.stats().lane_changes_completed, 1);
}

#[test]
fn test_agents_leaving_window_are_removed() {
    let mut engine = straight_engine(4, quiet_config());
    engine.add_agent(1, -2200.0).unwrap();
    let window = engine.config().spawner.spawn_range + engine.config().spawner.despawn_margin;

    let player = player_at(0.0, 0.0);
    for _ in 0..40 {
        engine.tick(&player);
        for agent in engine.agents().iter() {
            assert!((agent.position.y - player.position.y).abs() <= window);
        }
    }
    assert_eq!(engine.agent_count(), 0);
    assert_eq!(engine.stats().agents_despawned, 1);
}

#[test]
fn test_out_of_range_agent_skipped_and_counted() {
    let mut engine = straight_engine(4, quiet_config());
    engine.add_agent(1, -2.0e7).unwrap();
    engine.add_agent(2, -1000.0).unwrap();

    let report = engine.tick(&player_at(0.0, 0.0));
    assert_eq!(report.perception_skipped, 1);
    assert_eq!(report.despawned, 1);
    assert_eq!(engine.stats().perception_skips, 1);
    assert_eq!(engine.agent_count(), 1);
}

#[test]
fn test_add_agent_rejects_bad_placement() {
    let mut engine = straight_engine(4, quiet_config());
    assert!(engine.add_agent(0, -1000.0).is_err());
    assert!(engine.add_agent(4, -1000.0).is_err());
    assert!(engine.add_agent(1, f32::NAN).is_err());
    assert!(engine.add_agent_with_speed(1, -1000.0, -1.0).is_err());
    assert_eq!(engine.agent_count(), 0);
}

#[test]
fn test_player_passing_marks_agent_once() {
    let mut engine = straight_engine(4, quiet_config());
    let id = engine.add_agent_with_speed(1, -300.0, 0.0).unwrap();
    engine.add_agent_with_speed(2, -300.0, 0.0).unwrap();

    let mut passed = 0;
    let mut player_y = 0.0;
    for _ in 0..100 {
        player_y -= 10.0;
        passed += engine.tick(&player_at(player_y, 10.0)).passed_by_player;
    }
    assert!(engine.get_agent(id).unwrap().passed_by_player);
    assert_eq!(passed, 2);
    assert_eq!(engine.stats().agents_passed, 2);
}

#[test]
fn test_lane_drop_merges_fresh_agent() {
    let highway = Highway::new(vec![
        (3000.0, RoadSegment::uniform(4, 100.0, 0).unwrap()),
        (3000.0, RoadSegment::uniform(3, 100.0, 0).unwrap()),
    ])
    .unwrap();
    let mut engine = TrafficEngine::new(quiet_config(), Arc::new(highway), Some(5)).unwrap();
    // Reaches the drop well inside its spawn cooldown
    let id = engine.add_agent(3, -2000.0).unwrap();

    let mut player_y = -1000.0;
    for _ in 0..200 {
        player_y -= 6.5;
        engine.tick(&player_at(player_y, 6.5));
        for agent in engine.agents().iter() {
            if agent.position.y < -3000.0 && !agent.is_changing_lane() {
                assert!(agent.lane <= 2, "agent still cruising in a dropped lane");
            }
        }
    }
    let agent = engine.get_agent(id).expect("merging agent was removed");
    assert_eq!(agent.lane, 2);
    assert!(agent.position.y < -3000.0);
    assert_eq!(engine.stats().lane_drop_removals, 0);
    assert_eq!(engine.stats().lane_changes_completed, 1);
}

#[test]
fn test_boxed_in_agent_escapes_deadlock() {
    let mut config = quiet_config();
    // Nobody accelerates and no ordinary lane change can fire
    config.speed.acceleration = 0.0;
    config.lane_change.cooldown_ticks = 10_000;
    let stall_ticks = config.lane_change.stall_ticks as usize;
    let mut engine = straight_engine(4, config);

    let stuck = engine.add_agent_with_speed(2, -1000.0, 0.0).unwrap();
    engine.add_agent_with_speed(2, -1200.0, 0.0).unwrap();
    // Inside the block margin on both sides, outside the hard gap
    let slow_side = engine.add_agent_with_speed(1, -1180.0, 0.0).unwrap();
    engine.add_agent_with_speed(3, -1180.0, 0.0).unwrap();

    let player = player_at(0.0, 0.0);
    for _ in 0..stall_ticks {
        engine.tick(&player);
    }
    assert_eq!(engine.stats().lane_changes_started, 0);
    assert_eq!(engine.get_agent(stuck).unwrap().stalled_ticks as usize, stall_ticks);

    let report = engine.tick(&player);
    assert_eq!(report.lane_changes_started, 1);
    assert_eq!(engine.stats().deadlock_escapes, 1);
    assert_eq!(engine.get_agent(stuck).unwrap().target_lane(), 1);

    for _ in 0..60 {
        engine.tick(&player);
    }
    let agent = engine.get_agent(stuck).unwrap();
    assert_eq!(agent.lane, 1);
    assert!(!agent.is_changing_lane());
    let gap = agent.position.y - engine.get_agent(slow_side).unwrap().position.y;
    assert!(gap >= engine.config().speed.min_following_distance);
    assert!(following_violations(&engine.agents(), 160.0).is_empty());
    assert_eq!(engine.stats().deadlock_escapes, 1);
}

#[test]
fn test_long_run_keeps_lane_and_spacing_invariants() {
    let highway = Highway::create_test_highway().unwrap();
    let mut engine =
        TrafficEngine::new(TrafficConfig::default(), Arc::new(highway), Some(42)).unwrap();
    let min_gap = engine.config().speed.min_following_distance;
    let window = engine.config().spawner.spawn_range + engine.config().spawner.despawn_margin;

    let mut player = player_at(0.0, 6.0);
    let segment = RoadSegment::uniform(4, 100.0, 0).unwrap();
    assert!(engine.spawn_initial(&segment, &player) > 0);

    for _ in 0..4000 {
        player.position.y -= player.speed;
        engine.tick(&player);

        let agents = engine.agents();
        for agent in agents.iter() {
            assert!(agent.lane >= 1);
            assert!(agent.target_lane() >= 1);
            assert!((agent.position.y - player.position.y).abs() <= window);
        }
        let violations = following_violations(&agents, min_gap - 0.01);
        assert!(violations.is_empty(), "agents too close: {:?}", violations);
    }
    assert!(engine.stats().agents_spawned > 0);
}

#[test]
fn test_same_seed_same_traffic() {
    let run = || {
        let highway = Highway::create_test_highway().unwrap();
        let mut engine =
            TrafficEngine::new(TrafficConfig::default(), Arc::new(highway), Some(9)).unwrap();
        let mut player = player_at(0.0, 6.0);
        for _ in 0..600 {
            player.position.y -= player.speed;
            engine.tick(&player);
        }
        engine.handle().snapshot()
    };
    assert_eq!(run(), run());
}
