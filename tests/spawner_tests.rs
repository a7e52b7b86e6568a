//! Density rules of the traffic spawner

use highway_traffic::simulation::{
    steady_target_mph, Highway, LaneType, PlayerSnapshot, Position, RoadSegment, SpawnContext,
    SpawnDirection, SpawnRejection, Spawner, SpawnerConfig, SpeedConfig, SpeedScale,
    TrafficAgent,
};

fn context<'a>(
    highway: &'a Highway,
    player: &'a PlayerSnapshot,
    speed: &'a SpeedConfig,
) -> SpawnContext<'a> {
    SpawnContext {
        geometry: highway,
        player,
        speed,
        scale: SpeedScale::new(6.0, 60),
        now: 0,
    }
}

fn player_in_home_lane() -> PlayerSnapshot {
    PlayerSnapshot {
        position: Position::new(50.0, 0.0),
        speed: 6.0,
    }
}

fn place(spawner: &mut Spawner, highway: &Highway, ctx: &SpawnContext, lane: usize, y: f32) -> TrafficAgent {
    spawner
        .create_agent(lane, y, None, highway.segments().first().unwrap(), ctx)
        .unwrap()
}

#[test]
fn test_spacing_grows_with_lane_index() {
    let spawner = Spawner::new(SpawnerConfig::default(), Some(1));
    assert!(spawner.min_spacing(3) > spawner.min_spacing(2));
    assert!(spawner.min_spacing(2) > spawner.min_spacing(1));
}

#[test]
fn test_candidate_too_close_in_lane() {
    let highway = Highway::straight(RoadSegment::uniform(4, 100.0, 0).unwrap());
    let player = player_in_home_lane();
    let speed = SpeedConfig::default();
    let ctx = context(&highway, &player, &speed);
    let mut spawner = Spawner::new(SpawnerConfig::default(), Some(1));
    let agents = vec![place(&mut spawner, &highway, &ctx, 2, -1000.0)];

    assert_eq!(
        spawner.check_candidate(&agents, 2, -1200.0, SpawnDirection::Ahead, &ctx),
        Err(SpawnRejection::TooClose)
    );
    assert_eq!(
        spawner.check_candidate(&agents, 2, -1500.0, SpawnDirection::Ahead, &ctx),
        Ok(())
    );
    // Other lanes are only bound by the cluster rule
    assert_eq!(
        spawner.check_candidate(&agents, 3, -1000.0, SpawnDirection::Ahead, &ctx),
        Ok(())
    );
}

#[test]
fn test_candidate_rejected_in_cluster() {
    let highway = Highway::straight(RoadSegment::uniform(6, 100.0, 0).unwrap());
    let player = player_in_home_lane();
    let speed = SpeedConfig::default();
    let ctx = context(&highway, &player, &speed);
    let mut spawner = Spawner::new(SpawnerConfig::default(), Some(1));
    let agents: Vec<TrafficAgent> = (1..=3)
        .map(|lane| place(&mut spawner, &highway, &ctx, lane, -1000.0))
        .collect();

    assert_eq!(
        spawner.check_candidate(&agents, 4, -1100.0, SpawnDirection::Ahead, &ctx),
        Err(SpawnRejection::Clustered)
    );
    assert_eq!(
        spawner.check_candidate(&agents, 4, -1500.0, SpawnDirection::Ahead, &ctx),
        Ok(())
    );
}

#[test]
fn test_one_agent_ahead_in_player_lane() {
    let highway = Highway::straight(RoadSegment::uniform(4, 100.0, 0).unwrap());
    let player = PlayerSnapshot {
        position: Position::new(150.0, 0.0),
        speed: 6.0,
    };
    let speed = SpeedConfig::default();
    let ctx = context(&highway, &player, &speed);
    let mut spawner = Spawner::new(SpawnerConfig::default(), Some(1));
    let agents = vec![place(&mut spawner, &highway, &ctx, 1, -1500.0)];

    assert_eq!(
        spawner.check_candidate(&agents, 1, -800.0, SpawnDirection::Ahead, &ctx),
        Err(SpawnRejection::PlayerLaneOccupied)
    );
    assert_eq!(
        spawner.check_candidate(&agents, 1, 800.0, SpawnDirection::Behind, &ctx),
        Ok(())
    );
}

#[test]
fn test_capacity_and_lane_type_limits() {
    let segment = RoadSegment::new(
        4,
        100.0,
        0,
        vec![
            LaneType::Driving,
            LaneType::Driving,
            LaneType::Closed,
            LaneType::Driving,
        ],
        0.0,
    )
    .unwrap();
    let highway = Highway::straight(segment);
    let player = player_in_home_lane();
    let speed = SpeedConfig::default();
    let ctx = context(&highway, &player, &speed);
    let config = SpawnerConfig {
        max_agents: 1,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(config, Some(1));

    assert_eq!(
        spawner.check_candidate(&[], 0, -1000.0, SpawnDirection::Ahead, &ctx),
        Err(SpawnRejection::LaneNotDrivable)
    );
    assert_eq!(
        spawner.check_candidate(&[], 2, -1000.0, SpawnDirection::Ahead, &ctx),
        Err(SpawnRejection::LaneNotDrivable)
    );
    let agents = vec![place(&mut spawner, &highway, &ctx, 3, -1800.0)];
    assert_eq!(
        spawner.check_candidate(&agents, 1, -1000.0, SpawnDirection::Ahead, &ctx),
        Err(SpawnRejection::AtCapacity)
    );
}

#[test]
fn test_new_agents_start_at_lane_target() {
    let highway = Highway::straight(RoadSegment::uniform(4, 100.0, 0).unwrap());
    let player = player_in_home_lane();
    let speed = SpeedConfig::default();
    let mut ctx = context(&highway, &player, &speed);
    ctx.now = 77;
    let mut spawner = Spawner::new(SpawnerConfig::default(), Some(1));

    let agent = place(&mut spawner, &highway, &ctx, 3, -1000.0);
    let expected = ctx.scale.to_units(steady_target_mph(&speed, 3));
    assert!((agent.speed - expected).abs() < 1e-4);
    assert_eq!(agent.last_lane_change_at, 77);
    assert_eq!(agent.position.x, 350.0);
    assert!(!agent.is_changing_lane());

    let next = place(&mut spawner, &highway, &ctx, 1, -2000.0);
    assert_ne!(agent.id, next.id);
}

#[test]
fn test_update_waits_for_cooldown() {
    let highway = Highway::straight(RoadSegment::uniform(4, 100.0, 0).unwrap());
    let player = player_in_home_lane();
    let speed = SpeedConfig::default();
    let ctx = context(&highway, &player, &speed);
    let config = SpawnerConfig {
        interval_ticks: 30,
        interval_jitter: 0,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(config, Some(3));
    let mut agents = Vec::new();

    let first = spawner.update(&mut agents, &ctx);
    assert!(!first.spawned.is_empty());
    assert_eq!(agents.len(), first.spawned.len());

    for _ in 0..30 {
        let idle = spawner.update(&mut agents, &ctx);
        assert!(idle.spawned.is_empty());
        assert_eq!(idle.rejected, 0);
    }

    // Three lanes, two directions
    let evaluated = spawner.update(&mut agents, &ctx);
    assert_eq!(evaluated.spawned.len() + evaluated.rejected, 6);
}

#[test]
fn test_initial_population_respects_rules() {
    let highway = Highway::straight(RoadSegment::uniform(5, 100.0, 0).unwrap());
    let player = player_in_home_lane();
    let speed = SpeedConfig::default();
    let ctx = context(&highway, &player, &speed);
    let config = SpawnerConfig::default();
    let mut spawner = Spawner::new(config.clone(), Some(11));
    let mut agents = Vec::new();

    let segment = highway.segments().first().unwrap();
    let outcome = spawner.spawn_initial(&mut agents, segment, &ctx);
    assert!(!outcome.spawned.is_empty());
    assert!(agents.len() <= config.max_agents);

    for (i, a) in agents.iter().enumerate() {
        assert!(a.lane >= 1);
        let offset = (a.position.y - player.position.y).abs();
        assert!(offset >= config.dead_zone && offset <= config.spawn_range);
        for b in &agents[i + 1..] {
            if a.lane == b.lane {
                assert!((a.position.y - b.position.y).abs() >= spawner.min_spacing(a.lane));
            }
        }
    }
}

#[test]
fn test_disabled_spawner_is_inert() {
    let highway = Highway::straight(RoadSegment::uniform(4, 100.0, 0).unwrap());
    let player = player_in_home_lane();
    let speed = SpeedConfig::default();
    let ctx = context(&highway, &player, &speed);
    let config = SpawnerConfig {
        enabled: false,
        ..SpawnerConfig::default()
    };
    let mut spawner = Spawner::new(config, None);
    let mut agents = Vec::new();

    let segment = highway.segments().first().unwrap();
    assert!(spawner.spawn_initial(&mut agents, segment, &ctx).spawned.is_empty());
    assert!(spawner.update(&mut agents, &ctx).spawned.is_empty());
    assert!(agents.is_empty());
}
