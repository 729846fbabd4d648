//! Movement, transitions and whole-world behaviour

mod common;

use approx::assert_relative_eq;
use rail_sim::simulation::{
    EdgeId, EdgeSpec, MovementField, MovingStatus, NodeSpec, RunState, SimConfig, SimWorld,
    StopReason, TickStats, VehicleId,
};

const DT: f32 = 1.0 / 30.0;

/// Per-vehicle and per-queue invariants that must hold between ticks
fn assert_invariants(world: &SimWorld) {
    let table = world.table();
    for id in table.ids() {
        let ratio = table.edge_ratio(id);
        let parked = table
            .stop_reason(id)
            .intersects(StopReason::PATH_BLOCKED | StopReason::EDGE_FULL);
        assert!(
            (0.0..1.0).contains(&ratio) || (parked && ratio == 1.0),
            "vehicle {:?} has ratio {}",
            id,
            ratio
        );
        if table.moving_status(id) == MovingStatus::Stopped {
            assert_eq!(table.velocity(id), 0.0, "stopped vehicle {:?} is moving", id);
        }
        assert!(!table.has_non_finite_state(id));
    }

    let occupancy = world.occupancy();
    let mut queued = 0;
    for edge in 0..occupancy.edge_count() {
        let queue = occupancy.vehicles(EdgeId(edge));
        queued += queue.len();
        for vehicle in queue {
            assert_eq!(table.current_edge(*vehicle), EdgeId(edge));
        }
        for pair in queue.windows(2) {
            assert!(table.edge_ratio(pair[0]) >= table.edge_ratio(pair[1]));
        }
    }
    let uninitialised = table
        .ids()
        .filter(|id| table.stop_reason(*id).contains(StopReason::NOT_INITIALIZED))
        .count();
    assert_eq!(queued + uninitialised, table.len());
}

#[test]
fn test_speed_sequence_on_short_edge() {
    let mut world = common::square_world(10.0, common::coarse_config(), 1);
    common::place(&mut world, 0, "AB", 0.0);
    let vehicle = VehicleId(0);
    let ab = common::edge(&world, "AB");

    let mut speeds = Vec::new();
    let mut last_ratio = 0.0;
    for _ in 0..2 {
        world.tick(1.0);
        speeds.push(world.table().velocity(vehicle));
        let ratio = world.table().edge_ratio(vehicle);
        assert!(ratio > last_ratio);
        assert_eq!(world.table().current_edge(vehicle), ab);
        last_ratio = ratio;
    }
    assert_relative_eq!(last_ratio, 0.6, epsilon = 1e-5);

    // Third tick runs past the end of the edge
    let stats = world.tick(1.0);
    speeds.push(world.table().velocity(vehicle));
    assert_eq!(speeds, vec![2.0, 4.0, 5.0]);
    assert_eq!(stats.transitions, 1);
    assert_eq!(world.table().current_edge(vehicle), common::edge(&world, "BC"));
    assert_relative_eq!(world.table().edge_ratio(vehicle), 0.1, epsilon = 1e-4);
}

/// Triangle P -> Q -> R -> P with a 10-unit first edge and a 20-unit second
fn triangle_world(config: SimConfig, vehicles: usize) -> SimWorld {
    let nodes = vec![
        NodeSpec::new("P", 0.0, 0.0),
        NodeSpec::new("Q", 10.0, 0.0),
        NodeSpec::new("R", 10.0, 20.0),
    ];
    let edges = vec![
        EdgeSpec::linear("PQ", "P", "Q"),
        EdgeSpec::linear("QR", "Q", "R"),
        EdgeSpec::linear("RP", "R", "P"),
    ];
    SimWorld::from_specs(&nodes, &edges, config, vehicles).unwrap()
}

#[test]
fn test_overflow_carries_into_successor() {
    let mut world = triangle_world(common::coarse_config(), 1);
    let vehicle = VehicleId(0);
    common::place(&mut world, 0, "PQ", 0.9);
    world.table_mut().set_velocity(vehicle, 5.0);

    // 5 units/s for 0.4 s puts the ratio at 1.1 on the 10-unit edge
    let stats = world.tick(0.4);

    assert_eq!(stats.transitions, 1);
    let qr = common::edge(&world, "QR");
    assert_eq!(world.table().current_edge(vehicle), qr);
    assert_relative_eq!(world.table().edge_ratio(vehicle), 0.05, epsilon = 1e-4);
    assert_eq!(world.occupancy().vehicles(qr), &[vehicle]);
    assert!(world.occupancy().is_empty(common::edge(&world, "PQ")));

    let position = world.table().position(vehicle);
    assert_relative_eq!(position.x, 10.0, epsilon = 1e-3);
    assert_relative_eq!(position.y, 1.0, epsilon = 1e-3);
    assert_relative_eq!(position.z, SimConfig::default().rail_height);
    assert_relative_eq!(world.table().rotation(vehicle), 90.0, epsilon = 1e-3);
}

#[test]
fn test_dead_end_parks_vehicle() {
    let (mut nodes, mut edges) = common::square_loop(100.0);
    nodes.push(NodeSpec::new("S", 140.0, 0.0));
    edges.push(EdgeSpec::linear("BS", "B", "S"));
    let mut world = SimWorld::from_specs(&nodes, &edges, common::coarse_config(), 1).unwrap();
    let vehicle = VehicleId(0);

    common::place(&mut world, 0, "BS", 0.9);
    world.table_mut().set_velocity(vehicle, 5.0);
    let stats = world.tick(1.0);

    assert_eq!(stats.transitions, 0);
    let table = world.table();
    assert_eq!(table.current_edge(vehicle), common::edge(&world, "BS"));
    assert_eq!(table.edge_ratio(vehicle), 1.0);
    assert_eq!(table.moving_status(vehicle), MovingStatus::Stopped);
    assert!(table.stop_reason(vehicle).contains(StopReason::PATH_BLOCKED));
    assert_eq!(table.velocity(vehicle), 0.0);
    assert_relative_eq!(table.position(vehicle).x, 140.0, epsilon = 1e-3);

    // Stays parked
    world.tick(1.0);
    assert_eq!(world.table().edge_ratio(vehicle), 1.0);
    assert_invariants(&world);
}

#[test]
fn test_full_edge_holds_vehicle_until_room() {
    let config = SimConfig {
        edge_capacity: 1,
        ..common::coarse_config()
    };
    let mut world = triangle_world(config, 2);
    let (ahead, behind) = (VehicleId(0), VehicleId(1));
    common::place(&mut world, 1, "PQ", 0.9);
    common::place(&mut world, 0, "QR", 0.5);
    world.stop_vehicle(ahead, StopReason::LOAD_ON).unwrap();
    world.table_mut().set_velocity(behind, 5.0);

    let pq = common::edge(&world, "PQ");
    let qr = common::edge(&world, "QR");
    let stats = world.tick(0.4);
    assert_eq!(stats.transitions, 0);

    // Held at the end of its edge while the next one is full
    for _ in 0..3 {
        let table = world.table();
        assert_eq!(table.current_edge(behind), pq);
        assert_eq!(table.edge_ratio(behind), 1.0);
        assert_eq!(table.moving_status(behind), MovingStatus::Stopped);
        assert!(table.stop_reason(behind).contains(StopReason::EDGE_FULL));
        assert!(!table.stop_reason(behind).contains(StopReason::PATH_BLOCKED));
        assert_eq!(world.occupancy().vehicles(pq), &[behind]);
        assert_invariants(&world);
        world.tick(0.4);
    }

    world.release_vehicle(ahead, StopReason::LOAD_ON).unwrap();
    for _ in 0..300 {
        world.tick(0.1);
        assert_invariants(&world);
        if world.table().current_edge(behind) != pq {
            break;
        }
    }

    let table = world.table();
    assert_eq!(table.current_edge(behind), qr);
    assert_eq!(table.moving_status(behind), MovingStatus::Moving);
    assert!(table.stop_reason(behind).is_empty());
}

#[test]
fn test_every_vehicle_keeps_moving_through_the_merge() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 40).unwrap();
    let mut edges: Vec<EdgeId> = world
        .table()
        .ids()
        .map(|id| world.table().current_edge(id))
        .collect();
    let mut last_change = vec![0.0f32; edges.len()];
    let mut longest_wait = vec![0.0f32; edges.len()];

    for _ in 0..10_800 {
        world.tick(DT);
        for id in world.table().ids() {
            let edge = world.table().current_edge(id);
            if edge != edges[id.0] {
                edges[id.0] = edge;
                longest_wait[id.0] = longest_wait[id.0].max(world.time - last_change[id.0]);
                last_change[id.0] = world.time;
            }
        }
    }

    for (vehicle, wait) in longest_wait.iter().enumerate() {
        let wait = wait.max(world.time - last_change[vehicle]);
        assert!(
            wait < 120.0,
            "vehicle {} stayed on {} for {:.1}s",
            vehicle,
            world.graph().edge(edges[vehicle]).name,
            wait
        );
    }
    assert_eq!(world.stats.total_faults, 0);
}

#[test]
fn test_curve_slows_fast_vehicle() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 1).unwrap();
    let vehicle = VehicleId(0);
    common::place(&mut world, 0, "E01", 0.0);
    world.table_mut().set_velocity(vehicle, 5.0);

    world.integrate_motion(DT);
    let config = SimConfig::default();
    assert_relative_eq!(
        world.table().velocity(vehicle),
        5.0 - config.curve_deceleration * DT,
        epsilon = 1e-4
    );

    for _ in 0..60 {
        world.integrate_motion(DT);
    }
    let velocity = world.table().velocity(vehicle);
    assert!(velocity <= config.curve_max_speed + 1e-4);
}

#[test]
fn test_delta_is_clamped() {
    let mut world = common::square_world(100.0, SimConfig::default(), 1);
    common::place(&mut world, 0, "AB", 0.0);
    world.table_mut().set_velocity(VehicleId(0), 5.0);

    world.tick(10.0);
    assert_relative_eq!(world.time, SimConfig::default().max_delta);
    let travelled = world.table().edge_ratio(VehicleId(0)) * 100.0;
    assert!(travelled <= 5.0 * SimConfig::default().max_delta + 1e-4);

    let before = world.time;
    world.tick(f32::NAN);
    world.tick(-1.0);
    assert_eq!(world.time, before);
}

#[test]
fn test_paused_vehicle_is_frozen() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 24).unwrap();
    for _ in 0..30 {
        world.tick(DT);
    }
    let vehicle = VehicleId(3);
    world.pause_vehicle(vehicle).unwrap();
    let frozen = world.snapshot(vehicle).unwrap();

    for _ in 0..60 {
        world.tick(DT);
    }
    assert_eq!(world.snapshot(vehicle).unwrap(), frozen);

    world.resume_vehicle(vehicle).unwrap();
    assert_ne!(world.table().moving_status(vehicle), MovingStatus::Paused);
}

#[test]
fn test_external_stop_and_release() {
    let mut world = common::square_world(100.0, SimConfig::default(), 1);
    let vehicle = VehicleId(0);
    common::place(&mut world, 0, "AB", 0.1);
    for _ in 0..30 {
        world.tick(DT);
    }
    assert!(world.table().velocity(vehicle) > 0.0);

    world.stop_vehicle(vehicle, StopReason::LOAD_ON).unwrap();
    let held = world.table().edge_ratio(vehicle);
    for _ in 0..30 {
        world.tick(DT);
    }
    let table = world.table();
    assert_eq!(table.moving_status(vehicle), MovingStatus::Stopped);
    assert_eq!(table.velocity(vehicle), 0.0);
    assert_eq!(table.edge_ratio(vehicle), held);
    assert!(table.stop_reason(vehicle).contains(StopReason::LOAD_ON));

    world.release_vehicle(vehicle, StopReason::LOAD_ON).unwrap();
    assert_eq!(world.table().moving_status(vehicle), MovingStatus::Moving);
    world.tick(DT);
    assert!(world.table().edge_ratio(vehicle) > held);

    assert!(world.stop_vehicle(VehicleId(5), StopReason::E_STOP).is_err());
}

#[test]
fn test_run_state_stop_and_resume() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 24).unwrap();
    for _ in 0..60 {
        world.tick(DT);
    }

    world.set_run_state(RunState::Stopped);
    world.tick(DT);
    for snapshot in world.snapshots() {
        assert_eq!(snapshot.moving_status, MovingStatus::Stopped);
        assert_eq!(snapshot.velocity, 0.0);
        assert!(snapshot.stop_reason.contains(StopReason::E_STOP));
    }

    world.set_run_state(RunState::Running);
    let transitions = world.stats.total_transitions;
    for _ in 0..300 {
        world.tick(DT);
    }
    assert!(world.stats.total_transitions > transitions);
    assert!(world.snapshots().any(|s| s.velocity > 0.0));
    assert!(world
        .snapshots()
        .all(|s| !s.stop_reason.contains(StopReason::E_STOP)));
}

#[test]
fn test_run_state_pause_freezes_world() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 24).unwrap();
    for _ in 0..30 {
        world.tick(DT);
    }
    world.set_run_state(RunState::Paused);
    let before: Vec<_> = world.snapshots().collect();
    let time = world.time;

    assert_eq!(world.tick(DT), TickStats::default());
    assert_eq!(world.time, time);
    assert_eq!(world.snapshots().collect::<Vec<_>>(), before);

    world.set_run_state(RunState::Running);
    world.tick(DT);
    assert!(world.time > time);
}

#[test]
fn test_system_stop_keeps_paused_vehicles_paused() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 24).unwrap();
    for _ in 0..30 {
        world.tick(DT);
    }
    let paused = VehicleId(3);
    world.pause_vehicle(paused).unwrap();

    world.set_run_state(RunState::Stopped);
    assert_eq!(world.table().moving_status(paused), MovingStatus::Paused);
    assert!(world.table().stop_reason(paused).contains(StopReason::E_STOP));
    assert_eq!(world.table().moving_status(VehicleId(4)), MovingStatus::Stopped);

    // Resuming during a system stop still leaves it held
    world.resume_vehicle(paused).unwrap();
    assert_eq!(world.table().moving_status(paused), MovingStatus::Stopped);
    world.pause_vehicle(paused).unwrap();

    world.set_run_state(RunState::Running);
    assert_eq!(world.table().moving_status(paused), MovingStatus::Paused);
    assert!(!world.table().stop_reason(paused).contains(StopReason::E_STOP));
}

#[test]
fn test_invariants_hold_over_long_run() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 24).unwrap();
    assert_invariants(&world);

    for _ in 0..3000 {
        world.tick(DT);
        assert_invariants(&world);
    }

    assert_eq!(world.stats.ticks, 3000);
    assert_eq!(world.stats.total_faults, 0);
    assert!(world.stats.total_transitions > 24);
}

#[test]
fn test_seeded_world_invariants() {
    let mut world = SimWorld::create_test_world_with_seed(SimConfig::default(), 40, 99).unwrap();
    for _ in 0..1500 {
        world.tick(DT);
        assert_invariants(&world);
    }
    assert!(world.stats.total_transitions > 0);
}

#[test]
fn test_invalid_state_is_quarantined() {
    let mut world = common::square_world(100.0, SimConfig::default(), 2);
    for _ in 0..30 {
        world.tick(DT);
    }
    let broken = VehicleId(0);
    let healthy = VehicleId(1);
    world
        .table_mut()
        .set_field(broken, MovementField::Acceleration, f32::NAN);

    let stats = world.tick(DT);
    assert_eq!(stats.faults, 1);

    let table = world.table();
    assert_eq!(table.moving_status(broken), MovingStatus::Stopped);
    assert!(table.stop_reason(broken).contains(StopReason::NOT_INITIALIZED));
    let edge = table.current_edge(broken);
    assert!(!world.occupancy().vehicles(edge).contains(&broken));
    assert_invariants(&world);

    let ratio = world.table().edge_ratio(healthy);
    for _ in 0..30 {
        world.tick(DT);
        assert_invariants(&world);
    }
    assert_eq!(world.stats.total_faults, 1);
    assert_eq!(world.table().moving_status(healthy), MovingStatus::Moving);
    assert!(world.table().edge_ratio(healthy) != ratio);
}

#[test]
fn test_reset_restores_initial_placement() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 24).unwrap();
    let initial: Vec<_> = world.snapshots().collect();

    for _ in 0..120 {
        world.tick(DT);
    }
    assert_ne!(world.snapshots().collect::<Vec<_>>(), initial);

    world.reset().unwrap();
    assert_eq!(world.snapshots().collect::<Vec<_>>(), initial);
    assert_eq!(world.time, 0.0);
    assert_eq!(world.stats.ticks, 0);
}

#[test]
fn test_reset_restores_initial_loops() {
    let mut world = SimWorld::create_test_world(SimConfig::default(), 24).unwrap();
    let e00 = common::edge(&world, "E00");
    let b00 = common::edge(&world, "B00");
    let vehicle = world
        .table()
        .ids()
        .find(|id| world.table().current_edge(*id) == e00)
        .expect("demo placement puts vehicles on E00");
    assert!(world.planner().loop_contains(vehicle, e00));

    // Only the outer loop runs through E00
    world.place_vehicle(vehicle, b00, 0.5).unwrap();
    assert!(!world.planner().loop_contains(vehicle, e00));

    world.reset().unwrap();
    assert_eq!(world.table().current_edge(vehicle), e00);
    assert!(world.planner().loop_contains(vehicle, e00));
}
