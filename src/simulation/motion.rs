//! Per-tick movement pass
//!
//! Advances every moving vehicle: new speed, new progress, edge transitions
//! through the route planner, and finally the world pose and sensor quads.

use log::{error, warn};

use super::config::SimConfig;
use super::edge_graph::{Edge, EdgeGraph, EdgeShape};
use super::merge_lock::MergeLocks;
use super::occupancy::EdgeOccupancy;
use super::route_planner::RoutePlanner;
use super::stats::TickStats;
use super::types::{HitZone, MovingStatus, StopReason, TrafficState, VehicleId};
use super::vehicle_table::{MovementField, VehicleTable};

/// Read-only state the integrator consults
pub struct MotionInputs<'a> {
    pub graph: &'a EdgeGraph,
    pub planner: &'a RoutePlanner,
    pub config: &'a SimConfig,
}

/// Speed after one step of `delta` seconds on `edge`
pub fn next_speed(
    table: &VehicleTable,
    vehicle: VehicleId,
    edge: &Edge,
    config: &SimConfig,
    delta: f32,
) -> f32 {
    let speed = table.velocity(vehicle).max(0.0);
    let acceleration = table.acceleration(vehicle);
    let shape_max = match &edge.shape {
        EdgeShape::Linear { .. } => config.linear_max_speed,
        EdgeShape::Curve { .. } => config.curve_max_speed,
    };

    let hit_zone = table.hit_zone(vehicle);
    if matches!(hit_zone, HitZone::Brake | HitZone::Approach) {
        if let Some(zone) = table.sensor_preset(vehicle).preset().zone(hit_zone) {
            // Brake down to the zone's crawl speed, or creep up to it
            let floor = zone.min_speed.min(shape_max);
            let deceleration = table.deceleration(vehicle);
            return if speed > floor && deceleration > 0.0 {
                (speed - deceleration * delta).max(floor)
            } else if speed > floor {
                speed.min(shape_max)
            } else {
                (speed + acceleration * delta).min(floor)
            };
        }
    }

    match &edge.shape {
        EdgeShape::Curve { .. } if speed > shape_max => {
            (speed - config.curve_deceleration * delta).max(shape_max)
        }
        EdgeShape::Curve { .. } | EdgeShape::Linear { .. } => {
            (speed + acceleration * delta).min(shape_max)
        }
    }
}

/// Advance every vehicle by `delta` seconds. `delta` must already be clamped.
pub fn integrate(
    inputs: &MotionInputs<'_>,
    table: &mut VehicleTable,
    occupancy: &mut EdgeOccupancy,
    locks: &mut MergeLocks,
    delta: f32,
) -> TickStats {
    let mut stats = TickStats::default();

    for vehicle in 0..table.len() {
        let id = VehicleId(vehicle);
        match table.moving_status(id) {
            MovingStatus::Paused => continue,
            MovingStatus::Stopped => {
                table.set_velocity(id, 0.0);
                continue;
            }
            MovingStatus::Moving => {}
        }
        if advance_vehicle(inputs, table, occupancy, locks, id, delta, &mut stats).is_err() {
            quarantine(inputs, table, occupancy, locks, id);
            stats.faults += 1;
        }
    }

    occupancy.sort_all(table);
    stats
}

/// Marker for a vehicle whose state can no longer be trusted
struct VehicleFault;

#[allow(clippy::too_many_arguments)]
fn advance_vehicle(
    inputs: &MotionInputs<'_>,
    table: &mut VehicleTable,
    occupancy: &mut EdgeOccupancy,
    locks: &mut MergeLocks,
    id: VehicleId,
    delta: f32,
    stats: &mut TickStats,
) -> Result<(), VehicleFault> {
    let graph = inputs.graph;
    let config = inputs.config;

    if table.has_non_finite_state(id) {
        return Err(VehicleFault);
    }
    let mut current = table.current_edge(id);
    let edge = graph.get_edge(current).ok_or(VehicleFault)?;

    let speed = next_speed(table, id, edge, config, delta);
    let mut ratio = table.edge_ratio(id) + speed * delta / edge.length;
    let mut parked = None;
    let mut hops = 0;

    while ratio >= 1.0 {
        let leaving = graph.edge(current);
        let overflow = (ratio - 1.0) * leaving.length;

        let Some(next) = inputs.planner.next_edge(graph, current, id) else {
            warn!("Vehicle {:?} reached dead end of edge {}", id, leaving.name);
            parked = Some(StopReason::PATH_BLOCKED);
            break;
        };
        if hops > graph.len() {
            warn!("Vehicle {:?} skipped over too many edges in one tick", id);
            parked = Some(StopReason::PATH_BLOCKED);
            break;
        }

        occupancy.remove(current, id);
        if let Err(err) = occupancy.insert(next, id) {
            error!("Vehicle {:?} cannot enter edge {}: {}", id, graph.edge(next).name, err);
            // Space was just freed on the edge it is leaving. The collision
            // rules clear the hold once the next edge has room.
            let _ = occupancy.insert(current, id);
            parked = Some(StopReason::EDGE_FULL);
            break;
        }
        locks.release(leaving.to_node, id);
        table.set_traffic_state(id, TrafficState::Free);

        let entered = graph.edge(next);
        let preset = entered.rail_type.sensor_preset();
        if preset != table.sensor_preset(id) {
            table.set_sensor_preset(id, preset);
        }
        ratio = overflow / entered.length;
        current = next;
        hops += 1;
        stats.transitions += 1;
    }

    if let Some(reason) = parked {
        ratio = 1.0;
        table.halt(id, reason);
    } else {
        table.set_velocity(id, speed);
    }

    table.set_current_edge(id, current);
    table.set_edge_ratio(id, ratio);

    let (mut position, rotation) = graph.edge(current).pose_at(ratio);
    position.z = config.rail_height;
    if !position.is_finite() || !rotation.is_finite() {
        return Err(VehicleFault);
    }
    table.set_pose(id, position, rotation);
    table.derive_sensor_geometry(id, config);
    Ok(())
}

/// Take a vehicle with broken state out of the simulation: stopped, flagged
/// uninitialised and removed from its queue so it is never an obstacle.
fn quarantine(
    inputs: &MotionInputs<'_>,
    table: &mut VehicleTable,
    occupancy: &mut EdgeOccupancy,
    locks: &mut MergeLocks,
    id: VehicleId,
) {
    let edge = table.current_edge(id);
    error!("Vehicle {:?} has invalid state on edge {:?}; stopping it", id, edge);
    occupancy.remove(edge, id);
    if let Some(edge) = inputs.graph.get_edge(edge) {
        locks.release(edge.to_node, id);
    }
    for field in [
        MovementField::Velocity,
        MovementField::Acceleration,
        MovementField::Deceleration,
        MovementField::EdgeRatio,
    ] {
        table.set_field(id, field, 0.0);
    }
    for field in [
        MovementField::X,
        MovementField::Y,
        MovementField::Z,
        MovementField::Rotation,
    ] {
        if !table.field(id, field).is_finite() {
            table.set_field(id, field, 0.0);
        }
    }
    table.halt(id, StopReason::NOT_INITIALIZED);
    table.set_traffic_state(id, TrafficState::Free);
    table.set_hit_zone(id, HitZone::None);
    table.derive_sensor_geometry(id, inputs.config);
}
