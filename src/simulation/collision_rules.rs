//! Per-tick hazard pass
//!
//! Walks every occupied edge and classifies, for each vehicle, the most
//! severe sensor zone violated this tick. The checks only accumulate zones
//! into scratch buffers; a single apply pass at the end turns zones into
//! speed and status changes. Classification depends on positions alone, so
//! running the pass twice without moving anything gives the same result.

use log::debug;

use super::collision::{conservative_threshold, rough_reject, test_zones};
use super::config::SimConfig;
use super::edge_graph::{EdgeGraph, EdgeShape};
use super::merge_lock::MergeLocks;
use super::occupancy::EdgeOccupancy;
use super::route_planner::RoutePlanner;
use super::stats::TickStats;
use super::types::{
    EdgeId, HitZone, MovingStatus, Position, StopReason, TrafficState, VehicleId,
};
use super::vehicle_table::VehicleTable;

/// Read-only state the rules consult
pub struct RuleInputs<'a> {
    pub graph: &'a EdgeGraph,
    pub planner: &'a RoutePlanner,
    pub occupancy: &'a EdgeOccupancy,
    pub config: &'a SimConfig,
}

pub struct CollisionRules {
    tick_zone: Vec<HitZone>,
    tick_reason: Vec<StopReason>,
    tick_traffic: Vec<TrafficState>,
    reject_threshold: f32,
}

/// Signed distance from `back` to `front` along a heading in degrees
fn axis_gap(axis: f32, back: &Position, front: &Position) -> f32 {
    let (sin, cos) = axis.to_radians().sin_cos();
    (front.x - back.x) * cos + (front.y - back.y) * sin
}

impl CollisionRules {
    pub fn new(vehicle_count: usize, config: &SimConfig) -> Self {
        Self {
            tick_zone: vec![HitZone::None; vehicle_count],
            tick_reason: vec![StopReason::NONE; vehicle_count],
            tick_traffic: vec![TrafficState::Free; vehicle_count],
            reject_threshold: conservative_threshold(config),
        }
    }

    /// Classify every vehicle and apply the resulting actions
    pub fn run(
        &mut self,
        inputs: &RuleInputs<'_>,
        table: &mut VehicleTable,
        locks: &mut MergeLocks,
    ) -> TickStats {
        self.tick_zone.fill(HitZone::None);
        self.tick_reason.fill(StopReason::NONE);
        self.tick_traffic.fill(TrafficState::Free);

        // Only the lead of an edge into the node may stay in line for it
        locks.retain_waiting(|node, vehicle| {
            let edge = table.current_edge(vehicle);
            inputs.occupancy.lead(edge) == Some(vehicle)
                && inputs
                    .graph
                    .get_edge(edge)
                    .is_some_and(|edge| edge.to_node == node)
        });

        for index in 0..inputs.graph.len() {
            let edge = EdgeId(index);
            if inputs.occupancy.is_empty(edge) {
                continue;
            }
            self.check_lead(inputs, table, locks, edge);
            self.check_following(inputs, table, edge);
            if inputs.graph.edge(edge).to_node_is_merge {
                self.check_merge_danger_zone(inputs, table, locks, edge);
            }
        }

        self.apply(table)
    }

    /// Record `zone` for a vehicle if it is more severe than what it already has
    fn raise(&mut self, vehicle: VehicleId, zone: HitZone, reason: StopReason) {
        let slot = &mut self.tick_zone[vehicle.0];
        if zone > *slot {
            *slot = zone;
        }
        if zone == HitZone::Stop {
            self.tick_reason[vehicle.0] |= reason;
        }
    }

    /// Zone test through the distance pre-filter
    fn sensor_zone(&self, table: &VehicleTable, observer: VehicleId, target: VehicleId) -> HitZone {
        if rough_reject(table, observer, target, self.reject_threshold) {
            HitZone::None
        } else {
            test_zones(table, observer, target)
        }
    }

    fn check_lead(
        &mut self,
        inputs: &RuleInputs<'_>,
        table: &VehicleTable,
        locks: &mut MergeLocks,
        edge: EdgeId,
    ) {
        let Some(lead) = inputs.occupancy.lead(edge) else {
            return;
        };
        if table.moving_status(lead) == MovingStatus::Paused {
            return;
        }
        let graph = inputs.graph;
        let current = graph.edge(edge);
        let config = inputs.config;

        let in_danger_zone = current.to_node_is_merge
            && current.distance_to_end(table.edge_ratio(lead)) <= config.danger_zone_length();
        let holds_lock = if in_danger_zone {
            let state = locks.request(current.to_node, lead);
            self.tick_traffic[lead.0] = state;
            state == TrafficState::Acquired
        } else {
            false
        };

        // Dead ends are parked by the motion pass
        if let Some(target) = inputs.planner.peek_next_edge(graph, edge, lead) {
            // Parked at the end until the next edge has room again
            if table.edge_ratio(lead) >= 1.0
                && target != edge
                && inputs.occupancy.len(target) >= inputs.occupancy.capacity()
            {
                self.raise(lead, HitZone::Stop, StopReason::EDGE_FULL);
            }
            let obstacle = if target == edge {
                None
            } else {
                inputs.occupancy.tail(target).filter(|other| *other != lead)
            };
            if let Some(obstacle) = obstacle {
                let target_edge = graph.edge(target);
                let zone = match current.axis() {
                    Some(axis) if current.shares_axis_with(target_edge) => {
                        let gap = axis_gap(axis, &table.position(lead), &table.position(obstacle));
                        table
                            .sensor_preset(lead)
                            .preset()
                            .classify_gap(gap, config.vehicle_length)
                    }
                    _ => self.sensor_zone(table, lead, obstacle),
                };
                self.raise(lead, zone, StopReason::OBS_LIDAR);
            }
        }

        // Someone else owns the merge; wait at the danger zone until it is
        // released
        if in_danger_zone && !holds_lock {
            self.raise(lead, HitZone::Stop, StopReason::WAITING_FOR_LOCK);
        }
    }

    fn check_following(&mut self, inputs: &RuleInputs<'_>, table: &VehicleTable, edge: EdgeId) {
        let current = inputs.graph.edge(edge);
        let vehicle_length = inputs.config.vehicle_length;

        for pair in inputs.occupancy.vehicles(edge).windows(2) {
            let (front, back) = (pair[0], pair[1]);
            let gap = match &current.shape {
                EdgeShape::Linear { axis, .. } => {
                    axis_gap(*axis, &table.position(back), &table.position(front))
                }
                EdgeShape::Curve { .. } => {
                    (table.edge_ratio(front) - table.edge_ratio(back)) * current.length
                }
            };
            let zone = table
                .sensor_preset(back)
                .preset()
                .classify_gap(gap, vehicle_length);
            self.raise(back, zone, StopReason::OBS_LIDAR);
        }
    }

    fn check_merge_danger_zone(
        &mut self,
        inputs: &RuleInputs<'_>,
        table: &VehicleTable,
        locks: &MergeLocks,
        edge: EdgeId,
    ) {
        let graph = inputs.graph;
        let current = graph.edge(edge);
        let merge_node = current.to_node;
        let danger = inputs.config.danger_zone_length();

        for vehicle in inputs.occupancy.vehicles(edge) {
            // Queue is ordered by ratio, so everyone after this is further out
            if current.distance_to_end(table.edge_ratio(*vehicle)) > danger {
                break;
            }
            if locks.is_held_by(merge_node, *vehicle) {
                continue;
            }
            let mut worst = HitZone::None;
            for competitor in graph.edges_into(merge_node) {
                if *competitor == edge {
                    continue;
                }
                if let Some(other) = inputs.occupancy.lead(*competitor) {
                    worst = worst.max(self.sensor_zone(table, *vehicle, other));
                }
            }
            self.raise(*vehicle, worst, StopReason::OBS_LIDAR);
        }
    }

    /// Turn the accumulated zones into speed and status changes
    fn apply(&mut self, table: &mut VehicleTable) -> TickStats {
        let mut stats = TickStats::default();

        for vehicle in 0..table.len() {
            let id = VehicleId(vehicle);
            let status = table.moving_status(id);
            if status == MovingStatus::Paused {
                continue;
            }
            let zone = self.tick_zone[vehicle];
            table.set_hit_zone(id, zone);
            table.set_traffic_state(id, self.tick_traffic[vehicle]);

            let was_stopped = status == MovingStatus::Stopped;
            let mut reason = table.stop_reason(id).without(StopReason::RULE_OWNED);

            match zone {
                HitZone::Stop => {
                    reason |= self.tick_reason[vehicle];
                    table.set_stop_reason(id, reason);
                    table.halt(id, StopReason::NONE);
                    if !was_stopped {
                        stats.collisions += 1;
                        debug!("Vehicle {:?} stopped ({:?})", id, reason);
                    }
                    continue;
                }
                HitZone::Brake | HitZone::Approach => {
                    let preset = table.sensor_preset(id).preset();
                    let deceleration = preset
                        .zone(zone)
                        .filter(|sensor_zone| table.velocity(id) > sensor_zone.min_speed)
                        .and_then(|sensor_zone| sensor_zone.deceleration())
                        .unwrap_or(0.0);
                    table.set_deceleration(id, deceleration);
                }
                HitZone::None => table.set_deceleration(id, 0.0),
            }

            table.set_stop_reason(id, reason);
            if was_stopped && reason.is_empty() {
                table.set_moving_status(id, MovingStatus::Moving);
                stats.resumes += 1;
                debug!("Vehicle {:?} resumed ({:?})", id, zone);
            }
        }

        stats
    }
}
