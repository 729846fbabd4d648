//! Narrow-phase collision tests between sensor zones and vehicle bodies
//!
//! Uses the Separating Axis Theorem on convex quads. Both quads contribute
//! their four edge normals, eight candidate axes in total.

use super::config::SimConfig;
use super::sensor::{Point2, Quad, SensorPresetKind};
use super::types::{HitZone, VehicleId};
use super::vehicle_table::VehicleTable;

/// Zones in the order they are tested, most severe first
const ZONE_ORDER: [HitZone; 3] = [HitZone::Stop, HitZone::Brake, HitZone::Approach];

fn project(quad: &Quad, axis_x: f32, axis_y: f32) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for corner in quad {
        let dot = corner.x * axis_x + corner.y * axis_y;
        lo = lo.min(dot);
        hi = hi.max(dot);
    }
    (lo, hi)
}

/// True if the interiors of two convex quads overlap.
/// Touching along an edge or at a corner is not an overlap.
pub fn quads_overlap(a: &Quad, b: &Quad) -> bool {
    for quad in [a, b] {
        for i in 0..4 {
            let j = (i + 1) % 4;
            let edge_x = quad[j].x - quad[i].x;
            let edge_y = quad[j].y - quad[i].y;
            if edge_x == 0.0 && edge_y == 0.0 {
                continue;
            }
            let (axis_x, axis_y) = (-edge_y, edge_x);
            let (min_a, max_a) = project(a, axis_x, axis_y);
            let (min_b, max_b) = project(b, axis_x, axis_y);
            if max_a <= min_b || max_b <= min_a {
                return false;
            }
        }
    }
    true
}

/// Most severe zone of `observer` that overlaps the body of `target`
pub fn test_zones(table: &VehicleTable, observer: VehicleId, target: VehicleId) -> HitZone {
    if observer == target {
        return HitZone::None;
    }
    let observer_quads = table.sensors(observer);
    let target_body = &table.sensors(target).body;
    for zone in ZONE_ORDER {
        if let Some(quad) = observer_quads.zone(zone) {
            if quads_overlap(quad, target_body) {
                return zone;
            }
        }
    }
    HitZone::None
}

/// Cheap pre-filter: true when the pose origins of the two vehicles are more
/// than `threshold` apart, so the SAT test can be skipped
pub fn rough_reject(table: &VehicleTable, a: VehicleId, b: VehicleId, threshold: f32) -> bool {
    let pa = table.position(a);
    let pb = table.position(b);
    let pa = Point2::new(pa.x, pa.y);
    let pb = Point2::new(pb.x, pb.y);
    pa.distance(&pb) > threshold
}

/// Distance beyond which no zone of any preset can touch another body.
///
/// Sum of the farthest zone corner from an observer's origin and the
/// farthest body corner from a target's origin.
pub fn conservative_threshold(config: &SimConfig) -> f32 {
    let reach = [
        SensorPresetKind::Straight,
        SensorPresetKind::CurveLeft,
        SensorPresetKind::CurveRight,
    ]
    .iter()
    .map(|kind| {
        kind.preset()
            .reach_radius(config.vehicle_length, config.vehicle_width)
    })
    .fold(0.0f32, f32::max);
    let half_l = config.vehicle_length * 0.5;
    let half_w = config.vehicle_width * 0.5;
    let body = (half_l * half_l + half_w * half_w).sqrt();
    reach + body + 1e-3
}
