//! Rail vehicle simulation core
//!
//! Moves a fleet of vehicles along a directed track graph and keeps them from
//! colliding. Everything here is plain data and per-tick passes, so it runs
//! headless and can be driven directly from tests.

mod collision;
mod collision_rules;
mod config;
mod edge_graph;
mod error;
mod merge_lock;
mod motion;
mod occupancy;
mod route_planner;
mod sensor;
mod stats;
mod types;
mod vehicle_table;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use collision::{conservative_threshold, quads_overlap, rough_reject, test_zones};
pub use collision_rules::{CollisionRules, RuleInputs};
pub use config::SimConfig;
#[allow(unused_imports)]
pub use edge_graph::{Edge, EdgeGraph, EdgeShape, EdgeSpec, NodeSpec, RailType, TurnDirection};
pub use error::SimError;
pub use merge_lock::MergeLocks;
#[allow(unused_imports)]
pub use motion::{integrate, next_speed, MotionInputs};
pub use occupancy::EdgeOccupancy;
#[allow(unused_imports)]
pub use route_planner::{
    build_loops, find_loops, LoopPlan, Placement, RouteChoice, RoutePlanner, VehicleLoop,
};
#[allow(unused_imports)]
pub use sensor::{
    derive_sensor_geometry, quad_from_local, Point2, Quad, SensorPreset, SensorPresetKind,
    SensorQuads, SensorZone, ZoneAction, SENSOR_PRESETS,
};
pub use stats::{SimulationStats, TickStats};
#[allow(unused_imports)]
pub use types::{
    normalize_degrees, EdgeId, HitZone, MovingStatus, NodeId, Position, StopReason, TrafficState,
    VehicleId, ACCELERATION, CURVE_DECELERATION, CURVE_MAX_SPEED, CURVE_SAMPLES,
    CURVE_TAIL_LENGTH, EDGE_CAPACITY, LINEAR_MAX_SPEED, MAX_DELTA, RAIL_HEIGHT, VEHICLE_LENGTH,
    VEHICLE_WIDTH,
};
#[allow(unused_imports)]
pub use vehicle_table::{MovementField, VehicleRecord, VehicleTable, MOVEMENT_STRIDE};
pub use world::{RunState, SimWorld, VehicleSnapshot};
