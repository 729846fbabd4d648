//! Structure-of-Arrays storage for every vehicle in the simulation
//!
//! Floats live in one contiguous buffer with a fixed stride per vehicle;
//! enum-valued fields live in their own integer-backed columns. Every column
//! is allocated once in [`VehicleTable::new`], so reads and writes during a
//! tick are plain index arithmetic.

use super::config::SimConfig;
use super::sensor::{derive_sensor_geometry, SensorPresetKind, SensorQuads};
use super::types::{
    EdgeId, HitZone, MovingStatus, Position, StopReason, TrafficState, VehicleId,
};

/// Float fields packed per vehicle, in buffer order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum MovementField {
    X = 0,
    Y = 1,
    Z = 2,
    Rotation = 3,
    Velocity = 4,
    Acceleration = 5,
    Deceleration = 6,
    EdgeRatio = 7,
}

pub const MOVEMENT_STRIDE: usize = 8;

/// Copy of one vehicle's fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleRecord {
    pub id: VehicleId,
    pub position: Position,
    pub rotation: f32,
    pub velocity: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    pub current_edge: EdgeId,
    pub edge_ratio: f32,
    pub moving_status: MovingStatus,
    pub sensor_preset: SensorPresetKind,
    pub hit_zone: HitZone,
    pub stop_reason: StopReason,
    pub traffic_state: TrafficState,
}

pub struct VehicleTable {
    movement: Vec<f32>,
    current_edge: Vec<EdgeId>,
    moving_status: Vec<MovingStatus>,
    sensor_preset: Vec<SensorPresetKind>,
    hit_zone: Vec<HitZone>,
    stop_reason: Vec<StopReason>,
    traffic_state: Vec<TrafficState>,
    sensors: Vec<SensorQuads>,
}

impl VehicleTable {
    /// Allocate storage for `count` vehicles. They start stopped and
    /// uninitialised until placed on an edge.
    pub fn new(count: usize) -> Self {
        Self {
            movement: vec![0.0; count * MOVEMENT_STRIDE],
            current_edge: vec![EdgeId(0); count],
            moving_status: vec![MovingStatus::Stopped; count],
            sensor_preset: vec![SensorPresetKind::Straight; count],
            hit_zone: vec![HitZone::None; count],
            stop_reason: vec![StopReason::NOT_INITIALIZED; count],
            traffic_state: vec![TrafficState::Free; count],
            sensors: vec![SensorQuads::default(); count],
        }
    }

    pub fn len(&self) -> usize {
        self.current_edge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_edge.is_empty()
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        id.0 < self.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = VehicleId> {
        (0..self.len()).map(VehicleId)
    }

    #[inline]
    pub fn field(&self, id: VehicleId, field: MovementField) -> f32 {
        self.movement[id.0 * MOVEMENT_STRIDE + field as usize]
    }

    #[inline]
    pub fn set_field(&mut self, id: VehicleId, field: MovementField, value: f32) {
        self.movement[id.0 * MOVEMENT_STRIDE + field as usize] = value;
    }

    pub fn get(&self, id: VehicleId) -> VehicleRecord {
        VehicleRecord {
            id,
            position: self.position(id),
            rotation: self.rotation(id),
            velocity: self.velocity(id),
            acceleration: self.field(id, MovementField::Acceleration),
            deceleration: self.field(id, MovementField::Deceleration),
            current_edge: self.current_edge[id.0],
            edge_ratio: self.edge_ratio(id),
            moving_status: self.moving_status[id.0],
            sensor_preset: self.sensor_preset[id.0],
            hit_zone: self.hit_zone[id.0],
            stop_reason: self.stop_reason[id.0],
            traffic_state: self.traffic_state[id.0],
        }
    }

    pub fn position(&self, id: VehicleId) -> Position {
        let base = id.0 * MOVEMENT_STRIDE;
        Position::new(
            self.movement[base + MovementField::X as usize],
            self.movement[base + MovementField::Y as usize],
            self.movement[base + MovementField::Z as usize],
        )
    }

    pub fn set_pose(&mut self, id: VehicleId, position: Position, rotation: f32) {
        let base = id.0 * MOVEMENT_STRIDE;
        self.movement[base + MovementField::X as usize] = position.x;
        self.movement[base + MovementField::Y as usize] = position.y;
        self.movement[base + MovementField::Z as usize] = position.z;
        self.movement[base + MovementField::Rotation as usize] = rotation;
    }

    pub fn rotation(&self, id: VehicleId) -> f32 {
        self.field(id, MovementField::Rotation)
    }

    pub fn velocity(&self, id: VehicleId) -> f32 {
        self.field(id, MovementField::Velocity)
    }

    pub fn set_velocity(&mut self, id: VehicleId, velocity: f32) {
        self.set_field(id, MovementField::Velocity, velocity);
    }

    pub fn acceleration(&self, id: VehicleId) -> f32 {
        self.field(id, MovementField::Acceleration)
    }

    pub fn deceleration(&self, id: VehicleId) -> f32 {
        self.field(id, MovementField::Deceleration)
    }

    pub fn set_deceleration(&mut self, id: VehicleId, deceleration: f32) {
        self.set_field(id, MovementField::Deceleration, deceleration);
    }

    pub fn edge_ratio(&self, id: VehicleId) -> f32 {
        self.field(id, MovementField::EdgeRatio)
    }

    pub fn set_edge_ratio(&mut self, id: VehicleId, ratio: f32) {
        self.set_field(id, MovementField::EdgeRatio, ratio);
    }

    pub fn current_edge(&self, id: VehicleId) -> EdgeId {
        self.current_edge[id.0]
    }

    pub fn set_current_edge(&mut self, id: VehicleId, edge: EdgeId) {
        self.current_edge[id.0] = edge;
    }

    pub fn moving_status(&self, id: VehicleId) -> MovingStatus {
        self.moving_status[id.0]
    }

    pub fn set_moving_status(&mut self, id: VehicleId, status: MovingStatus) {
        self.moving_status[id.0] = status;
    }

    pub fn sensor_preset(&self, id: VehicleId) -> SensorPresetKind {
        self.sensor_preset[id.0]
    }

    pub fn set_sensor_preset(&mut self, id: VehicleId, preset: SensorPresetKind) {
        self.sensor_preset[id.0] = preset;
    }

    pub fn hit_zone(&self, id: VehicleId) -> HitZone {
        self.hit_zone[id.0]
    }

    pub fn set_hit_zone(&mut self, id: VehicleId, zone: HitZone) {
        self.hit_zone[id.0] = zone;
    }

    pub fn stop_reason(&self, id: VehicleId) -> StopReason {
        self.stop_reason[id.0]
    }

    pub fn set_stop_reason(&mut self, id: VehicleId, reason: StopReason) {
        self.stop_reason[id.0] = reason;
    }

    pub fn traffic_state(&self, id: VehicleId) -> TrafficState {
        self.traffic_state[id.0]
    }

    pub fn set_traffic_state(&mut self, id: VehicleId, state: TrafficState) {
        self.traffic_state[id.0] = state;
    }

    pub fn sensors(&self, id: VehicleId) -> &SensorQuads {
        &self.sensors[id.0]
    }

    /// Force a vehicle to a halt, recording why
    pub fn halt(&mut self, id: VehicleId, reason: StopReason) {
        self.set_velocity(id, 0.0);
        self.set_deceleration(id, 0.0);
        self.moving_status[id.0] = MovingStatus::Stopped;
        self.stop_reason[id.0].insert(reason);
    }

    /// Recompute the zone and body quads from the current pose and preset
    pub fn derive_sensor_geometry(&mut self, id: VehicleId, config: &SimConfig) {
        let quads = derive_sensor_geometry(
            &self.position(id),
            self.rotation(id),
            self.sensor_preset[id.0].preset(),
            config.vehicle_length,
            config.vehicle_width,
        );
        self.sensors[id.0] = quads;
    }

    /// True when any float field of the vehicle is NaN or infinite
    pub fn has_non_finite_state(&self, id: VehicleId) -> bool {
        let base = id.0 * MOVEMENT_STRIDE;
        self.movement[base..base + MOVEMENT_STRIDE]
            .iter()
            .any(|value| !value.is_finite())
    }
}
