//! Simulation tunables

use super::sensor::{SensorPresetKind, SENSOR_PRESETS};
use super::types::{
    ACCELERATION, CURVE_DECELERATION, CURVE_MAX_SPEED, CURVE_SAMPLES, CURVE_TAIL_LENGTH,
    EDGE_CAPACITY, LINEAR_MAX_SPEED, MAX_DELTA, RAIL_HEIGHT, VEHICLE_LENGTH, VEHICLE_WIDTH,
};

/// Configuration shared by every pass of the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Cruise speed on linear edges
    pub linear_max_speed: f32,
    /// Speed limit on curve edges
    pub curve_max_speed: f32,
    /// Acceleration rate given to newly placed vehicles
    pub acceleration: f32,
    /// Rate used to slow down to the curve limit
    pub curve_deceleration: f32,
    /// Largest time step a single tick may integrate
    pub max_delta: f32,
    pub vehicle_length: f32,
    pub vehicle_width: f32,
    pub rail_height: f32,
    /// Maximum vehicles tracked on one edge
    pub edge_capacity: usize,
    /// Tail length added to the merge danger zone
    pub curve_tail_length: f32,
    /// Points sampled along a curve that has no explicit geometry
    pub curve_samples: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            linear_max_speed: LINEAR_MAX_SPEED,
            curve_max_speed: CURVE_MAX_SPEED,
            acceleration: ACCELERATION,
            curve_deceleration: CURVE_DECELERATION,
            max_delta: MAX_DELTA,
            vehicle_length: VEHICLE_LENGTH,
            vehicle_width: VEHICLE_WIDTH,
            rail_height: RAIL_HEIGHT,
            edge_capacity: EDGE_CAPACITY,
            curve_tail_length: CURVE_TAIL_LENGTH,
            curve_samples: CURVE_SAMPLES,
        }
    }
}

impl SimConfig {
    /// Length before a merge point in which cross traffic is checked
    pub fn danger_zone_length(&self) -> f32 {
        self.curve_tail_length + 2.0 * self.vehicle_length
    }

    /// Spacing used for initial placement, so that no vehicle starts inside
    /// another's approach zone
    pub fn min_spacing(&self) -> f32 {
        let approach = SENSOR_PRESETS[SensorPresetKind::Straight as usize]
            .approach
            .forward_reach();
        approach + 1.5 * self.vehicle_length
    }

    /// Clamp a frame time into a step the integrator accepts
    pub fn clamp_delta(&self, delta: f32) -> f32 {
        if delta.is_finite() {
            delta.clamp(0.0, self.max_delta)
        } else {
            0.0
        }
    }
}
