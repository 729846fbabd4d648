//! Core types for the rail vehicle simulation
//!
//! Ids, positions, per-vehicle status enums and the default tuning constants.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Index of a vehicle in the [`VehicleTable`](super::VehicleTable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub usize);

/// Index of an edge in the [`EdgeGraph`](super::EdgeGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

/// Index of a track node in the [`EdgeGraph`](super::EdgeGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// A 3D position in the simulation. `z` is the rail height.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Planar distance, ignoring rail height
    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f32) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    /// Heading from this position to another, in degrees within [0, 360)
    pub fn heading_to(&self, other: &Position) -> f32 {
        normalize_degrees((other.y - self.y).atan2(other.x - self.x).to_degrees())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Wrap an angle in degrees into [0, 360)
pub fn normalize_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Scheduling gate for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MovingStatus {
    Moving = 0,
    /// Frozen: no field changes at all
    Paused = 1,
    #[default]
    Stopped = 2,
}

/// Innermost sensor zone currently violated, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum HitZone {
    #[default]
    None = 0,
    Approach = 1,
    Brake = 2,
    Stop = 3,
}

/// Right-of-way negotiation state at merge nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TrafficState {
    #[default]
    Free = 0,
    Waiting = 1,
    Acquired = 2,
}

/// Bitmask of reasons a vehicle is stopped
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StopReason(u16);

impl StopReason {
    pub const NONE: StopReason = StopReason(0);
    pub const OBS_LIDAR: StopReason = StopReason(1 << 0);
    pub const OBS_CAMERA: StopReason = StopReason(1 << 1);
    pub const E_STOP: StopReason = StopReason(1 << 2);
    pub const WAITING_FOR_LOCK: StopReason = StopReason(1 << 3);
    pub const DESTINATION_REACHED: StopReason = StopReason(1 << 4);
    pub const PATH_BLOCKED: StopReason = StopReason(1 << 5);
    pub const LOAD_ON: StopReason = StopReason(1 << 6);
    pub const LOAD_OFF: StopReason = StopReason(1 << 7);
    pub const NOT_INITIALIZED: StopReason = StopReason(1 << 8);
    /// Held at the end of an edge because the next edge is full
    pub const EDGE_FULL: StopReason = StopReason(1 << 9);

    /// Reasons set and cleared by the collision rules themselves
    pub const RULE_OWNED: StopReason =
        StopReason(Self::OBS_LIDAR.0 | Self::WAITING_FOR_LOCK.0 | Self::EDGE_FULL.0);

    const NAMES: [(StopReason, &'static str); 10] = [
        (Self::OBS_LIDAR, "OBS_LIDAR"),
        (Self::OBS_CAMERA, "OBS_CAMERA"),
        (Self::E_STOP, "E_STOP"),
        (Self::WAITING_FOR_LOCK, "WAITING_FOR_LOCK"),
        (Self::DESTINATION_REACHED, "DESTINATION_REACHED"),
        (Self::PATH_BLOCKED, "PATH_BLOCKED"),
        (Self::LOAD_ON, "LOAD_ON"),
        (Self::LOAD_OFF, "LOAD_OFF"),
        (Self::NOT_INITIALIZED, "NOT_INITIALIZED"),
        (Self::EDGE_FULL, "EDGE_FULL"),
    ];

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: StopReason) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: StopReason) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: StopReason) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: StopReason) {
        self.0 &= !other.0;
    }

    pub fn without(self, other: StopReason) -> StopReason {
        StopReason(self.0 & !other.0)
    }
}

impl BitOr for StopReason {
    type Output = StopReason;

    fn bitor(self, rhs: StopReason) -> StopReason {
        StopReason(self.0 | rhs.0)
    }
}

impl BitOrAssign for StopReason {
    fn bitor_assign(&mut self, rhs: StopReason) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Length of a vehicle body in world units
pub const VEHICLE_LENGTH: f32 = 1.0;

/// Width of a vehicle body in world units
pub const VEHICLE_WIDTH: f32 = 0.6;

/// Constant height of the rail above ground
pub const RAIL_HEIGHT: f32 = 1.0;

/// Cruise speed on linear edges
pub const LINEAR_MAX_SPEED: f32 = 5.0;

/// Speed limit on curve edges
pub const CURVE_MAX_SPEED: f32 = 2.0;

/// Default acceleration rate
pub const ACCELERATION: f32 = 2.0;

/// Rate used to slow down to the curve limit
pub const CURVE_DECELERATION: f32 = 4.0;

/// Largest time step a single tick may integrate
pub const MAX_DELTA: f32 = 1.0 / 30.0;

/// Maximum vehicles tracked on one edge
pub const EDGE_CAPACITY: usize = 500;

/// Extra length at the end of a merging edge treated as the danger zone
pub const CURVE_TAIL_LENGTH: f32 = 1.0;

/// Number of points sampled along a generated curve
pub const CURVE_SAMPLES: usize = 24;
