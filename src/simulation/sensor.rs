//! Sensor presets and the per-vehicle zone geometry derived from them
//!
//! Every vehicle carries three nested forward-facing zones (stop inside brake
//! inside approach) plus its body footprint. All four are quads in world
//! space, recomputed whenever the pose or the preset changes.

use super::types::{HitZone, Position};

/// A point on the ground plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Four corners of a convex quad
pub type Quad = [Point2; 4];

/// What a vehicle does when a zone is violated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneAction {
    /// Brake with the given rate
    Decelerate(f32),
    /// Halt immediately
    Stop,
}

/// One detection zone of a preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorZone {
    /// Forward reach past the body front on the left side
    pub left_length: f32,
    /// Forward reach past the body front on the right side
    pub right_length: f32,
    pub action: ZoneAction,
    /// Crawl speed the zone never brakes below
    pub min_speed: f32,
}

impl SensorZone {
    const fn new(left_length: f32, right_length: f32, action: ZoneAction, min_speed: f32) -> Self {
        Self {
            left_length,
            right_length,
            action,
            min_speed,
        }
    }

    pub fn forward_reach(&self) -> f32 {
        self.left_length.max(self.right_length)
    }

    /// Deceleration rate applied while this zone is violated, if any
    pub fn deceleration(&self) -> Option<f32> {
        match self.action {
            ZoneAction::Decelerate(rate) => Some(rate),
            ZoneAction::Stop => None,
        }
    }
}

/// Zone geometry for one driving situation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPreset {
    pub approach: SensorZone,
    pub brake: SensorZone,
    pub stop: SensorZone,
    /// Sideways offset of the zone front corners, positive to the left
    pub lateral_shift: f32,
}

impl SensorPreset {
    pub fn zone(&self, zone: HitZone) -> Option<&SensorZone> {
        match zone {
            HitZone::None => None,
            HitZone::Approach => Some(&self.approach),
            HitZone::Brake => Some(&self.brake),
            HitZone::Stop => Some(&self.stop),
        }
    }

    /// Classify a centre-to-centre gap to the vehicle ahead.
    ///
    /// A zone is violated when the gap is within its reach plus one body
    /// length (half of ours in front of our centre, half of theirs behind
    /// their centre).
    pub fn classify_gap(&self, gap: f32, vehicle_length: f32) -> HitZone {
        if gap <= self.stop.forward_reach() + vehicle_length {
            HitZone::Stop
        } else if gap <= self.brake.forward_reach() + vehicle_length {
            HitZone::Brake
        } else if gap <= self.approach.forward_reach() + vehicle_length {
            HitZone::Approach
        } else {
            HitZone::None
        }
    }

    /// Largest distance from the vehicle origin to any zone corner
    pub fn reach_radius(&self, vehicle_length: f32, vehicle_width: f32) -> f32 {
        let half_w = vehicle_width * 0.5 + self.lateral_shift.abs();
        let forward = vehicle_length * 0.5 + self.approach.forward_reach();
        (forward * forward + half_w * half_w).sqrt()
    }
}

/// Selects one of [`SENSOR_PRESETS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SensorPresetKind {
    #[default]
    Straight = 0,
    CurveLeft = 1,
    CurveRight = 2,
}

impl SensorPresetKind {
    pub fn preset(self) -> &'static SensorPreset {
        &SENSOR_PRESETS[self as usize]
    }
}

pub const SENSOR_PRESETS: [SensorPreset; 3] = [
    // Straight
    SensorPreset {
        approach: SensorZone::new(3.0, 3.0, ZoneAction::Decelerate(3.0), 1.5),
        brake: SensorZone::new(1.5, 1.5, ZoneAction::Decelerate(6.0), 0.5),
        stop: SensorZone::new(0.5, 0.5, ZoneAction::Stop, 0.0),
        lateral_shift: 0.0,
    },
    // CurveLeft: shorter on the inside, bent towards the turn
    SensorPreset {
        approach: SensorZone::new(2.0, 3.0, ZoneAction::Decelerate(3.0), 1.0),
        brake: SensorZone::new(1.0, 1.5, ZoneAction::Decelerate(6.0), 0.5),
        stop: SensorZone::new(0.4, 0.5, ZoneAction::Stop, 0.0),
        lateral_shift: 0.4,
    },
    // CurveRight
    SensorPreset {
        approach: SensorZone::new(3.0, 2.0, ZoneAction::Decelerate(3.0), 1.0),
        brake: SensorZone::new(1.5, 1.0, ZoneAction::Decelerate(6.0), 0.5),
        stop: SensorZone::new(0.5, 0.4, ZoneAction::Stop, 0.0),
        lateral_shift: -0.4,
    },
];

/// World-space sensor geometry of one vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorQuads {
    /// Stop, brake, approach (innermost first); corners are front-left,
    /// side-left, side-right, front-right
    pub zones: [Quad; 3],
    /// Front-left, back-left, back-right, front-right
    pub body: Quad,
}

impl SensorQuads {
    pub fn zone(&self, zone: HitZone) -> Option<&Quad> {
        match zone {
            HitZone::None => None,
            HitZone::Stop => Some(&self.zones[0]),
            HitZone::Brake => Some(&self.zones[1]),
            HitZone::Approach => Some(&self.zones[2]),
        }
    }
}

/// Build a quad from local-frame corners (x forward, y left), rotated by
/// `rotation` degrees and translated to `origin`.
pub fn quad_from_local(origin: &Position, rotation: f32, local: [Point2; 4]) -> Quad {
    let (sin, cos) = rotation.to_radians().sin_cos();
    local.map(|p| Point2 {
        x: origin.x + p.x * cos - p.y * sin,
        y: origin.y + p.x * sin + p.y * cos,
    })
}

/// Recompute the zone and body quads for a pose and preset
pub fn derive_sensor_geometry(
    origin: &Position,
    rotation: f32,
    preset: &SensorPreset,
    vehicle_length: f32,
    vehicle_width: f32,
) -> SensorQuads {
    let half_l = vehicle_length * 0.5;
    let half_w = vehicle_width * 0.5;
    let shift = preset.lateral_shift;

    let zone_quad = |zone: &SensorZone| {
        quad_from_local(
            origin,
            rotation,
            [
                Point2::new(half_l + zone.left_length, half_w + shift),
                Point2::new(half_l, half_w),
                Point2::new(half_l, -half_w),
                Point2::new(half_l + zone.right_length, -half_w + shift),
            ],
        )
    };

    SensorQuads {
        zones: [
            zone_quad(&preset.stop),
            zone_quad(&preset.brake),
            zone_quad(&preset.approach),
        ],
        body: quad_from_local(
            origin,
            rotation,
            [
                Point2::new(half_l, half_w),
                Point2::new(-half_l, half_w),
                Point2::new(-half_l, -half_w),
                Point2::new(half_l, -half_w),
            ],
        ),
    }
}
