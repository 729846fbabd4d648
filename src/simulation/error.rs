//! Configuration errors reported while loading a track or placing vehicles

use thiserror::Error;

use super::types::{EdgeId, VehicleId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// An edge references a node that was never declared.
    #[error("edge {edge} references unknown node {node}")]
    UnknownNode { edge: String, node: String },

    /// Two nodes share the same name.
    #[error("duplicate node name {0}")]
    DuplicateNode(String),

    /// Two edges share the same name.
    #[error("duplicate edge name {0}")]
    DuplicateEdge(String),

    /// The edge length is zero, negative or not a number.
    #[error("edge {edge} has invalid length {length}")]
    InvalidEdgeLength { edge: String, length: f32 },

    /// Curve geometry could not be derived from the given parameters.
    #[error("edge {edge} has invalid curve geometry: {reason}")]
    InvalidCurve { edge: String, reason: String },

    /// Every edge was rejected.
    #[error("track graph has no usable edges")]
    EmptyGraph,

    /// The occupancy list of an edge is full.
    #[error("edge {edge:?} is at capacity ({capacity} vehicles)")]
    EdgeCapacityExceeded { edge: EdgeId, capacity: usize },

    /// The looped track is too short to hold the requested vehicles.
    #[error("cannot place {requested} vehicles, track holds {capacity}")]
    NotEnoughTrack { requested: usize, capacity: usize },

    #[error("unknown vehicle {0:?}")]
    UnknownVehicle(VehicleId),

    #[error("unknown edge {0:?}")]
    UnknownEdge(EdgeId),
}
