//! Static track graph: edge geometry plus precomputed topology
//!
//! Built once from the edge and node lists produced by the map loader and
//! immutable afterwards. A petgraph mirror of the topology is kept for the
//! loop search in the route planner.

use anyhow::Result;
use log::{debug, warn};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use super::config::SimConfig;
use super::error::SimError;
use super::sensor::SensorPresetKind;
use super::types::{EdgeId, NodeId, Position};

const MIN_EDGE_LENGTH: f32 = 1e-4;

/// Direction a curve bends, seen in the direction of travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RailType {
    Linear,
    Curve(TurnDirection),
}

impl RailType {
    pub fn is_curve(self) -> bool {
        matches!(self, RailType::Curve(_))
    }

    /// Sensor preset a vehicle uses while on this kind of rail
    pub fn sensor_preset(self) -> SensorPresetKind {
        match self {
            RailType::Linear => SensorPresetKind::Straight,
            RailType::Curve(TurnDirection::Left) => SensorPresetKind::CurveLeft,
            RailType::Curve(TurnDirection::Right) => SensorPresetKind::CurveRight,
        }
    }
}

/// A track node as delivered by the map loader
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub name: String,
    pub position: Position,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            name: name.into(),
            position: Position::new(x, y, 0.0),
        }
    }
}

/// A track edge as delivered by the map loader
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub name: String,
    pub from_node: String,
    pub to_node: String,
    pub rail_type: RailType,
    /// Travel length; derived from the geometry when absent
    pub distance: Option<f32>,
    pub radius: Option<f32>,
    /// Sweep angle of a curve in degrees
    pub rotation: Option<f32>,
    pub waypoints: Vec<String>,
    /// Explicit curve polyline; generated from radius/rotation when empty
    pub rendering_points: Vec<Position>,
}

impl EdgeSpec {
    pub fn linear(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from_node: from.into(),
            to_node: to.into(),
            rail_type: RailType::Linear,
            distance: None,
            radius: None,
            rotation: None,
            waypoints: Vec::new(),
            rendering_points: Vec::new(),
        }
    }

    pub fn curve(
        name: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        turn: TurnDirection,
        radius: f32,
    ) -> Self {
        Self {
            rail_type: RailType::Curve(turn),
            radius: Some(radius),
            ..Self::linear(name, from, to)
        }
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn with_rendering_points(mut self, points: Vec<Position>) -> Self {
        self.rendering_points = points;
        self
    }
}

/// Geometry used to turn an edge ratio into a pose
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeShape {
    Linear {
        start: Position,
        end: Position,
        /// Heading in degrees, fixed for the whole edge
        axis: f32,
    },
    Curve {
        turn: TurnDirection,
        samples: Vec<Position>,
        /// Arc length from the first sample to each sample
        cumulative: Vec<f32>,
    },
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub name: String,
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub rail_type: RailType,
    pub length: f32,
    pub radius: Option<f32>,
    pub waypoints: Vec<String>,
    pub shape: EdgeShape,
    pub from_node_is_merge: bool,
    pub from_node_is_diverge: bool,
    pub to_node_is_merge: bool,
    pub to_node_is_diverge: bool,
    pub next_edge_indices: Vec<EdgeId>,
    pub prev_edge_indices: Vec<EdgeId>,
}

impl Edge {
    pub fn is_linear(&self) -> bool {
        matches!(self.shape, EdgeShape::Linear { .. })
    }

    /// Heading of a linear edge
    pub fn axis(&self) -> Option<f32> {
        match self.shape {
            EdgeShape::Linear { axis, .. } => Some(axis),
            EdgeShape::Curve { .. } => None,
        }
    }

    /// True when both edges are linear and point the same way
    pub fn shares_axis_with(&self, other: &Edge) -> bool {
        match (self.axis(), other.axis()) {
            (Some(a), Some(b)) => {
                let diff = (a - b).abs();
                diff.min(360.0 - diff) < 0.01
            }
            _ => false,
        }
    }

    pub fn distance_to_end(&self, ratio: f32) -> f32 {
        (1.0 - ratio).max(0.0) * self.length
    }

    /// World position (at the shape's height) and heading at `ratio`
    pub fn pose_at(&self, ratio: f32) -> (Position, f32) {
        let ratio = ratio.clamp(0.0, 1.0);
        match &self.shape {
            EdgeShape::Linear { start, end, axis } => (start.lerp(end, ratio), *axis),
            EdgeShape::Curve {
                samples,
                cumulative,
                ..
            } => {
                let total = cumulative.last().copied().unwrap_or(0.0);
                let target = ratio * total;
                let upper = cumulative.partition_point(|c| *c <= target);
                let segment = upper.saturating_sub(1).min(samples.len().saturating_sub(2));
                let a = &samples[segment];
                let b = &samples[segment + 1];
                let span = cumulative[segment + 1] - cumulative[segment];
                let t = if span > 0.0 {
                    ((target - cumulative[segment]) / span).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (a.lerp(b, t), a.heading_to(b))
            }
        }
    }
}

pub struct EdgeGraph {
    edges: Vec<Edge>,
    node_names: Vec<String>,
    node_positions: Vec<Position>,
    node_index: HashMap<String, NodeId>,
    edge_index: HashMap<String, EdgeId>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    graph: DiGraph<NodeId, EdgeId>,
    rejected: Vec<SimError>,
}

impl EdgeGraph {
    /// Build geometry and topology from loader output.
    ///
    /// Edges with broken geometry or unknown endpoints are logged and
    /// excluded; duplicate names and an empty result are errors.
    pub fn build_topology(
        nodes: &[NodeSpec],
        edge_specs: &[EdgeSpec],
        config: &SimConfig,
    ) -> Result<Self> {
        let mut node_index = HashMap::new();
        let mut node_names = Vec::with_capacity(nodes.len());
        let mut node_positions = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = NodeId(node_names.len());
            if node_index.insert(node.name.clone(), id).is_some() {
                return Err(SimError::DuplicateNode(node.name.clone()).into());
            }
            node_names.push(node.name.clone());
            node_positions.push(Position::new(
                node.position.x,
                node.position.y,
                config.rail_height,
            ));
        }

        let mut edges: Vec<Edge> = Vec::with_capacity(edge_specs.len());
        let mut edge_index = HashMap::new();
        let mut rejected = Vec::new();

        for spec in edge_specs {
            if edge_index.contains_key(&spec.name) {
                return Err(SimError::DuplicateEdge(spec.name.clone()).into());
            }
            let id = EdgeId(edges.len());
            match build_edge(id, spec, &node_index, &node_positions, config) {
                Ok(edge) => {
                    edge_index.insert(spec.name.clone(), id);
                    edges.push(edge);
                }
                Err(err) => {
                    warn!("Excluding edge {}: {}", spec.name, err);
                    rejected.push(err);
                }
            }
        }

        if edges.is_empty() {
            return Err(SimError::EmptyGraph.into());
        }

        // Pass 1: group edges by their endpoints
        let mut outgoing: Vec<Vec<EdgeId>> = vec![Vec::new(); node_names.len()];
        let mut incoming: Vec<Vec<EdgeId>> = vec![Vec::new(); node_names.len()];
        for edge in &edges {
            outgoing[edge.from_node.0].push(edge.id);
            incoming[edge.to_node.0].push(edge.id);
        }

        // Pass 2: annotate every edge
        for edge in &mut edges {
            edge.from_node_is_merge = incoming[edge.from_node.0].len() > 1;
            edge.from_node_is_diverge = outgoing[edge.from_node.0].len() > 1;
            edge.to_node_is_merge = incoming[edge.to_node.0].len() > 1;
            edge.to_node_is_diverge = outgoing[edge.to_node.0].len() > 1;
            edge.next_edge_indices = outgoing[edge.to_node.0].clone();
            edge.prev_edge_indices = incoming[edge.from_node.0].clone();
            if edge.next_edge_indices.is_empty() {
                warn!("Edge {} ends in a dead end at node {}", edge.name, node_names[edge.to_node.0]);
            }
        }

        let mut graph = DiGraph::with_capacity(node_names.len(), edges.len());
        for index in 0..node_names.len() {
            graph.add_node(NodeId(index));
        }
        for edge in &edges {
            graph.add_edge(
                NodeIndex::new(edge.from_node.0),
                NodeIndex::new(edge.to_node.0),
                edge.id,
            );
        }

        debug!(
            "Built track graph: {} nodes, {} edges, {} rejected",
            node_names.len(),
            edges.len(),
            rejected.len()
        );

        Ok(Self {
            edges,
            node_names,
            node_positions,
            node_index,
            edge_index,
            outgoing,
            incoming,
            graph,
            rejected,
        })
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.node_names.len()
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_by_name(&self, name: &str) -> Option<EdgeId> {
        self.edge_index.get(name).copied()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        &self.node_names[node.0]
    }

    pub fn node_position(&self, node: NodeId) -> &Position {
        &self.node_positions[node.0]
    }

    /// Edges ending at `node`
    pub fn edges_into(&self, node: NodeId) -> &[EdgeId] {
        &self.incoming[node.0]
    }

    /// Edges starting at `node`
    pub fn edges_out_of(&self, node: NodeId) -> &[EdgeId] {
        &self.outgoing[node.0]
    }

    /// Configuration errors for edges excluded at build time
    pub fn rejected(&self) -> &[SimError] {
        &self.rejected
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<NodeId, EdgeId> {
        &self.graph
    }
}

fn build_edge(
    id: EdgeId,
    spec: &EdgeSpec,
    node_index: &HashMap<String, NodeId>,
    node_positions: &[Position],
    config: &SimConfig,
) -> Result<Edge, SimError> {
    let resolve = |name: &String| {
        node_index
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownNode {
                edge: spec.name.clone(),
                node: name.clone(),
            })
    };
    let from_node = resolve(&spec.from_node)?;
    let to_node = resolve(&spec.to_node)?;
    let start = node_positions[from_node.0];
    let end = node_positions[to_node.0];

    let shape = match spec.rail_type {
        RailType::Linear => EdgeShape::Linear {
            start,
            end,
            axis: start.heading_to(&end),
        },
        RailType::Curve(turn) => {
            let samples = if spec.rendering_points.is_empty() {
                arc_samples(&start, &end, turn, spec.radius, spec.rotation, config.curve_samples)
                    .map_err(|reason| SimError::InvalidCurve {
                        edge: spec.name.clone(),
                        reason,
                    })?
            } else {
                spec.rendering_points
                    .iter()
                    .map(|p| Position::new(p.x, p.y, config.rail_height))
                    .collect()
            };
            if samples.len() < 2 {
                return Err(SimError::InvalidCurve {
                    edge: spec.name.clone(),
                    reason: "fewer than two rendering points".to_string(),
                });
            }
            let mut cumulative = Vec::with_capacity(samples.len());
            let mut travelled = 0.0;
            cumulative.push(0.0);
            for pair in samples.windows(2) {
                travelled += pair[0].distance(&pair[1]);
                cumulative.push(travelled);
            }
            EdgeShape::Curve {
                turn,
                samples,
                cumulative,
            }
        }
    };

    let geometric_length = match &shape {
        EdgeShape::Linear { start, end, .. } => start.distance(end),
        EdgeShape::Curve { cumulative, .. } => cumulative.last().copied().unwrap_or(0.0),
    };
    let length = spec.distance.unwrap_or(geometric_length);
    if !length.is_finite() || length < MIN_EDGE_LENGTH {
        return Err(SimError::InvalidEdgeLength {
            edge: spec.name.clone(),
            length,
        });
    }

    Ok(Edge {
        id,
        name: spec.name.clone(),
        from_node,
        to_node,
        rail_type: spec.rail_type,
        length,
        radius: spec.radius,
        waypoints: spec.waypoints.clone(),
        shape,
        from_node_is_merge: false,
        from_node_is_diverge: false,
        to_node_is_merge: false,
        to_node_is_diverge: false,
        next_edge_indices: Vec::new(),
        prev_edge_indices: Vec::new(),
    })
}

/// Sample a circular arc between two points.
///
/// The sweep comes from `rotation` (degrees) when given, otherwise the minor
/// arc of the given `radius` is used.
fn arc_samples(
    start: &Position,
    end: &Position,
    turn: TurnDirection,
    radius: Option<f32>,
    rotation: Option<f32>,
    count: usize,
) -> Result<Vec<Position>, String> {
    let chord = start.distance(end);
    if chord < MIN_EDGE_LENGTH {
        return Err("curve endpoints coincide".to_string());
    }

    let sweep = match (radius, rotation) {
        (_, Some(degrees)) if degrees > 0.0 && degrees < 360.0 => degrees.to_radians(),
        (Some(radius), None) if radius > 0.0 => {
            let half_chord = chord * 0.5;
            if half_chord > radius * 1.001 {
                return Err(format!("radius {} is shorter than half the chord {}", radius, half_chord));
            }
            2.0 * (half_chord / radius).min(1.0).asin()
        }
        _ => return Err("curve needs a positive radius or a sweep angle".to_string()),
    };

    let radius = chord / (2.0 * (sweep * 0.5).sin());
    let side = match turn {
        TurnDirection::Left => 1.0,
        TurnDirection::Right => -1.0,
    };
    let dir_x = (end.x - start.x) / chord;
    let dir_y = (end.y - start.y) / chord;
    // Negative past a half turn, which puts the centre across the chord
    let offset = radius * (sweep * 0.5).cos() * side;
    let center_x = (start.x + end.x) * 0.5 - dir_y * offset;
    let center_y = (start.y + end.y) * 0.5 + dir_x * offset;
    let start_angle = (start.y - center_y).atan2(start.x - center_x);

    let count = count.max(2);
    let mut samples = Vec::with_capacity(count + 1);
    samples.push(*start);
    for i in 1..count {
        let angle = start_angle + side * sweep * (i as f32 / count as f32);
        samples.push(Position::new(
            center_x + radius * angle.cos(),
            center_y + radius * angle.sin(),
            start.z,
        ));
    }
    samples.push(*end);
    Ok(samples)
}

