//! Loop construction, initial placement and next-edge resolution
//!
//! Every vehicle is bound to a cyclic sequence of edges. The sequence is only
//! consulted at diverging nodes; everywhere else the single successor is
//! taken directly.
//!
//! Loops are built deterministically: edges are visited in index order and
//! each edge not yet covered is closed into a loop by the shortest path from
//! its end node back to its start node. On a strongly connected graph this
//! covers every edge.

use log::{debug, warn};
use ordered_float::OrderedFloat;
use petgraph::algo::astar;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;

use super::edge_graph::{Edge, EdgeGraph};
use super::error::SimError;
use super::types::{EdgeId, VehicleId};

/// The cyclic edge sequence assigned to one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleLoop {
    pub vehicle_index: VehicleId,
    pub edge_names: Vec<String>,
}

/// Initial position of one vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub vehicle: VehicleId,
    pub edge: EdgeId,
    pub edge_ratio: f32,
}

#[derive(Debug, Clone, Default)]
pub struct LoopPlan {
    pub loops: Vec<VehicleLoop>,
    pub placements: Vec<Placement>,
}

/// Outcome of a next-edge lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChoice {
    /// Only one way to go
    Direct(EdgeId),
    /// Chosen by the vehicle's loop at a diverge
    Loop(EdgeId),
    /// Loop lookup failed; first successor taken
    Fallback(EdgeId),
    DeadEnd,
}

impl RouteChoice {
    pub fn edge(self) -> Option<EdgeId> {
        match self {
            RouteChoice::Direct(edge) | RouteChoice::Loop(edge) | RouteChoice::Fallback(edge) => {
                Some(edge)
            }
            RouteChoice::DeadEnd => None,
        }
    }
}

/// Partition the graph into loops. Returns the loops and, per edge, the loop
/// that first covered it.
pub fn find_loops(graph: &EdgeGraph) -> (Vec<Vec<EdgeId>>, Vec<Option<usize>>) {
    let mut owner: Vec<Option<usize>> = vec![None; graph.len()];
    let mut loops: Vec<Vec<EdgeId>> = Vec::new();

    for edge in graph.edges() {
        if owner[edge.id.0].is_some() {
            continue;
        }
        match close_loop(graph, edge, &owner) {
            Some(cycle) => {
                let index = loops.len();
                for id in &cycle {
                    owner[id.0].get_or_insert(index);
                }
                debug!("Loop {} starts at {} with {} edges", index, edge.name, cycle.len());
                loops.push(cycle);
            }
            None => warn!(
                "Edge {} is not on any loop; no vehicles will be placed on it",
                edge.name
            ),
        }
    }

    (loops, owner)
}

/// `edge` followed by the shortest way back to its start node
fn close_loop(graph: &EdgeGraph, edge: &Edge, owner: &[Option<usize>]) -> Option<Vec<EdgeId>> {
    let network = graph.petgraph();
    let start = NodeIndex::new(edge.to_node.0);
    let goal = NodeIndex::new(edge.from_node.0);

    let (_, nodes) = astar(
        network,
        start,
        |node| node == goal,
        |reference| graph.edge(*reference.weight()).length,
        |_| 0.0,
    )?;

    let mut cycle = vec![edge.id];
    for pair in nodes.windows(2) {
        // Parallel edges: prefer uncovered, then shorter, then lower index
        let step = network
            .edges_connecting(pair[0], pair[1])
            .map(|reference| *reference.weight())
            .min_by_key(|id| {
                (
                    owner[id.0].is_some(),
                    OrderedFloat(graph.edge(*id).length),
                    *id,
                )
            })?;
        cycle.push(step);
    }
    Some(cycle)
}

/// Build loops and spread `vehicle_count` vehicles over the covered edges in
/// proportion to edge length. With an RNG the vehicle ids are shuffled over
/// the slots.
pub fn build_loops(
    graph: &EdgeGraph,
    vehicle_count: usize,
    min_spacing: f32,
    rng: Option<&mut StdRng>,
) -> Result<LoopPlan, SimError> {
    let (cycles, owner) = find_loops(graph);

    let covered: Vec<&Edge> = graph
        .edges()
        .iter()
        .filter(|edge| owner[edge.id.0].is_some())
        .collect();
    let capacities: Vec<usize> = covered
        .iter()
        .map(|edge| (edge.length / min_spacing).floor() as usize)
        .collect();
    let total_capacity: usize = capacities.iter().sum();
    if vehicle_count > total_capacity {
        return Err(SimError::NotEnoughTrack {
            requested: vehicle_count,
            capacity: total_capacity,
        });
    }
    if vehicle_count == 0 {
        return Ok(LoopPlan::default());
    }

    // Largest remainder apportionment, capped per edge
    let total_length: f32 = covered.iter().map(|edge| edge.length).sum();
    let mut counts = vec![0usize; covered.len()];
    let mut remainders = Vec::with_capacity(covered.len());
    for (i, edge) in covered.iter().enumerate() {
        let exact = vehicle_count as f32 * edge.length / total_length;
        counts[i] = (exact.floor() as usize).min(capacities[i]);
        remainders.push((OrderedFloat(exact - exact.floor()), i));
    }
    let mut assigned: usize = counts.iter().sum();
    remainders.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, i) in &remainders {
        if assigned == vehicle_count {
            break;
        }
        if counts[*i] < capacities[*i] {
            counts[*i] += 1;
            assigned += 1;
        }
    }
    // Spill whatever rounding or capping left over
    for (i, capacity) in capacities.iter().enumerate() {
        while assigned < vehicle_count && counts[i] < *capacity {
            counts[i] += 1;
            assigned += 1;
        }
    }

    let mut slots = Vec::with_capacity(vehicle_count);
    for (edge, count) in covered.iter().zip(&counts) {
        for k in 0..*count {
            slots.push((edge.id, (k as f32 + 0.5) / *count as f32));
        }
    }

    let mut vehicle_ids: Vec<usize> = (0..vehicle_count).collect();
    if let Some(rng) = rng {
        vehicle_ids.shuffle(rng);
    }

    let mut placements = Vec::with_capacity(vehicle_count);
    let mut loops = Vec::with_capacity(vehicle_count);
    for ((edge, edge_ratio), vehicle) in slots.into_iter().zip(vehicle_ids) {
        let vehicle = VehicleId(vehicle);
        placements.push(Placement {
            vehicle,
            edge,
            edge_ratio,
        });
        if let Some(cycle) = owner[edge.0].map(|index| &cycles[index]) {
            loops.push(VehicleLoop {
                vehicle_index: vehicle,
                edge_names: cycle.iter().map(|id| graph.edge(*id).name.clone()).collect(),
            });
        }
    }
    loops.sort_by_key(|vehicle_loop| vehicle_loop.vehicle_index);

    Ok(LoopPlan { loops, placements })
}

/// Resolves the next edge for a vehicle at the end of its current edge
pub struct RoutePlanner {
    /// Per distinct loop: edge -> following edge in the loop
    loop_successors: Vec<HashMap<EdgeId, EdgeId>>,
    vehicle_loop: Vec<Option<usize>>,
}

impl RoutePlanner {
    pub fn from_loops(graph: &EdgeGraph, vehicle_count: usize, loops: &[VehicleLoop]) -> Self {
        let mut loop_successors: Vec<HashMap<EdgeId, EdgeId>> = Vec::new();
        let mut distinct: HashMap<&[String], usize> = HashMap::new();
        let mut vehicle_loop = vec![None; vehicle_count];

        for vehicle_loop_spec in loops {
            let index = match distinct.get(vehicle_loop_spec.edge_names.as_slice()) {
                Some(index) => *index,
                None => {
                    let ids: Vec<EdgeId> = vehicle_loop_spec
                        .edge_names
                        .iter()
                        .filter_map(|name| {
                            let id = graph.edge_by_name(name);
                            if id.is_none() {
                                warn!("Loop references unknown edge {}", name);
                            }
                            id
                        })
                        .collect();
                    let mut successors = HashMap::with_capacity(ids.len());
                    for (i, id) in ids.iter().enumerate() {
                        successors.insert(*id, ids[(i + 1) % ids.len()]);
                    }
                    let index = loop_successors.len();
                    loop_successors.push(successors);
                    distinct.insert(vehicle_loop_spec.edge_names.as_slice(), index);
                    index
                }
            };
            match vehicle_loop.get_mut(vehicle_loop_spec.vehicle_index.0) {
                Some(slot) => *slot = Some(index),
                None => warn!(
                    "Loop assigned to unknown vehicle {:?}",
                    vehicle_loop_spec.vehicle_index
                ),
            }
        }

        Self {
            loop_successors,
            vehicle_loop,
        }
    }

    pub fn loop_count(&self) -> usize {
        self.loop_successors.len()
    }

    /// True when the vehicle's loop runs through `edge`
    pub fn loop_contains(&self, vehicle: VehicleId, edge: EdgeId) -> bool {
        self.vehicle_loop
            .get(vehicle.0)
            .copied()
            .flatten()
            .is_some_and(|index| self.loop_successors[index].contains_key(&edge))
    }

    /// Bind the vehicle to some loop through `edge`. Returns false when no
    /// loop covers the edge.
    pub fn reassign_to_edge(&mut self, vehicle: VehicleId, edge: EdgeId) -> bool {
        if self.loop_contains(vehicle, edge) {
            return true;
        }
        let found = self
            .loop_successors
            .iter()
            .position(|successors| successors.contains_key(&edge));
        if let (Some(index), Some(slot)) = (found, self.vehicle_loop.get_mut(vehicle.0)) {
            *slot = Some(index);
            true
        } else {
            false
        }
    }

    pub fn resolve(&self, graph: &EdgeGraph, edge: EdgeId, vehicle: VehicleId) -> RouteChoice {
        let current = graph.edge(edge);
        if !current.to_node_is_diverge && current.next_edge_indices.len() == 1 {
            return RouteChoice::Direct(current.next_edge_indices[0]);
        }
        let Some(first) = current.next_edge_indices.first().copied() else {
            return RouteChoice::DeadEnd;
        };

        let from_loop = self
            .vehicle_loop
            .get(vehicle.0)
            .copied()
            .flatten()
            .and_then(|index| self.loop_successors[index].get(&edge))
            .filter(|next| current.next_edge_indices.contains(next));

        match from_loop {
            Some(next) => RouteChoice::Loop(*next),
            None => RouteChoice::Fallback(first),
        }
    }

    /// Next edge for a vehicle leaving `edge`, logging when the loop could
    /// not decide
    pub fn next_edge(&self, graph: &EdgeGraph, edge: EdgeId, vehicle: VehicleId) -> Option<EdgeId> {
        let choice = self.resolve(graph, edge, vehicle);
        if let RouteChoice::Fallback(next) = choice {
            warn!(
                "Vehicle {:?} has no loop entry for diverging edge {}; taking first successor {}",
                vehicle,
                graph.edge(edge).name,
                graph.edge(next).name
            );
        }
        choice.edge()
    }

    /// Same as [`next_edge`](Self::next_edge) without logging, for
    /// per-tick lookahead
    pub fn peek_next_edge(
        &self,
        graph: &EdgeGraph,
        edge: EdgeId,
        vehicle: VehicleId,
    ) -> Option<EdgeId> {
        self.resolve(graph, edge, vehicle).edge()
    }
}
