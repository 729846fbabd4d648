//! Track builders shared by the integration tests

#![allow(dead_code)]

use rail_sim::simulation::{EdgeId, EdgeSpec, NodeSpec, SimConfig, SimWorld, VehicleId};

/// Square loop of four linear edges "AB", "BC", "CD", "DA", driven
/// counter-clockwise starting east along the x axis
pub fn square_loop(side: f32) -> (Vec<NodeSpec>, Vec<EdgeSpec>) {
    let nodes = vec![
        NodeSpec::new("A", 0.0, 0.0),
        NodeSpec::new("B", side, 0.0),
        NodeSpec::new("C", side, side),
        NodeSpec::new("D", 0.0, side),
    ];
    let edges = vec![
        EdgeSpec::linear("AB", "A", "B"),
        EdgeSpec::linear("BC", "B", "C"),
        EdgeSpec::linear("CD", "C", "D"),
        EdgeSpec::linear("DA", "D", "A"),
    ];
    (nodes, edges)
}

/// Config whose tick length is not clamped below one second
pub fn coarse_config() -> SimConfig {
    SimConfig {
        max_delta: 1.0,
        ..SimConfig::default()
    }
}

pub fn square_world(side: f32, config: SimConfig, vehicles: usize) -> SimWorld {
    let (nodes, edges) = square_loop(side);
    SimWorld::from_specs(&nodes, &edges, config, vehicles).expect("square loop should load")
}

pub fn edge(world: &SimWorld, name: &str) -> EdgeId {
    world
        .graph()
        .edge_by_name(name)
        .unwrap_or_else(|| panic!("edge {} missing", name))
}

/// Put a vehicle on `edge_name` at `ratio`
pub fn place(world: &mut SimWorld, vehicle: usize, edge_name: &str, ratio: f32) {
    let edge = edge(world, edge_name);
    world
        .place_vehicle(VehicleId(vehicle), edge, ratio)
        .expect("placement should succeed");
}
