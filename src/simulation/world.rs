//! Main simulation world that ties everything together
//!
//! Owns the track graph, the vehicle table and every per-tick structure.
//! Created once per loaded map and driven by [`SimWorld::tick`].

use anyhow::{bail, Context, Result};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::collision_rules::{CollisionRules, RuleInputs};
use super::config::SimConfig;
use super::edge_graph::{EdgeGraph, EdgeSpec, NodeSpec, TurnDirection};
use super::merge_lock::MergeLocks;
use super::motion::{self, MotionInputs};
use super::occupancy::EdgeOccupancy;
use super::route_planner::{build_loops, Placement, RoutePlanner, VehicleLoop};
use super::stats::{SimulationStats, TickStats};
use super::types::{
    EdgeId, HitZone, MovingStatus, Position, StopReason, TrafficState, VehicleId,
};
use super::vehicle_table::{MovementField, VehicleTable};

/// Whole-system run state, switchable between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Running,
    /// Ticks do nothing
    Paused,
    /// Every vehicle held with an emergency stop
    Stopped,
}

/// Read-only per-vehicle view for renderers and telemetry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub position: Position,
    pub rotation: f32,
    pub velocity: f32,
    pub moving_status: MovingStatus,
    pub hit_zone: HitZone,
    pub stop_reason: StopReason,
    pub traffic_state: TrafficState,
    pub current_edge: EdgeId,
    pub edge_ratio: f32,
}

/// The main simulation world
pub struct SimWorld {
    pub config: SimConfig,
    graph: EdgeGraph,
    planner: RoutePlanner,
    table: VehicleTable,
    occupancy: EdgeOccupancy,
    locks: MergeLocks,
    rules: CollisionRules,
    /// Placement computed at load, reused by `reset`
    initial_placements: Vec<Placement>,
    /// Loop assignment computed at load, reused by `reset`
    initial_loops: Vec<VehicleLoop>,
    run_state: RunState,
    pub stats: SimulationStats,
    /// Simulation time
    pub time: f32,
}

impl SimWorld {
    fn new_internal(
        graph: EdgeGraph,
        config: SimConfig,
        vehicle_count: usize,
        rng: Option<StdRng>,
    ) -> Result<Self> {
        let mut rng = rng;
        let plan = build_loops(&graph, vehicle_count, config.min_spacing(), rng.as_mut())
            .context("Failed to place vehicles on the track")?;
        let planner = RoutePlanner::from_loops(&graph, vehicle_count, &plan.loops);

        let mut world = Self {
            planner,
            table: VehicleTable::new(vehicle_count),
            occupancy: EdgeOccupancy::new(graph.len(), config.edge_capacity),
            locks: MergeLocks::new(graph.node_count()),
            rules: CollisionRules::new(vehicle_count, &config),
            initial_placements: plan.placements,
            initial_loops: plan.loops,
            run_state: RunState::Running,
            stats: SimulationStats::default(),
            time: 0.0,
            graph,
            config,
        };
        world.apply_initial_placements()?;

        info!(
            "Loaded track: {} edges, {} loops, {} vehicles",
            world.graph.len(),
            world.planner.loop_count(),
            vehicle_count
        );
        Ok(world)
    }

    pub fn new(graph: EdgeGraph, config: SimConfig, vehicle_count: usize) -> Result<Self> {
        Self::new_internal(graph, config, vehicle_count, None)
    }

    /// Create a world whose vehicle-to-slot assignment is shuffled
    /// reproducibly
    pub fn new_with_seed(
        graph: EdgeGraph,
        config: SimConfig,
        vehicle_count: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::new_internal(graph, config, vehicle_count, Some(StdRng::seed_from_u64(seed)))
    }

    /// Build the graph from loader output and create a world on it
    pub fn from_specs(
        nodes: &[NodeSpec],
        edges: &[EdgeSpec],
        config: SimConfig,
        vehicle_count: usize,
    ) -> Result<Self> {
        let graph = EdgeGraph::build_topology(nodes, edges, &config)
            .context("Failed to build track graph")?;
        Self::new(graph, config, vehicle_count)
    }

    fn apply_initial_placements(&mut self) -> Result<()> {
        let placements = std::mem::take(&mut self.initial_placements);
        let result = placements
            .iter()
            .try_for_each(|p| self.put_on_edge(p.vehicle, p.edge, p.edge_ratio));
        self.initial_placements = placements;
        result?;
        self.occupancy.sort_all(&self.table);
        Ok(())
    }

    /// Put every vehicle back where it started, on the loop it started
    /// with, and clear all counters
    pub fn reset(&mut self) -> Result<()> {
        let vehicle_count = self.table.len();
        self.planner = RoutePlanner::from_loops(&self.graph, vehicle_count, &self.initial_loops);
        self.table = VehicleTable::new(vehicle_count);
        self.occupancy = EdgeOccupancy::new(self.graph.len(), self.config.edge_capacity);
        self.locks.clear();
        self.stats = SimulationStats::default();
        self.time = 0.0;
        self.run_state = RunState::Running;
        self.apply_initial_placements()
    }

    pub fn graph(&self) -> &EdgeGraph {
        &self.graph
    }

    pub fn table(&self) -> &VehicleTable {
        &self.table
    }

    /// Direct table access. Only valid between ticks; pose changes must go
    /// through [`place_vehicle`](Self::place_vehicle).
    pub fn table_mut(&mut self) -> &mut VehicleTable {
        &mut self.table
    }

    pub fn occupancy(&self) -> &EdgeOccupancy {
        &self.occupancy
    }

    pub fn planner(&self) -> &RoutePlanner {
        &self.planner
    }

    pub fn merge_locks(&self) -> &MergeLocks {
        &self.locks
    }

    pub fn vehicle_count(&self) -> usize {
        self.table.len()
    }

    fn check_vehicle(&self, id: VehicleId) -> Result<()> {
        if !self.table.contains(id) {
            bail!("Vehicle {:?} does not exist", id);
        }
        Ok(())
    }

    /// Move a vehicle onto `edge` at `ratio`, at rest and ready to move
    fn put_on_edge(&mut self, id: VehicleId, edge: EdgeId, ratio: f32) -> Result<()> {
        self.check_vehicle(id)?;
        let Some(target) = self.graph.get_edge(edge) else {
            bail!("Edge {:?} does not exist", edge);
        };
        if !(0.0..1.0).contains(&ratio) {
            bail!("Edge ratio {} is outside [0, 1)", ratio);
        }

        let previous = self.table.current_edge(id);
        if self.occupancy.remove(previous, id) {
            if let Some(previous_edge) = self.graph.get_edge(previous) {
                self.locks.release(previous_edge.to_node, id);
            }
        }
        self.occupancy
            .insert(edge, id)
            .with_context(|| format!("Cannot place vehicle {:?} on edge {}", id, target.name))?;

        let (mut position, rotation) = target.pose_at(ratio);
        position.z = self.config.rail_height;
        let reason = self.table.stop_reason(id).without(
            StopReason::NOT_INITIALIZED | StopReason::PATH_BLOCKED | StopReason::RULE_OWNED,
        );

        let table = &mut self.table;
        table.set_current_edge(id, edge);
        table.set_edge_ratio(id, ratio);
        table.set_pose(id, position, rotation);
        table.set_velocity(id, 0.0);
        table.set_deceleration(id, 0.0);
        table.set_field(id, MovementField::Acceleration, self.config.acceleration);
        table.set_sensor_preset(id, target.rail_type.sensor_preset());
        table.set_hit_zone(id, HitZone::None);
        table.set_traffic_state(id, TrafficState::Free);
        table.set_stop_reason(id, reason);
        table.set_moving_status(
            id,
            if reason.is_empty() {
                MovingStatus::Moving
            } else {
                MovingStatus::Stopped
            },
        );
        table.derive_sensor_geometry(id, &self.config);
        Ok(())
    }

    /// Teleport a vehicle to `ratio` along `edge`. Its loop is switched to
    /// one running through the edge when needed.
    pub fn place_vehicle(&mut self, id: VehicleId, edge: EdgeId, ratio: f32) -> Result<()> {
        self.put_on_edge(id, edge, ratio)?;
        if !self.planner.reassign_to_edge(id, edge) {
            warn!(
                "No loop runs through edge {}; vehicle {:?} will use fallback routing",
                self.graph.edge(edge).name,
                id
            );
        }
        self.occupancy.sort_by_ratio(edge, &self.table);
        Ok(())
    }

    /// Advance the simulation by one step
    pub fn tick(&mut self, delta_secs: f32) -> TickStats {
        if self.run_state == RunState::Paused {
            return TickStats::default();
        }
        let delta = self.config.clamp_delta(delta_secs);

        let mut stats = self.update_collisions();
        stats += self.integrate_motion(delta);

        self.time += delta;
        self.stats.record(delta, stats);
        stats
    }

    /// Run only the hazard pass
    pub fn update_collisions(&mut self) -> TickStats {
        let inputs = RuleInputs {
            graph: &self.graph,
            planner: &self.planner,
            occupancy: &self.occupancy,
            config: &self.config,
        };
        self.rules.run(&inputs, &mut self.table, &mut self.locks)
    }

    /// Run only the movement pass
    pub fn integrate_motion(&mut self, delta_secs: f32) -> TickStats {
        let delta = self.config.clamp_delta(delta_secs);
        let inputs = MotionInputs {
            graph: &self.graph,
            planner: &self.planner,
            config: &self.config,
        };
        motion::integrate(
            &inputs,
            &mut self.table,
            &mut self.occupancy,
            &mut self.locks,
            delta,
        )
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn set_run_state(&mut self, state: RunState) {
        if state == self.run_state {
            return;
        }
        match state {
            RunState::Stopped => {
                for id in self.table.ids().collect::<Vec<_>>() {
                    if self.table.moving_status(id) == MovingStatus::Paused {
                        // Stays frozen; the reason keeps it stopped if resumed
                        // before the system runs again
                        let reason = self.table.stop_reason(id) | StopReason::E_STOP;
                        self.table.set_stop_reason(id, reason);
                    } else {
                        self.table.halt(id, StopReason::E_STOP);
                    }
                }
            }
            RunState::Running | RunState::Paused => {
                if self.run_state == RunState::Stopped {
                    for id in self.table.ids().collect::<Vec<_>>() {
                        self.clear_stop_reason(id, StopReason::E_STOP);
                    }
                }
            }
        }
        info!("Run state {:?} -> {:?}", self.run_state, state);
        self.run_state = state;
    }

    fn clear_stop_reason(&mut self, id: VehicleId, reason: StopReason) {
        let mut remaining = self.table.stop_reason(id);
        remaining.remove(reason);
        self.table.set_stop_reason(id, remaining);
        if remaining.is_empty() && self.table.moving_status(id) == MovingStatus::Stopped {
            self.table.set_moving_status(id, MovingStatus::Moving);
        }
    }

    /// Stop a vehicle for an external reason such as loading
    pub fn stop_vehicle(&mut self, id: VehicleId, reason: StopReason) -> Result<()> {
        self.check_vehicle(id)?;
        self.table.halt(id, reason);
        Ok(())
    }

    /// Clear an external stop reason; the vehicle moves again once no reason
    /// is left
    pub fn release_vehicle(&mut self, id: VehicleId, reason: StopReason) -> Result<()> {
        self.check_vehicle(id)?;
        self.clear_stop_reason(id, reason);
        Ok(())
    }

    /// Freeze a vehicle in place
    pub fn pause_vehicle(&mut self, id: VehicleId) -> Result<()> {
        self.check_vehicle(id)?;
        self.table.set_moving_status(id, MovingStatus::Paused);
        Ok(())
    }

    /// Undo [`pause_vehicle`](Self::pause_vehicle)
    pub fn resume_vehicle(&mut self, id: VehicleId) -> Result<()> {
        self.check_vehicle(id)?;
        if self.table.moving_status(id) == MovingStatus::Paused {
            let status = if self.table.stop_reason(id).is_empty() {
                MovingStatus::Moving
            } else {
                MovingStatus::Stopped
            };
            self.table.set_moving_status(id, status);
        }
        Ok(())
    }

    pub fn snapshot(&self, id: VehicleId) -> Option<VehicleSnapshot> {
        if !self.table.contains(id) {
            return None;
        }
        let record = self.table.get(id);
        Some(VehicleSnapshot {
            id,
            position: record.position,
            rotation: record.rotation,
            velocity: record.velocity,
            moving_status: record.moving_status,
            hit_zone: record.hit_zone,
            stop_reason: record.stop_reason,
            traffic_state: record.traffic_state,
            current_edge: record.current_edge,
            edge_ratio: record.edge_ratio,
        })
    }

    pub fn snapshots(&self) -> impl Iterator<Item = VehicleSnapshot> + '_ {
        self.table.ids().filter_map(|id| self.snapshot(id))
    }

    /// Number of (moving, stopped, paused) vehicles
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.table
            .ids()
            .fold((0, 0, 0), |(moving, stopped, paused), id| {
                match self.table.moving_status(id) {
                    MovingStatus::Moving => (moving + 1, stopped, paused),
                    MovingStatus::Stopped => (moving, stopped + 1, paused),
                    MovingStatus::Paused => (moving, stopped, paused + 1),
                }
            })
    }

    pub fn log_summary(&self) {
        let (moving, stopped, paused) = self.status_counts();
        self.stats.log_summary(moving, stopped, paused);
    }

    /// Node and edge lists of the demo track: a rounded rectangle driven
    /// counter-clockwise, with a bypass that leaves at the top-right corner
    /// and rejoins the bottom straight.
    pub fn demo_track() -> (Vec<NodeSpec>, Vec<EdgeSpec>) {
        let nodes = vec![
            NodeSpec::new("N0", 10.0, 0.0),
            NodeSpec::new("N1", 50.0, 0.0),
            NodeSpec::new("N2", 60.0, 10.0),
            NodeSpec::new("N3", 60.0, 40.0),
            NodeSpec::new("N4", 50.0, 50.0),
            NodeSpec::new("N5", 10.0, 50.0),
            NodeSpec::new("N6", 0.0, 40.0),
            NodeSpec::new("N7", 0.0, 10.0),
            NodeSpec::new("N8", 50.0, 25.0),
        ];
        let edges = vec![
            EdgeSpec::linear("E00", "N0", "N1"),
            EdgeSpec::curve("E01", "N1", "N2", TurnDirection::Left, 10.0),
            EdgeSpec::linear("E02", "N2", "N3"),
            EdgeSpec::curve("E03", "N3", "N4", TurnDirection::Left, 10.0),
            EdgeSpec::linear("E04", "N4", "N5"),
            EdgeSpec::curve("E05", "N5", "N6", TurnDirection::Left, 10.0),
            EdgeSpec::linear("E06", "N6", "N7"),
            EdgeSpec::curve("E07", "N7", "N0", TurnDirection::Left, 10.0),
            EdgeSpec::linear("B00", "N4", "N8"),
            EdgeSpec::linear("B01", "N8", "N1"),
        ];
        (nodes, edges)
    }

    /// Demo track with `vehicle_count` vehicles
    pub fn create_test_world(config: SimConfig, vehicle_count: usize) -> Result<Self> {
        let (nodes, edges) = Self::demo_track();
        Self::from_specs(&nodes, &edges, config, vehicle_count)
    }

    pub fn create_test_world_with_seed(
        config: SimConfig,
        vehicle_count: usize,
        seed: u64,
    ) -> Result<Self> {
        let (nodes, edges) = Self::demo_track();
        let graph = EdgeGraph::build_topology(&nodes, &edges, &config)
            .context("Failed to build track graph")?;
        Self::new_with_seed(graph, config, vehicle_count, seed)
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        let (moving, stopped, paused) = self.status_counts();
        println!("=== Rail Simulation Summary ===");
        println!("Time: {:.2}s, ticks: {}", self.time, self.stats.ticks);
        println!(
            "Edges: {}, Nodes: {}, Loops: {}",
            self.graph.len(),
            self.graph.node_count(),
            self.planner.loop_count()
        );
        println!(
            "Vehicles: {} (moving {}, stopped {}, paused {})",
            self.vehicle_count(),
            moving,
            stopped,
            paused
        );
        println!(
            "Collisions: {}, resumes: {}, transitions: {}",
            self.stats.total_collisions, self.stats.total_resumes, self.stats.total_transitions
        );

        println!("--- Vehicles ---");
        for snapshot in self.snapshots() {
            println!(
                "  Vehicle {}: edge={} ratio={:.2} speed={:.2} pos=({:.1}, {:.1}) rot={:.0} {:?} zone={:?} reason={:?}",
                snapshot.id.0,
                self.graph.edge(snapshot.current_edge).name,
                snapshot.edge_ratio,
                snapshot.velocity,
                snapshot.position.x,
                snapshot.position.y,
                snapshot.rotation,
                snapshot.moving_status,
                snapshot.hit_zone,
                snapshot.stop_reason,
            );
        }
    }
}
