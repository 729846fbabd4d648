//! Simulation statistics

use log::info;
use std::ops::AddAssign;

/// Counters produced by one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Vehicles that went from moving to stopped because of a hazard
    pub collisions: usize,
    /// Vehicles released from a hazard stop
    pub resumes: usize,
    /// Edge-to-edge transitions
    pub transitions: usize,
    /// Vehicles taken out because of invalid state
    pub faults: usize,
}

impl AddAssign for TickStats {
    fn add_assign(&mut self, rhs: TickStats) {
        self.collisions += rhs.collisions;
        self.resumes += rhs.resumes;
        self.transitions += rhs.transitions;
        self.faults += rhs.faults;
    }
}

/// Running totals across the whole session
#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    pub ticks: u64,
    pub elapsed_time: f32,
    pub total_collisions: usize,
    pub total_resumes: usize,
    pub total_transitions: usize,
    pub total_faults: usize,
    pub last_tick: TickStats,
}

impl SimulationStats {
    pub fn record(&mut self, delta: f32, tick: TickStats) {
        self.ticks += 1;
        self.elapsed_time += delta;
        self.total_collisions += tick.collisions;
        self.total_resumes += tick.resumes;
        self.total_transitions += tick.transitions;
        self.total_faults += tick.faults;
        self.last_tick = tick;
    }

    /// Log the totals together with the current vehicle counts
    pub fn log_summary(&self, moving: usize, stopped: usize, paused: usize) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s", self.elapsed_time);
        info!("Ticks: {}", self.ticks);
        info!("Edge transitions: {}", self.total_transitions);
        info!("Collisions detected: {}", self.total_collisions);
        info!("Resumes granted: {}", self.total_resumes);
        info!("Faulted vehicles: {}", self.total_faults);
        info!("Moving vehicles: {}", moving);
        info!("Stopped vehicles: {}", stopped);
        info!("Paused vehicles: {}", paused);
    }
}
