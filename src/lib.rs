//! Rail Simulation Library
//!
//! Vehicle motion and collision avoidance for rail-guided vehicles on a
//! directed track graph.

pub mod simulation;
