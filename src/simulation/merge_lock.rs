//! Right-of-way locks at merge nodes
//!
//! One vehicle at a time may hold the lock of a merge node. The holder is
//! exempt from yielding to cross traffic, which keeps competing lead vehicles
//! from stopping for each other forever. Vehicles that ask while the lock is
//! taken queue up and are served in arrival order, so no incoming edge can
//! keep the node to itself.

use std::collections::VecDeque;

use super::types::{NodeId, TrafficState, VehicleId};

/// Waiting slots reserved per node; merges rarely have more inbound edges
const WAITING_RESERVE: usize = 4;

#[derive(Debug, Clone)]
struct NodeLock {
    holder: Option<VehicleId>,
    waiting: VecDeque<VehicleId>,
}

pub struct MergeLocks {
    nodes: Vec<NodeLock>,
}

impl MergeLocks {
    pub fn new(node_count: usize) -> Self {
        Self {
            nodes: (0..node_count)
                .map(|_| NodeLock {
                    holder: None,
                    waiting: VecDeque::with_capacity(WAITING_RESERVE),
                })
                .collect(),
        }
    }

    pub fn holder(&self, node: NodeId) -> Option<VehicleId> {
        self.nodes.get(node.0).and_then(|lock| lock.holder)
    }

    pub fn is_held_by(&self, node: NodeId, vehicle: VehicleId) -> bool {
        self.holder(node) == Some(vehicle)
    }

    /// Vehicles queued for the lock, longest waiting first
    pub fn waiting(&self, node: NodeId) -> impl Iterator<Item = VehicleId> + '_ {
        self.nodes
            .get(node.0)
            .into_iter()
            .flat_map(|lock| lock.waiting.iter().copied())
    }

    /// Ask for the lock. A free lock goes to the longest waiting vehicle;
    /// everyone else is queued. Returns the resulting state of the requester.
    pub fn request(&mut self, node: NodeId, vehicle: VehicleId) -> TrafficState {
        let Some(lock) = self.nodes.get_mut(node.0) else {
            return TrafficState::Free;
        };
        if lock.holder == Some(vehicle) {
            return TrafficState::Acquired;
        }
        let first_in_line = lock.waiting.front().map_or(true, |first| *first == vehicle);
        if lock.holder.is_none() && first_in_line {
            lock.waiting.pop_front();
            lock.holder = Some(vehicle);
            return TrafficState::Acquired;
        }
        if !lock.waiting.contains(&vehicle) {
            lock.waiting.push_back(vehicle);
        }
        TrafficState::Waiting
    }

    /// Give up the lock or a place in its queue. Returns whether `vehicle`
    /// held the lock.
    pub fn release(&mut self, node: NodeId, vehicle: VehicleId) -> bool {
        let Some(lock) = self.nodes.get_mut(node.0) else {
            return false;
        };
        lock.waiting.retain(|id| *id != vehicle);
        if lock.holder == Some(vehicle) {
            lock.holder = None;
            true
        } else {
            false
        }
    }

    /// Drop queued vehicles for which `keep` returns false
    pub fn retain_waiting(&mut self, mut keep: impl FnMut(NodeId, VehicleId) -> bool) {
        for (index, lock) in self.nodes.iter_mut().enumerate() {
            lock.waiting.retain(|vehicle| keep(NodeId(index), *vehicle));
        }
    }

    pub fn clear(&mut self) {
        for lock in &mut self.nodes {
            lock.holder = None;
            lock.waiting.clear();
        }
    }
}
