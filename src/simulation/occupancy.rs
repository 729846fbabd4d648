//! Per-edge vehicle queues ordered by progress along the edge
//!
//! Index 0 of every queue is the lead vehicle (highest edge ratio). Queues
//! are bounded and their storage is reserved up front, so inserting,
//! removing and re-sorting never allocate during a tick.

use super::error::SimError;
use super::types::{EdgeId, VehicleId};
use super::vehicle_table::VehicleTable;

pub struct EdgeOccupancy {
    queues: Vec<Vec<VehicleId>>,
    capacity: usize,
}

impl EdgeOccupancy {
    pub fn new(edge_count: usize, capacity: usize) -> Self {
        Self {
            queues: (0..edge_count).map(|_| Vec::with_capacity(capacity)).collect(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a vehicle to the back of an edge's queue. Call
    /// [`sort_by_ratio`](Self::sort_by_ratio) afterwards if it is not the
    /// rearmost vehicle.
    pub fn insert(&mut self, edge: EdgeId, vehicle: VehicleId) -> Result<(), SimError> {
        let queue = self
            .queues
            .get_mut(edge.0)
            .ok_or(SimError::UnknownEdge(edge))?;
        if queue.len() >= self.capacity {
            return Err(SimError::EdgeCapacityExceeded {
                edge,
                capacity: self.capacity,
            });
        }
        queue.push(vehicle);
        Ok(())
    }

    /// Remove a vehicle, keeping the order of the others. Returns whether it
    /// was present.
    pub fn remove(&mut self, edge: EdgeId, vehicle: VehicleId) -> bool {
        let Some(queue) = self.queues.get_mut(edge.0) else {
            return false;
        };
        match queue.iter().position(|id| *id == vehicle) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Order the queue by descending edge ratio.
    ///
    /// Insertion sort: stable, allocation free and linear on the nearly
    /// sorted queues seen between ticks.
    pub fn sort_by_ratio(&mut self, edge: EdgeId, table: &VehicleTable) {
        let Some(queue) = self.queues.get_mut(edge.0) else {
            return;
        };
        for i in 1..queue.len() {
            let vehicle = queue[i];
            let ratio = table.edge_ratio(vehicle);
            let mut j = i;
            while j > 0 && table.edge_ratio(queue[j - 1]) < ratio {
                queue[j] = queue[j - 1];
                j -= 1;
            }
            queue[j] = vehicle;
        }
    }

    pub fn sort_all(&mut self, table: &VehicleTable) {
        for edge in 0..self.queues.len() {
            self.sort_by_ratio(EdgeId(edge), table);
        }
    }

    /// Vehicle closest to the end of the edge
    pub fn lead(&self, edge: EdgeId) -> Option<VehicleId> {
        self.vehicles(edge).first().copied()
    }

    /// Vehicle closest to the start of the edge
    pub fn tail(&self, edge: EdgeId) -> Option<VehicleId> {
        self.vehicles(edge).last().copied()
    }

    /// Every vehicle behind the lead, front to back
    pub fn following(&self, edge: EdgeId) -> &[VehicleId] {
        self.vehicles(edge).get(1..).unwrap_or(&[])
    }

    /// The whole queue, front to back
    pub fn vehicles(&self, edge: EdgeId) -> &[VehicleId] {
        self.queues.get(edge.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, edge: EdgeId) -> usize {
        self.vehicles(edge).len()
    }

    pub fn is_empty(&self, edge: EdgeId) -> bool {
        self.vehicles(edge).is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.queues.len()
    }
}
