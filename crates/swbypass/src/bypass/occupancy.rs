use super::ScheduleError;
use crate::HashSet;
use crate::ir::{Block, BusId, Cycle};
use bit_set::BitSet;
use std::collections::BTreeMap;

/// Bus slots claimed per cycle while one block is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOccupancy {
    bus_count: usize,
    claims: BTreeMap<Cycle, BitSet>,
}

impl ResourceOccupancy {
    pub fn new(bus_count: usize) -> Self {
        Self {
            bus_count,
            claims: BTreeMap::new(),
        }
    }

    /// Claims the slot of every live move of `block`.
    ///
    /// Writes of results already marked eliminated do not occupy a bus.
    pub fn from_block(block: &Block, bus_count: usize) -> Result<Self, ScheduleError> {
        let dead_writes: HashSet<_> = block
            .results
            .iter()
            .filter(|r| r.eliminated)
            .map(|r| r.producer)
            .collect();

        let mut occupancy = Self::new(bus_count);
        for m in block.moves.iter().filter(|m| !dead_writes.contains(&m.id)) {
            if m.bus.0 >= bus_count {
                return Err(ScheduleError::inconsistent(format!(
                    "move {} is scheduled on {} but the target has {bus_count} buses",
                    m.id, m.bus
                )));
            }
            if !occupancy.claim(m.cycle, m.bus) {
                return Err(ScheduleError::inconsistent(format!(
                    "{} carries more than one move in cycle {}",
                    m.bus, m.cycle
                )));
            }
        }
        Ok(occupancy)
    }

    pub fn bus_count(&self) -> usize {
        self.bus_count
    }

    pub fn is_free(&self, cycle: Cycle, bus: BusId) -> bool {
        bus.0 < self.bus_count
            && self
                .claims
                .get(&cycle)
                .is_none_or(|claimed| !claimed.contains(bus.0))
    }

    /// Returns `false` when the slot was already taken.
    pub fn claim(&mut self, cycle: Cycle, bus: BusId) -> bool {
        self.claims.entry(cycle).or_default().insert(bus.0)
    }

    pub fn release(&mut self, cycle: Cycle, bus: BusId) {
        if let Some(claimed) = self.claims.get_mut(&cycle) {
            claimed.remove(bus.0);
        }
    }

    pub fn claimed(&self, cycle: Cycle) -> usize {
        self.claims.get(&cycle).map_or(0, |claimed| claimed.count())
    }

    pub fn is_full(&self, cycle: Cycle) -> bool {
        self.claimed(cycle) >= self.bus_count
    }

    /// Lowest free bus in `cycle` accepted by `feasible`.
    pub fn first_free(&self, cycle: Cycle, feasible: impl Fn(BusId) -> bool) -> Option<BusId> {
        if self.is_full(cycle) {
            return None;
        }
        (0..self.bus_count)
            .map(BusId)
            .find(|bus| self.is_free(cycle, *bus) && feasible(*bus))
    }
}
