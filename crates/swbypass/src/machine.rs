use crate::ir::{BusId, Cycle};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only facts about the target consumed by the policy selector and the
/// bypass engine.
pub trait ResourceModel {
    fn bus_count(&self) -> usize;
    fn rf_read_ports(&self) -> usize;
    fn rf_write_ports(&self) -> usize;
    fn function_unit_count(&self) -> usize;
    /// The hardware drops register writes whose value is never read.
    fn has_dead_result_elimination(&self) -> bool;

    /// Whether `bus` can carry a value produced at `producer_cycle` directly
    /// to a consumer at `consumer_cycle`.
    fn can_transport(&self, producer_cycle: Cycle, consumer_cycle: Cycle, bus: BusId) -> bool {
        bus.0 < self.bus_count() && producer_cycle <= consumer_cycle
    }

    /// A single producer may feed several bypassed consumers in the same cycle.
    fn supports_broadcast(&self) -> bool {
        false
    }
}

/// Which resource is scarcest on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchitectureClass {
    BusLimited,
    RegisterFileLimited,
    FunctionUnitLimited,
    Balanced,
}

impl ArchitectureClass {
    /// Moves needed per operation: two operands and one result.
    const MOVES_PER_OPERATION: usize = 3;

    /// Picks the class whose resource has the strictly smallest capacity,
    /// counted in moves per cycle. Ties select [`ArchitectureClass::Balanced`].
    pub fn classify(machine: &dyn ResourceModel) -> Self {
        let capacities = [
            (ArchitectureClass::BusLimited, machine.bus_count()),
            (
                ArchitectureClass::RegisterFileLimited,
                machine.rf_read_ports() + machine.rf_write_ports(),
            ),
            (
                ArchitectureClass::FunctionUnitLimited,
                machine.function_unit_count() * Self::MOVES_PER_OPERATION,
            ),
        ];

        let min = capacities.iter().map(|(_, cap)| *cap).min().unwrap_or(0);
        let mut scarcest = capacities.iter().filter(|(_, cap)| *cap == min);
        match (scarcest.next(), scarcest.next()) {
            (Some((class, _)), None) => *class,
            _ => ArchitectureClass::Balanced,
        }
    }

    pub fn default_distance(self) -> u32 {
        match self {
            ArchitectureClass::BusLimited => 9,
            ArchitectureClass::RegisterFileLimited => 8,
            ArchitectureClass::FunctionUnitLimited => 3,
            ArchitectureClass::Balanced => 4,
        }
    }

    /// Distance used on targets without hardware dead-result elimination.
    pub fn default_no_dre_distance(self) -> u32 {
        match self {
            ArchitectureClass::BusLimited => 2,
            ArchitectureClass::RegisterFileLimited => 3,
            ArchitectureClass::FunctionUnitLimited => 2,
            ArchitectureClass::Balanced => 2,
        }
    }
}

impl fmt::Display for ArchitectureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchitectureClass::BusLimited => "bus-limited",
            ArchitectureClass::RegisterFileLimited => "register-file-limited",
            ArchitectureClass::FunctionUnitLimited => "function-unit-limited",
            ArchitectureClass::Balanced => "balanced",
        };
        f.write_str(name)
    }
}

/// A plain resource summary of a target, loadable from a machine file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSummary {
    pub buses: usize,
    pub rf_read_ports: usize,
    pub rf_write_ports: usize,
    pub function_units: usize,
    pub dead_result_elimination: bool,
    pub broadcast: bool,
    /// Buses connected to the function unit result ports. `None` means all of them.
    pub bypass_buses: Option<Vec<BusId>>,
}

impl Default for MachineSummary {
    fn default() -> Self {
        Self {
            buses: 4,
            rf_read_ports: 2,
            rf_write_ports: 1,
            function_units: 2,
            dead_result_elimination: true,
            broadcast: false,
            bypass_buses: None,
        }
    }
}

impl ResourceModel for MachineSummary {
    fn bus_count(&self) -> usize {
        self.buses
    }

    fn rf_read_ports(&self) -> usize {
        self.rf_read_ports
    }

    fn rf_write_ports(&self) -> usize {
        self.rf_write_ports
    }

    fn function_unit_count(&self) -> usize {
        self.function_units
    }

    fn has_dead_result_elimination(&self) -> bool {
        self.dead_result_elimination
    }

    fn can_transport(&self, producer_cycle: Cycle, consumer_cycle: Cycle, bus: BusId) -> bool {
        if bus.0 >= self.buses || producer_cycle > consumer_cycle {
            return false;
        }
        self.bypass_buses
            .as_ref()
            .is_none_or(|connected| connected.contains(&bus))
    }

    fn supports_broadcast(&self) -> bool {
        self.broadcast
    }
}
