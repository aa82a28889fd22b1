use crate::ir::{Block, BusId, MoveId, ResultId, Terminal};
use crate::machine::ResourceModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

mod cycle_lookback;
mod graph;
mod occupancy;

pub use cycle_lookback::CycleLookBackBypasser;
pub use occupancy::ResourceOccupancy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Inconsistent schedule: {detail}")]
    InconsistentSchedule { detail: String },
}

impl ScheduleError {
    pub(crate) fn inconsistent(detail: impl Into<String>) -> Self {
        ScheduleError::InconsistentSchedule {
            detail: detail.into(),
        }
    }
}

/// Why a bypass candidate was not taken. These are normal outcomes of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The producer lies further back than the look-back limit.
    DistanceExceeded,
    /// The producer copies a register and `bypass-from-regs` is off.
    FromRegisterDisabled,
    /// The consumer writes a register and `bypass-to-regs` is off.
    ToRegisterDisabled,
    /// The producer's source no longer holds the value at the consumer's cycle.
    SourceOverwritten,
    /// No free bus can carry the value at the consumer's cycle.
    TransportUnavailable,
    /// The producer already feeds another bypass in this cycle.
    ProducerSlotTaken,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::DistanceExceeded => "distance exceeded",
            RejectReason::FromRegisterDisabled => "bypass from registers disabled",
            RejectReason::ToRegisterDisabled => "bypass to registers disabled",
            RejectReason::SourceOverwritten => "source overwritten",
            RejectReason::TransportUnavailable => "no transport available",
            RejectReason::ProducerSlotTaken => "producer slot taken",
        };
        f.write_str(s)
    }
}

/// An accepted bypass: `consumer` reads `new_source` over `bus` instead of the register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRewrite {
    pub consumer: MoveId,
    pub producer: MoveId,
    pub result: ResultId,
    pub distance: u32,
    pub bus: BusId,
    pub new_source: Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub consumer: MoveId,
    pub result: ResultId,
    pub reason: RejectReason,
}

/// The edits computed for one block. Applied with [`Block::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassPlan {
    pub block_version: u64,
    /// Look-back limit in effect for the block.
    pub limit: u32,
    pub rewrites: Vec<SourceRewrite>,
    /// Results whose register write is dead after the rewrites.
    pub eliminated: Vec<ResultId>,
    pub rejections: Vec<Rejection>,
}

impl BypassPlan {
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty() && self.eliminated.is_empty()
    }

    pub fn rewrite_for(&self, consumer: MoveId) -> Option<&SourceRewrite> {
        self.rewrites.iter().find(|r| r.consumer == consumer)
    }

    pub fn is_eliminated(&self, result: ResultId) -> bool {
        self.eliminated.contains(&result)
    }
}

impl fmt::Display for BypassPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "plan for block version {} (limit {})",
            self.block_version, self.limit
        )?;
        for r in &self.rewrites {
            writeln!(
                f,
                "  bypass {} -> {} via {}: {} reads {} (distance {})",
                r.producer, r.consumer, r.bus, r.consumer, r.new_source, r.distance
            )?;
        }
        for id in &self.eliminated {
            writeln!(f, "  kill {id}")?;
        }
        for rej in &self.rejections {
            writeln!(f, "  reject {} for {}: {}", rej.consumer, rej.result, rej.reason)?;
        }
        Ok(())
    }
}

/// Counters accumulated by a bypasser over every block it processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BypassStatistics {
    pub blocks: usize,
    pub bypassed: usize,
    pub killed: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl BypassStatistics {
    pub(crate) fn record(&mut self, plan: &BypassPlan) {
        self.blocks += 1;
        self.bypassed += plan.rewrites.len();
        self.killed += plan.eliminated.len();
        for rej in &plan.rejections {
            *self.rejected.entry(rej.reason).or_default() += 1;
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Capability shared by software bypasser implementations.
pub trait SoftwareBypasser {
    /// Computes the bypass plan of one block without modifying it.
    fn bypass_block(
        &mut self,
        block: &Block,
        machine: &dyn ResourceModel,
    ) -> Result<BypassPlan, ScheduleError>;

    fn short_description(&self) -> String;

    fn long_description(&self) -> String;

    fn statistics(&self) -> &BypassStatistics;
}
