//! Software bypassing for transport-triggered processors.
//!
//! For every value written to the register file, the cycle look-back bypasser
//! decides whether a later read can take the value straight from its producer
//! over the interconnect, and whether the register write then becomes dead.

mod bypass;
mod ir;
mod machine;
mod pass;
mod policy;

pub(crate) use fxhash::FxHashMap as HashMap;
pub(crate) use fxhash::FxHashSet as HashSet;

pub use bypass::{
    BypassPlan, BypassStatistics, CycleLookBackBypasser, RejectReason, Rejection,
    ResourceOccupancy, ScheduleError, SoftwareBypasser, SourceRewrite,
};
pub use ir::{Block, BlockBuilder, BusId, Cycle, Move, MoveId, ResultId, Terminal, ValueResult};
pub use machine::{ArchitectureClass, MachineSummary, ResourceModel};
pub use pass::{
    BypasserModule, ClbBypasserModule, PassError, PassFactory, PassRegistry, SchedulerPass,
};
pub use policy::{
    BYPASS_FROM_REGS_OPTION, BYPASS_TO_REGS_OPTION, CommandLineOverrides,
    KILL_DEAD_RESULTS_OPTION, LOOKBACK_DISTANCE_OPTION, NO_DRE_LOOKBACK_DISTANCE_OPTION,
    NamedOption, OptionError, OptionValue, Policy, PolicySelector,
};
