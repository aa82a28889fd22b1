use crate::bypass::{BypassPlan, ScheduleError};
use crate::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

mod builder;
pub use builder::BlockBuilder;

/// Instruction cycle within a basic block.
pub type Cycle = u32;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveId(pub usize);

impl fmt::Display for MoveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(pub usize);

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Index of an interconnect bus (transport slot) of the target.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(pub usize);

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// One end of a move.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Terminal {
    Register { file: usize, index: usize },
    /// Result port of a function unit.
    FuOutput { unit: usize, port: usize },
    /// Operand port of a function unit. Writing a trigger port starts the operation.
    FuInput {
        unit: usize,
        port: usize,
        #[serde(default)]
        trigger: bool,
    },
    Immediate { value: i64 },
}

impl Terminal {
    pub fn reg(file: usize, index: usize) -> Self {
        Terminal::Register { file, index }
    }

    pub fn fu_out(unit: usize, port: usize) -> Self {
        Terminal::FuOutput { unit, port }
    }

    pub fn operand(unit: usize, port: usize) -> Self {
        Terminal::FuInput {
            unit,
            port,
            trigger: false,
        }
    }

    pub fn trigger(unit: usize, port: usize) -> Self {
        Terminal::FuInput {
            unit,
            port,
            trigger: true,
        }
    }

    pub fn imm(value: i64) -> Self {
        Terminal::Immediate { value }
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Terminal::Register { .. })
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Register { file, index } => write!(f, "rf{file}.{index}"),
            Terminal::FuOutput { unit, port } => write!(f, "fu{unit}.out{port}"),
            Terminal::FuInput {
                unit,
                port,
                trigger,
            } => {
                write!(f, "fu{unit}.in{port}")?;
                if *trigger {
                    write!(f, "t")?;
                }
                Ok(())
            }
            Terminal::Immediate { value } => write!(f, "#{value}"),
        }
    }
}

/// A single scheduled transport over the interconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub id: MoveId,
    pub cycle: Cycle,
    pub bus: BusId,
    pub source: Terminal,
    pub destination: Terminal,
}

impl Move {
    pub fn reads_register(&self) -> bool {
        self.source.is_register()
    }

    pub fn writes_register(&self) -> bool {
        self.destination.is_register()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "c{} {} {}: {} -> {}",
            self.cycle, self.bus, self.id, self.source, self.destination
        )
    }
}

/// A value written to the register file by its producing move, and the
/// moves that read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueResult {
    pub id: ResultId,
    pub producer: MoveId,
    #[serde(default)]
    pub uses: SmallVec<[MoveId; 4]>,
    /// The register copy is read after the block ends.
    #[serde(default)]
    pub live_out: bool,
    /// The register write was found dead by an applied plan.
    #[serde(default)]
    pub eliminated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub moves: Vec<Move>,
    pub results: Vec<ValueResult>,
    /// Bumped every time a plan is applied.
    #[serde(default)]
    pub version: u64,
}

impl Block {
    pub fn find_move(&self, id: MoveId) -> Option<&Move> {
        self.moves.iter().find(|m| m.id == id)
    }

    pub fn find_result(&self, id: ResultId) -> Option<&ValueResult> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Applies the edits of a plan computed for this exact block version.
    ///
    /// Nothing is changed when the plan does not match; the write moves of
    /// eliminated results stay in place for the scheduler to remove.
    pub fn apply(&mut self, plan: &BypassPlan) -> Result<(), ScheduleError> {
        if plan.block_version != self.version {
            return Err(ScheduleError::InconsistentSchedule {
                detail: format!(
                    "plan computed for block version {} applied to version {}",
                    plan.block_version, self.version
                ),
            });
        }

        let move_index: HashMap<MoveId, usize> = self
            .moves
            .iter()
            .enumerate()
            .map(|(idx, m)| (m.id, idx))
            .collect();
        let result_index: HashMap<ResultId, usize> = self
            .results
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.id, idx))
            .collect();

        for rewrite in &plan.rewrites {
            if !move_index.contains_key(&rewrite.consumer) {
                return Err(ScheduleError::InconsistentSchedule {
                    detail: format!("rewrite targets unknown move {}", rewrite.consumer),
                });
            }
        }
        for id in &plan.eliminated {
            if !result_index.contains_key(id) {
                return Err(ScheduleError::InconsistentSchedule {
                    detail: format!("plan eliminates unknown result {id}"),
                });
            }
        }

        for rewrite in &plan.rewrites {
            let mv = &mut self.moves[move_index[&rewrite.consumer]];
            mv.source = rewrite.new_source;
            mv.bus = rewrite.bus;
        }
        for id in &plan.eliminated {
            self.results[result_index[id]].eliminated = true;
        }

        self.version += 1;
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut moves: Vec<_> = self.moves.iter().collect();
        moves.sort_by_key(|m| (m.cycle, m.bus, m.id));
        for m in moves {
            writeln!(f, "{m}")?;
        }
        for r in &self.results {
            write!(f, "{} = {} uses [", r.id, r.producer)?;
            for (i, u) in r.uses.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{u}")?;
            }
            write!(f, "]")?;
            if r.live_out {
                write!(f, " live-out")?;
            }
            if r.eliminated {
                write!(f, " eliminated")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
