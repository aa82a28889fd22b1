use super::ScheduleError;
use crate::{HashMap, HashSet};
use crate::ir::{Block, Cycle, Move, MoveId, Terminal, ValueResult};
use itertools::Itertools;
use std::collections::BTreeMap;

/// Checked, cycle-indexed view of a block's moves and results.
pub(super) struct BlockGraph<'a> {
    results: Vec<&'a ValueResult>,
    uses: HashMap<MoveId, (&'a ValueResult, &'a Move)>,
    by_cycle: BTreeMap<Cycle, Vec<&'a Move>>,
}

impl<'a> BlockGraph<'a> {
    pub(super) fn build(block: &'a Block) -> Result<Self, ScheduleError> {
        let mut moves: HashMap<MoveId, &'a Move> = HashMap::default();
        for m in &block.moves {
            if moves.insert(m.id, m).is_some() {
                return Err(ScheduleError::inconsistent(format!(
                    "duplicate move id {}",
                    m.id
                )));
            }
        }

        let mut results: Vec<&'a ValueResult> = Vec::with_capacity(block.results.len());
        let mut producers: HashSet<MoveId> = HashSet::default();
        let mut uses: HashMap<MoveId, (&'a ValueResult, &'a Move)> = HashMap::default();
        let mut register_reads: Vec<(&'a ValueResult, &'a Move, &'a Move)> = Vec::new();

        for r in block.results.iter().sorted_by_key(|r| r.id) {
            if results.last().is_some_and(|prev| prev.id == r.id) {
                return Err(ScheduleError::inconsistent(format!(
                    "duplicate result id {}",
                    r.id
                )));
            }
            results.push(r);

            let producer = *moves.get(&r.producer).ok_or_else(|| {
                ScheduleError::inconsistent(format!(
                    "result {} is produced by unknown move {}",
                    r.id, r.producer
                ))
            })?;
            if !producer.writes_register() {
                return Err(ScheduleError::inconsistent(format!(
                    "producer {} of {} writes {}, not a register",
                    producer.id, r.id, producer.destination
                )));
            }
            if !producers.insert(producer.id) {
                return Err(ScheduleError::inconsistent(format!(
                    "move {} produces more than one result",
                    producer.id
                )));
            }

            for u in &r.uses {
                let consumer = *moves.get(u).ok_or_else(|| {
                    ScheduleError::inconsistent(format!(
                        "result {} is used by unknown move {u}",
                        r.id
                    ))
                })?;
                if uses.insert(*u, (r, producer)).is_some() {
                    return Err(ScheduleError::inconsistent(format!(
                        "move {u} is recorded as a use of more than one result"
                    )));
                }
                if consumer.cycle <= producer.cycle {
                    return Err(ScheduleError::inconsistent(format!(
                        "use {u} in cycle {} does not follow producer {} in cycle {}",
                        consumer.cycle, producer.id, producer.cycle
                    )));
                }
                if consumer.source != producer.destination && consumer.source != producer.source {
                    return Err(ScheduleError::inconsistent(format!(
                        "use {u} of {} reads {}, but {} moves {} to {}",
                        r.id, consumer.source, producer.id, producer.source, producer.destination
                    )));
                }
                if consumer.source == producer.destination {
                    register_reads.push((r, producer, consumer));
                }
            }
        }

        let mut by_cycle: BTreeMap<Cycle, Vec<&'a Move>> = BTreeMap::new();
        let chunks = block
            .moves
            .iter()
            .sorted_by_key(|m| (m.cycle, m.bus, m.id))
            .chunk_by(|m| m.cycle);
        for (cycle, group) in &chunks {
            by_cycle.insert(cycle, group.collect());
        }

        // A use must still find the value in the register, however far back the producer is.
        for (r, producer, consumer) in register_reads {
            let redefinition = by_cycle
                .range(producer.cycle..consumer.cycle)
                .flat_map(|(_, moves)| moves.iter())
                .find(|m| m.id != producer.id && m.destination == producer.destination);
            if let Some(writer) = redefinition {
                return Err(ScheduleError::inconsistent(format!(
                    "use {} of {} reads {}, but {} overwrites it after producer {}",
                    consumer.id, r.id, consumer.source, writer.id, producer.id
                )));
            }
        }

        Ok(Self {
            results,
            uses,
            by_cycle,
        })
    }

    /// Moves ordered by cycle, then bus, then id.
    pub(super) fn processing_order(&self) -> impl Iterator<Item = &'a Move> + '_ {
        self.by_cycle.values().flat_map(|moves| moves.iter().copied())
    }

    /// Results in id order.
    pub(super) fn results(&self) -> impl Iterator<Item = &'a ValueResult> + '_ {
        self.results.iter().copied()
    }

    /// The result `consumer` is a recorded use of, with its producing move.
    pub(super) fn use_of(&self, consumer: MoveId) -> Option<(&'a ValueResult, &'a Move)> {
        self.uses.get(&consumer).copied()
    }

    /// Latest move writing `register` in the `window` cycles before `before`.
    pub(super) fn latest_writer(
        &self,
        register: &Terminal,
        before: Cycle,
        window: u32,
    ) -> Option<&'a Move> {
        let first = before.saturating_sub(window);
        self.by_cycle
            .range(first..before)
            .rev()
            .find_map(|(_, moves)| moves.iter().copied().find(|m| m.destination == *register))
    }

    /// Whether the value `producer` read is gone by the time `consumer` would read it directly.
    ///
    /// A register source is lost when it is written in `[p, c)`. A function
    /// unit result is lost when the unit is triggered again in `[p, c)`, or
    /// when a move that is not a use of the same result reads the port in
    /// `(p, c]`.
    pub(super) fn source_overwritten(
        &self,
        result: &ValueResult,
        producer: &Move,
        consumer: &Move,
    ) -> bool {
        match producer.source {
            Terminal::Immediate { .. } => false,
            Terminal::Register { .. } => self
                .by_cycle
                .range(producer.cycle..consumer.cycle)
                .flat_map(|(_, moves)| moves.iter())
                .any(|m| m.id != producer.id && m.destination == producer.source),
            Terminal::FuOutput { unit, .. } => {
                let retriggered = self
                    .by_cycle
                    .range(producer.cycle..consumer.cycle)
                    .flat_map(|(_, moves)| moves.iter())
                    .any(|m| {
                        matches!(
                            m.destination,
                            Terminal::FuInput { unit: u, trigger: true, .. } if u == unit
                        )
                    });
                retriggered || self.read_by_other(result, producer, consumer)
            }
            Terminal::FuInput { .. } => self.read_by_other(result, producer, consumer),
        }
    }

    /// A move other than `consumer`, and not a use of `result`, reads the
    /// producer's source in `(p, c]`.
    fn read_by_other(&self, result: &ValueResult, producer: &Move, consumer: &Move) -> bool {
        self.by_cycle
            .range(producer.cycle + 1..=consumer.cycle)
            .flat_map(|(_, moves)| moves.iter())
            .any(|m| {
                m.id != consumer.id
                    && m.source == producer.source
                    && self.uses.get(&m.id).is_none_or(|(r, _)| r.id != result.id)
            })
    }
}
