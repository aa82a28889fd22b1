use crate::ir::{Block, BusId, Cycle, Move, MoveId, ResultId, Terminal, ValueResult};
use smallvec::SmallVec;

/// Incremental construction of a scheduled [`Block`].
///
/// Ids handed back to the builder must have been returned by it; any other
/// id panics.
#[derive(Debug, Clone, Default)]
pub struct BlockBuilder {
    moves: Vec<Move>,
    results: Vec<ValueResult>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a raw move.
    pub fn transport(
        &mut self,
        cycle: Cycle,
        bus: BusId,
        source: Terminal,
        destination: Terminal,
    ) -> MoveId {
        let id = MoveId(self.moves.len());
        self.moves.push(Move {
            id,
            cycle,
            bus,
            source,
            destination,
        });
        id
    }

    /// Record the value written by `producer` as a result with no uses yet.
    pub fn result(&mut self, producer: MoveId) -> ResultId {
        let id = ResultId(self.results.len());
        self.results.push(ValueResult {
            id,
            producer,
            uses: SmallVec::new(),
            live_out: false,
            eliminated: false,
        });
        id
    }

    /// Helper: schedule a register write and record its result.
    pub fn produce(
        &mut self,
        cycle: Cycle,
        bus: BusId,
        source: Terminal,
        register: Terminal,
    ) -> (MoveId, ResultId) {
        let mv = self.transport(cycle, bus, source, register);
        (mv, self.result(mv))
    }

    /// Helper: schedule a read of `result` through its register and record the use.
    pub fn consume(
        &mut self,
        cycle: Cycle,
        bus: BusId,
        result: ResultId,
        destination: Terminal,
    ) -> MoveId {
        let producer = self.results[result.0].producer;
        let register = self.moves[producer.0].destination;
        let mv = self.transport(cycle, bus, register, destination);
        self.add_use(result, mv);
        mv
    }

    /// Panics if `result` did not come from this builder.
    pub fn add_use(&mut self, result: ResultId, consumer: MoveId) {
        self.results[result.0].uses.push(consumer);
    }

    pub fn live_out(&mut self, result: ResultId) {
        self.results[result.0].live_out = true;
    }

    pub fn build(self) -> Block {
        Block {
            moves: self.moves,
            results: self.results,
            version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_reads_the_producer_register() {
        let mut b = BlockBuilder::new();
        let (p, v) = b.produce(0, BusId(0), Terminal::fu_out(0, 0), Terminal::reg(0, 5));
        let c = b.consume(2, BusId(1), v, Terminal::trigger(1, 0));
        let block = b.build();

        assert_eq!(block.find_move(c).unwrap().source, Terminal::reg(0, 5));
        let r = block.find_result(v).unwrap();
        assert_eq!(r.producer, p);
        assert_eq!(r.uses.as_slice(), &[c]);
    }

    #[test]
    #[should_panic]
    fn foreign_result_id_panics() {
        let mut b = BlockBuilder::new();
        b.live_out(ResultId(3));
    }
}
