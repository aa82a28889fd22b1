use super::graph::BlockGraph;
use super::occupancy::ResourceOccupancy;
use super::{
    BypassPlan, BypassStatistics, RejectReason, Rejection, ScheduleError, SoftwareBypasser,
    SourceRewrite,
};
use crate::HashMap;
use crate::ir::{Block, Cycle, Move, MoveId, ResultId, ValueResult};
use crate::machine::ResourceModel;
use crate::policy::Policy;

/// Greedy software bypasser that looks a bounded number of cycles back from
/// every register read for the move that wrote the value.
///
/// Consumers are visited in (cycle, bus, move id) order and the first
/// acceptable bypass wins, so the same block and policy always give the same
/// plan.
#[derive(Debug, Clone)]
pub struct CycleLookBackBypasser {
    policy: Policy,
    statistics: BypassStatistics,
}

enum Outcome {
    Accepted(SourceRewrite),
    Rejected(RejectReason),
    /// The use already reads the producer's source.
    AlreadyBypassed,
}

struct UseTally {
    remaining: usize,
    all_bypassed: bool,
}

/// Per-block mutable state.
struct BlockState {
    occupancy: ResourceOccupancy,
    producer_slots: HashMap<(ResultId, Cycle), MoveId>,
}

impl CycleLookBackBypasser {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            statistics: BypassStatistics::default(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn evaluate(
        &self,
        graph: &BlockGraph<'_>,
        state: &mut BlockState,
        machine: &dyn ResourceModel,
        limit: u32,
        result: &ValueResult,
        producer: &Move,
        consumer: &Move,
    ) -> Outcome {
        if consumer.source != producer.destination {
            return Outcome::AlreadyBypassed;
        }

        // The graph rejects blocks that redefine the register before the use.
        let found = graph
            .latest_writer(&consumer.source, consumer.cycle, limit)
            .is_some_and(|writer| writer.id == producer.id);
        if !found {
            return Outcome::Rejected(RejectReason::DistanceExceeded);
        }

        let distance = consumer.cycle - producer.cycle;
        if producer.reads_register() && !self.policy.bypass_from_regs {
            return Outcome::Rejected(RejectReason::FromRegisterDisabled);
        }
        if consumer.writes_register() && !self.policy.bypass_to_regs {
            return Outcome::Rejected(RejectReason::ToRegisterDisabled);
        }
        if graph.source_overwritten(result, producer, consumer) {
            return Outcome::Rejected(RejectReason::SourceOverwritten);
        }

        let slot = (result.id, consumer.cycle);
        if !machine.supports_broadcast()
            && state
                .producer_slots
                .get(&slot)
                .is_some_and(|other| *other != consumer.id)
        {
            return Outcome::Rejected(RejectReason::ProducerSlotTaken);
        }

        // The consumer gives up its own slot if it moves to another bus.
        let bus = if machine.can_transport(producer.cycle, consumer.cycle, consumer.bus) {
            Some(consumer.bus)
        } else {
            state.occupancy.first_free(consumer.cycle, |bus| {
                machine.can_transport(producer.cycle, consumer.cycle, bus)
            })
        };
        let Some(bus) = bus else {
            return Outcome::Rejected(RejectReason::TransportUnavailable);
        };

        if bus != consumer.bus {
            state.occupancy.release(consumer.cycle, consumer.bus);
            state.occupancy.claim(consumer.cycle, bus);
        }
        state.producer_slots.insert(slot, consumer.id);

        Outcome::Accepted(SourceRewrite {
            consumer: consumer.id,
            producer: producer.id,
            result: result.id,
            distance,
            bus,
            new_source: producer.source,
        })
    }
}

impl SoftwareBypasser for CycleLookBackBypasser {
    fn bypass_block(
        &mut self,
        block: &Block,
        machine: &dyn ResourceModel,
    ) -> Result<BypassPlan, ScheduleError> {
        let graph = BlockGraph::build(block)?;
        let mut state = BlockState {
            occupancy: ResourceOccupancy::from_block(block, machine.bus_count())?,
            producer_slots: HashMap::default(),
        };
        let limit = self
            .policy
            .effective_distance(machine.has_dead_result_elimination());

        let mut plan = BypassPlan {
            block_version: block.version,
            limit,
            ..Default::default()
        };

        // A live-out value keeps a reader after the block that is never bypassed.
        let mut tallies: HashMap<ResultId, UseTally> = graph
            .results()
            .map(|r| {
                (
                    r.id,
                    UseTally {
                        remaining: r.uses.len(),
                        all_bypassed: !r.live_out,
                    },
                )
            })
            .collect();

        for consumer in graph.processing_order() {
            let Some((result, producer)) = graph.use_of(consumer.id) else {
                continue;
            };

            let outcome = self.evaluate(
                &graph, &mut state, machine, limit, result, producer, consumer,
            );

            let Some(tally) = tallies.get_mut(&result.id) else {
                return Err(ScheduleError::inconsistent(format!(
                    "use {} refers to untracked result {}",
                    consumer.id, result.id
                )));
            };
            tally.remaining -= 1;

            match outcome {
                Outcome::Accepted(rewrite) => plan.rewrites.push(rewrite),
                Outcome::AlreadyBypassed => {}
                Outcome::Rejected(reason) => {
                    log::trace!(
                        "no bypass {} -> {} for {}: {reason}",
                        producer.id,
                        consumer.id,
                        result.id
                    );
                    tally.all_bypassed = false;
                    plan.rejections.push(Rejection {
                        consumer: consumer.id,
                        result: result.id,
                        reason,
                    });
                }
            }

            if tally.remaining == 0
                && tally.all_bypassed
                && self.policy.kill_dead_results
                && !result.eliminated
            {
                plan.eliminated.push(result.id);
            }
        }

        log::debug!(
            "bypassed {} moves, killed {} results, rejected {} candidates (limit {limit})",
            plan.rewrites.len(),
            plan.eliminated.len(),
            plan.rejections.len()
        );
        self.statistics.record(&plan);
        Ok(plan)
    }

    fn short_description(&self) -> String {
        "cycle look-back software bypasser".to_string()
    }

    fn long_description(&self) -> String {
        format!(
            "Cycle look-back software bypasser ({} target). Looks back {} cycles, {} on \
             targets without dead result elimination. Kill dead results: {}, bypass from \
             registers: {}, bypass to registers: {}.",
            self.policy.class,
            self.policy.lookback_distance,
            self.policy.no_dre_lookback_distance,
            self.policy.kill_dead_results,
            self.policy.bypass_from_regs,
            self.policy.bypass_to_regs
        )
    }

    fn statistics(&self) -> &BypassStatistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockBuilder, BusId, Terminal};
    use crate::machine::{ArchitectureClass, MachineSummary};

    fn policy(distance: u32) -> Policy {
        Policy {
            lookback_distance: distance,
            no_dre_lookback_distance: 1,
            kill_dead_results: true,
            bypass_from_regs: false,
            bypass_to_regs: false,
            class: ArchitectureClass::Balanced,
        }
    }

    #[test]
    fn no_dre_target_uses_the_smaller_distance() {
        let mut b = BlockBuilder::new();
        let (_, v) = b.produce(0, BusId(0), Terminal::fu_out(0, 0), Terminal::reg(0, 1));
        b.consume(2, BusId(0), v, Terminal::operand(1, 0));
        let block = b.build();
        let machine = MachineSummary {
            dead_result_elimination: false,
            ..Default::default()
        };

        let mut bypasser = CycleLookBackBypasser::new(policy(4));
        let plan = bypasser.bypass_block(&block, &machine).unwrap();
        assert_eq!(plan.limit, 1);
        assert!(plan.rewrites.is_empty());
        assert_eq!(plan.rejections[0].reason, RejectReason::DistanceExceeded);
    }

    #[test]
    fn redefinition_between_producer_and_use_is_fatal() {
        let mut b = BlockBuilder::new();
        let (_, v) = b.produce(0, BusId(0), Terminal::fu_out(0, 0), Terminal::reg(0, 1));
        b.transport(1, BusId(0), Terminal::imm(9), Terminal::reg(0, 1));
        b.consume(2, BusId(0), v, Terminal::operand(1, 0));
        let block = b.build();

        let mut bypasser = CycleLookBackBypasser::new(policy(4));
        let err = bypasser
            .bypass_block(&block, &MachineSummary::default())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InconsistentSchedule { .. }));
    }

    #[test]
    fn statistics_accumulate_over_blocks() {
        let mut b = BlockBuilder::new();
        let (_, v) = b.produce(0, BusId(0), Terminal::fu_out(0, 0), Terminal::reg(0, 1));
        b.consume(1, BusId(0), v, Terminal::operand(1, 0));
        let block = b.build();
        let machine = MachineSummary::default();

        let mut bypasser = CycleLookBackBypasser::new(policy(4));
        bypasser.bypass_block(&block, &machine).unwrap();
        bypasser.bypass_block(&block, &machine).unwrap();

        let stats = bypasser.statistics();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.bypassed, 2);
        assert_eq!(stats.killed, 2);
        assert_eq!(stats.total_rejected(), 0);
    }

    #[test]
    fn busy_consumer_bus_moves_to_a_free_one() {
        let mut b = BlockBuilder::new();
        let (_, v) = b.produce(0, BusId(0), Terminal::fu_out(0, 0), Terminal::reg(0, 1));
        let c = b.consume(2, BusId(0), v, Terminal::operand(1, 0));
        b.transport(2, BusId(1), Terminal::imm(5), Terminal::trigger(1, 0));
        let block = b.build();
        let machine = MachineSummary {
            buses: 3,
            bypass_buses: Some(vec![BusId(1), BusId(2)]),
            ..Default::default()
        };

        let mut bypasser = CycleLookBackBypasser::new(policy(4));
        let plan = bypasser.bypass_block(&block, &machine).unwrap();
        let rewrite = plan.rewrite_for(c).unwrap();
        assert_eq!(rewrite.bus, BusId(2));
        assert_eq!(rewrite.new_source, Terminal::fu_out(0, 0));
    }
}
