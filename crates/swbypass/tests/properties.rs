use proptest::prelude::*;
use std::collections::BTreeMap;
use swbypass::{
    Block, BlockBuilder, BusId, CommandLineOverrides, CycleLookBackBypasser, MachineSummary,
    PolicySelector, SoftwareBypasser, Terminal,
};

/// Source kind, producer cycle, uses as (distance, writes a register), live-out.
type ValueSpec = (u8, u32, Vec<(u32, bool)>, bool);

fn arb_values() -> impl Strategy<Value = Vec<ValueSpec>> {
    prop::collection::vec(
        (
            0u8..3,
            0u32..6,
            prop::collection::vec((1u32..10, any::<bool>()), 1..4),
            any::<bool>(),
        ),
        1..6,
    )
}

/// Every value gets its own register in file 0. Producers read file 2 and
/// register consumers write file 1, so no value is redefined before its uses.
fn build_block(values: &[ValueSpec]) -> Block {
    let mut per_cycle: BTreeMap<u32, usize> = BTreeMap::new();
    let mut next_bus = |cycle: u32| {
        let slot = per_cycle.entry(cycle).or_insert(0);
        *slot += 1;
        BusId(*slot - 1)
    };

    let mut b = BlockBuilder::new();
    for (i, (kind, cycle, uses, live_out)) in values.iter().enumerate() {
        let source = match kind {
            0 => Terminal::fu_out(i % 3, 0),
            1 => Terminal::reg(2, i),
            _ => Terminal::imm(i as i64),
        };
        let (_, v) = b.produce(*cycle, next_bus(*cycle), source, Terminal::reg(0, i));
        for (k, (distance, to_reg)) in uses.iter().enumerate() {
            let at = cycle + distance;
            let destination = if *to_reg {
                Terminal::reg(1, i * 4 + k)
            } else {
                Terminal::operand(3 + i, k)
            };
            b.consume(at, next_bus(at), v, destination);
        }
        if *live_out {
            b.live_out(v);
        }
    }
    b.build()
}

fn bypasser(
    machine: &MachineSummary,
    lookback: u32,
    kill: bool,
    from_regs: bool,
    to_regs: bool,
) -> CycleLookBackBypasser {
    let mut policy = PolicySelector::new().resolve(
        machine,
        &CommandLineOverrides {
            lookback_distance: Some(lookback),
        },
    );
    policy.kill_dead_results = kill;
    policy.bypass_from_regs = from_regs;
    policy.bypass_to_regs = to_regs;
    CycleLookBackBypasser::new(policy)
}

fn arb_machine() -> impl Strategy<Value = MachineSummary> {
    (any::<bool>(), any::<bool>()).prop_map(|(dre, broadcast)| MachineSummary {
        buses: 32,
        dead_result_elimination: dre,
        broadcast,
        ..Default::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn plans_respect_the_policy(
        values in arb_values(),
        machine in arb_machine(),
        lookback in 0u32..10,
        kill in any::<bool>(),
        from_regs in any::<bool>(),
        to_regs in any::<bool>(),
    ) {
        let block = build_block(&values);
        let mut engine = bypasser(&machine, lookback, kill, from_regs, to_regs);
        let plan = engine.bypass_block(&block, &machine).unwrap();

        for rewrite in &plan.rewrites {
            let producer = block.find_move(rewrite.producer).unwrap();
            let consumer = block.find_move(rewrite.consumer).unwrap();
            prop_assert!(rewrite.distance <= plan.limit);
            prop_assert_eq!(rewrite.distance, consumer.cycle - producer.cycle);
            prop_assert_eq!(rewrite.new_source, producer.source);
            prop_assert!(from_regs || !producer.reads_register());
            prop_assert!(to_regs || !consumer.writes_register());
        }

        for result in &block.results {
            let all_bypassed = result.uses.iter().all(|u| plan.rewrite_for(*u).is_some());
            prop_assert_eq!(
                plan.is_eliminated(result.id),
                kill && !result.live_out && all_bypassed
            );
        }

        prop_assert_eq!(
            plan.rewrites.len() + plan.rejections.len(),
            block.results.iter().map(|r| r.uses.len()).sum::<usize>()
        );
    }

    #[test]
    fn plans_are_deterministic(
        values in arb_values(),
        machine in arb_machine(),
        lookback in 0u32..10,
    ) {
        let block = build_block(&values);
        let first = bypasser(&machine, lookback, true, true, true)
            .bypass_block(&block, &machine)
            .unwrap();
        let second = bypasser(&machine, lookback, true, true, true)
            .bypass_block(&block, &machine)
            .unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn applied_plan_is_not_repeated(
        values in arb_values(),
        machine in arb_machine(),
        lookback in 0u32..10,
    ) {
        let mut block = build_block(&values);
        let mut engine = bypasser(&machine, lookback, true, false, true);
        let first = engine.bypass_block(&block, &machine).unwrap();
        block.apply(&first).unwrap();

        for rewrite in &first.rewrites {
            let consumer = block.find_move(rewrite.consumer).unwrap();
            prop_assert_eq!(consumer.source, rewrite.new_source);
            prop_assert_eq!(consumer.bus, rewrite.bus);
        }

        let second = engine.bypass_block(&block, &machine).unwrap();
        prop_assert_eq!(second.block_version, 1);
        for rewrite in &second.rewrites {
            prop_assert!(first.rewrite_for(rewrite.consumer).is_none());
        }
        for id in &second.eliminated {
            prop_assert!(!first.is_eliminated(*id));
        }
    }
}
