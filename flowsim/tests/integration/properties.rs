//! Integration test: invariants under random operation sequences.

use super::{DT, assert_single_ownership, occupant};
use flowsim::id::ErrorNodeId;
use flowsim::{ErrorTree, FaultKind, ItemId, Plant};
use flowsim_common::line::config::{LiftConfig, LiftStopConfig, SegmentConfig, StationConfig};
use flowsim_common::tag::TagValue;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ── Generators ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Insert(usize, f64, f64),
    Remove(usize),
    Interrupt(usize, bool),
    Jam(usize),
    Reset,
    Relink(usize, Option<usize>, Option<usize>),
    BatchSize(i64),
    Abort,
    LiftStops(usize),
    Step(usize),
}

/// Stop lists the lift is switched between.
const STOP_SETS: [&[(&str, f64)]; 4] = [
    &[("LA", 0.0), ("LB", 1000.0)],
    &[("LB", 1000.0), ("LA", 0.0)],
    &[("LA", 0.0)],
    &[("LB", 1000.0)],
];

fn arb_chain() -> impl Strategy<Value = Vec<(f64, f64)>> {
    proptest::collection::vec((200.0..2000.0f64, 50.0..600.0f64), 2..6)
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            (0..16usize, 100.0..2500.0f64, 0.0..1.0f64)
                .prop_map(|(s, len, at)| Op::Insert(s, len, at)),
            (0..16usize).prop_map(Op::Remove),
            (0..16usize, any::<bool>()).prop_map(|(s, on)| Op::Interrupt(s, on)),
            (0..16usize).prop_map(Op::Jam),
            Just(Op::Reset),
            (0..8usize, proptest::option::of(0..8usize), proptest::option::of(0..8usize))
                .prop_map(|(s, from, to)| Op::Relink(s, from, to)),
            (1..5i64).prop_map(Op::BatchSize),
            Just(Op::Abort),
            (0..STOP_SETS.len()).prop_map(Op::LiftStops),
            (1..6usize).prop_map(Op::Step),
        ],
        1..40,
    )
}

/// Random chain `S0..` feeding station `ST` and then `OUT`, next to lift `L`
/// which picks up at `LA` and `LB` and drops at `LT`.
///
/// Returns the plant, every segment name and the chain names.
fn build(segments: &[(f64, f64)]) -> (Plant, Vec<String>, Vec<String>) {
    let mut plant = Plant::new("P");
    let area = plant.add_area("A", None).unwrap();
    let chain: Vec<String> = (0..segments.len()).map(|i| format!("S{i}")).collect();
    for (name, (length, speed)) in chain.iter().zip(segments) {
        let cfg = SegmentConfig::new(name.as_str())
            .with_length(*length)
            .with_speed(*speed);
        plant.add_segment(area, &cfg).unwrap();
    }
    plant
        .add_station(area, &StationConfig::new("ST").with_batch_size(2))
        .unwrap();
    for name in ["OUT", "LA", "LB", "LT"] {
        plant.add_segment(area, &SegmentConfig::new(name)).unwrap();
    }
    let lift = LiftConfig::new(
        "L",
        vec![LiftStopConfig::new("LA", 0.0), LiftStopConfig::new("LB", 1000.0)],
        LiftStopConfig::new("LT", 2000.0),
    );
    plant.add_lift(area, &lift).unwrap();

    for pair in chain.windows(2) {
        plant.link(&pair[0], &pair[1]).unwrap();
    }
    if let Some(last) = chain.last() {
        plant.link(last, "ST").unwrap();
    }
    plant.link("ST", "OUT").unwrap();
    plant
        .set_lift_stops("L", STOP_SETS[0], Some(("LT", 2000.0)))
        .unwrap();
    plant.switch_on();

    let names = plant.segments().map(|s| s.name().to_string()).collect();
    (plant, names, chain)
}

fn check_line(plant: &Plant) -> Result<(), TestCaseError> {
    assert_single_ownership(plant);
    let c = plant.counters();
    prop_assert_eq!(c.inserted - c.removed, plant.item_count() as u64);
    for seg in plant.segments() {
        let h = seg.handler();
        if h.has_occupant() {
            prop_assert!(h.position() >= 0.0 && h.position() <= seg.length());
            prop_assert!(h.trailing().is_none());
        }
    }
    Ok(())
}

/// Occupied segments that are free to move, with their item and position.
fn positions(plant: &Plant) -> Vec<(String, ItemId, f64)> {
    let released = plant.area("A").is_some_and(|a| a.state().released());
    plant
        .segments()
        .filter(|_| released)
        .filter(|seg| !plant.errors().fault_active(seg.node()))
        .filter_map(|seg| {
            let item = seg.handler().occupant()?;
            Some((seg.name().to_string(), item.id(), seg.position()))
        })
        .collect()
}

/// An item still on the same segment never moves backwards.
fn check_progress(plant: &Plant, before: &[(String, ItemId, f64)]) -> Result<(), TestCaseError> {
    for (name, id, position) in before {
        if occupant(plant, name) == Some(*id) {
            let now = plant.segment(name).unwrap().position();
            prop_assert!(now >= *position, "{} moved back from {} to {}", name, position, now);
        }
    }
    Ok(())
}

// ── Error tree model ────────────────────────────────────────────────

/// Parent index for each node after the root.
fn arb_tree() -> impl Strategy<Value = Vec<usize>> {
    (1..16usize).prop_flat_map(|n| {
        (0..n)
            .map(|i| 0..=i)
            .collect::<Vec<_>>()
    })
}

fn arb_fault_ops() -> impl Strategy<Value = Vec<(usize, bool)>> {
    proptest::collection::vec((0..17usize, any::<bool>()), 1..50)
}

fn descendants(tree: &ErrorTree, nodes: &[ErrorNodeId], of: ErrorNodeId) -> Vec<ErrorNodeId> {
    nodes
        .iter()
        .copied()
        .filter(|n| tree.ancestors(*n).contains(&of))
        .collect()
}

// ── Properties ──────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Items are conserved, owned exactly once and only move forward under
    /// any command mix, including runtime relinking of segments and lift
    /// stops.
    #[test]
    fn line_invariants_hold(segments in arb_chain(), ops in arb_ops()) {
        let (mut plant, names, chain) = build(&segments);
        for op in ops {
            match op {
                Op::Insert(s, len, at) => {
                    let name = &names[s % names.len()];
                    let length = plant.segment(name).unwrap().length();
                    // Refused while the segment holds an item or a tail.
                    let _ = plant.insert_item(name, len, at * length);
                }
                Op::Remove(s) => {
                    plant.remove_item(&names[s % names.len()]).unwrap();
                }
                Op::Interrupt(s, on) => {
                    let seg = plant.segment(&names[s % names.len()]).unwrap();
                    let tag = format!("{}/Cmd_Interrupt_Toggle", seg.prefix());
                    plant.write_tag(&tag, on.into()).unwrap();
                }
                Op::Jam(s) => plant.inject_jam(&names[s % names.len()]).unwrap(),
                Op::Reset => plant.reset_faults().unwrap(),
                Op::Relink(s, from, to) => {
                    let pick = |i: usize| chain[i % chain.len()].as_str();
                    let sources: Vec<&str> = from.map(pick).into_iter().collect();
                    // Self-links are refused.
                    let _ = plant.set_adjacent(pick(s), &sources, to.map(pick));
                }
                Op::BatchSize(n) => {
                    plant.write_tag("P/A/ST/BatchSize", TagValue::Int(n)).unwrap();
                }
                Op::Abort => plant.abort_station("ST").unwrap(),
                Op::LiftStops(i) => {
                    plant
                        .set_lift_stops("L", STOP_SETS[i], Some(("LT", 2000.0)))
                        .unwrap();
                }
                Op::Step(n) => {
                    for _ in 0..n {
                        let before = positions(&plant);
                        plant.advance(DT).unwrap();
                        check_line(&plant)?;
                        check_progress(&plant, &before)?;
                    }
                }
            }
            check_line(&plant)?;
        }
    }

    /// Every ancestor's child map holds exactly the source ids of its
    /// faulted descendants.
    #[test]
    fn child_maps_mirror_descendant_faults(
        parents in arb_tree(),
        ops in arb_fault_ops(),
    ) {
        let mut tree = ErrorTree::new();
        let mut nodes = vec![tree.add_node("N0", "N0")];
        for (i, parent) in parents.iter().enumerate() {
            let name = format!("N{}", i + 1);
            let id = tree.add_child(name.as_str(), &name, nodes[*parent]).unwrap();
            nodes.push(id);
        }

        for (index, raise) in ops {
            let node = nodes[index % nodes.len()];
            if raise {
                tree.raise(node, FaultKind::Jam, "Jam").unwrap();
            } else {
                tree.clear_error(node).unwrap();
            }

            for &n in &nodes {
                let expected: BTreeSet<String> = descendants(&tree, &nodes, n)
                    .into_iter()
                    .filter(|d| tree.error_pending(*d))
                    .map(|d| tree.node(d).unwrap().source_id().to_string())
                    .collect();
                let actual: BTreeSet<String> =
                    tree.node(n).unwrap().child_faults().keys().cloned().collect();
                prop_assert_eq!(&actual, &expected);
                prop_assert_eq!(
                    tree.fault_active(n),
                    tree.error_pending(n) || !expected.is_empty()
                );
            }
        }
    }
}
