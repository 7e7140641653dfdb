//! Integration test: lift pick-up, travel and drop-off.

use super::{DT, assert_single_ownership, occupant, run};
use flowsim::Plant;
use flowsim::lift::Exposure;
use flowsim_common::line::config::{LiftConfig, LiftStopConfig, SegmentConfig};
use flowsim_common::tag::TagValue;

// ── Helpers ─────────────────────────────────────────────────────────

/// `S1` (stop 0) and `S2` (stop 1000) feed lift `L`, which drops at `T`
/// (stop 2000). The lift starts at 2500.
fn lift_line() -> Plant {
    let mut plant = Plant::new("P");
    let area = plant.add_area("A", None).unwrap();
    plant.add_segment(area, &SegmentConfig::new("S1")).unwrap();
    plant.add_segment(area, &SegmentConfig::new("S2")).unwrap();
    let cfg = LiftConfig::new(
        "L",
        vec![LiftStopConfig::new("S1", 0.0), LiftStopConfig::new("S2", 1000.0)],
        LiftStopConfig::new("T", 2000.0),
    );
    plant.add_lift(area, &cfg).unwrap();
    plant.add_segment(area, &SegmentConfig::new("T")).unwrap();
    plant
        .set_lift_stops("L", &[("S1", 0.0), ("S2", 1000.0)], Some(("T", 2000.0)))
        .unwrap();
    plant.switch_on();
    plant
}

fn carrier_occupied(plant: &Plant) -> bool {
    occupant(plant, "L/Carrier").is_some()
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn lift_starts_idle_at_half_height() {
    let mut plant = lift_line();
    run(&mut plant, 3);
    let lift = plant.lift("L").unwrap();
    assert_eq!(lift.position(), 2500.0);
    assert_eq!(lift.exposure(), Exposure::None);
    assert!(plant.tag("P/A/L/InPosition").unwrap().as_bool());
    assert!(!plant.tag("P/A/L/InMotion").unwrap().as_bool());
}

#[test]
fn lift_carries_item_from_source_to_target() {
    let mut plant = lift_line();
    let id = plant.insert_item("S1", 500.0, 1000.0).unwrap();

    let mut ticks = 0;
    while !carrier_occupied(&plant) {
        plant.advance(DT).unwrap();
        ticks += 1;
        assert!(ticks < 20, "lift never picked up the item");
        assert!(plant.lift("L").unwrap().position() <= 2500.0);
    }

    // Picked up at the source stop; the lift waits for the source tail.
    let lift = plant.lift("L").unwrap();
    assert_eq!(lift.position(), 0.0);
    assert_eq!(lift.exposure(), Exposure::Source(0));
    assert!(plant.segment("S1").unwrap().handler().trailing().is_some());
    while plant.segment("S1").unwrap().handler().trailing().is_some() {
        assert_eq!(plant.lift("L").unwrap().position(), 0.0);
        plant.advance(DT).unwrap();
    }

    run(&mut plant, 20);
    assert_eq!(occupant(&plant, "T"), Some(id));
    assert!(plant.segment("L/Carrier").unwrap().handler().is_empty());
    let lift = plant.lift("L").unwrap();
    assert_eq!(lift.position(), 2000.0);
    assert_eq!(lift.exposure(), Exposure::None);
    assert_eq!(plant.counters().handovers, 2);
    assert_single_ownership(&plant);
}

#[test]
fn lift_serves_first_ready_source_in_list_order() {
    let mut plant = lift_line();
    let second = plant.insert_item("S2", 500.0, 1000.0).unwrap();
    let first = plant.insert_item("S1", 500.0, 1000.0).unwrap();

    let mut ticks = 0;
    while !carrier_occupied(&plant) {
        plant.advance(DT).unwrap();
        ticks += 1;
        assert!(ticks < 20);
    }
    assert_eq!(occupant(&plant, "L/Carrier"), Some(first));
    assert_eq!(occupant(&plant, "S2"), Some(second));

    // Both items end up downstream, one after the other.
    plant.remove_item("T").unwrap();
    for _ in 0..60 {
        plant.advance(DT).unwrap();
        if occupant(&plant, "T") == Some(first) {
            plant.remove_item("T").unwrap();
        }
        assert_single_ownership(&plant);
    }
    assert_eq!(occupant(&plant, "T"), Some(second));
    assert!(occupant(&plant, "S2").is_none());
}

#[test]
fn carrier_gate_closed_away_from_target() {
    let mut plant = lift_line();
    plant.insert_item("S1", 500.0, 1000.0).unwrap();

    for _ in 0..30 {
        plant.advance(DT).unwrap();
        let lift = plant.lift("L").unwrap();
        let gate = plant.segment("L/Carrier").unwrap().handler().handover_gate();
        if gate {
            assert_eq!(lift.position(), 2000.0);
            assert_eq!(lift.exposure(), Exposure::Target);
        }
    }
}

#[test]
fn slow_mode_halves_travel_speed() {
    let mut plant = lift_line();
    plant
        .write_tag("P/A/L/Cmd_MoveFast_Toggle", TagValue::Bool(false))
        .unwrap();
    plant.insert_item("S1", 500.0, 1000.0).unwrap();

    // The lift sees S1 ready and starts down from 2500 in the same tick.
    plant.advance(DT).unwrap();
    assert_eq!(plant.lift("L").unwrap().drive().setpoint_speed(), 500.0);
    assert_eq!(plant.lift("L").unwrap().position(), 2000.0);
    plant.advance(DT).unwrap();
    assert_eq!(plant.lift("L").unwrap().position(), 1500.0);
}

#[test]
fn lift_drive_fault_stops_travel_until_reset() {
    let mut plant = lift_line();
    plant.insert_item("S1", 500.0, 1000.0).unwrap();
    plant.inject_drive_fault("L").unwrap();

    run(&mut plant, 5);
    assert_eq!(plant.lift("L").unwrap().position(), 2500.0);
    assert!(plant.errors().fault_active(plant.lift("L").unwrap().node()));

    plant
        .write_tag("P/A/L/Cmd_ResetError_Tap", TagValue::Bool(true))
        .unwrap();
    plant.advance(DT).unwrap();
    assert!(!plant.errors().fault_active(plant.lift("L").unwrap().node()));
    assert!(plant.lift("L").unwrap().position() < 2500.0);
}

#[test]
fn replacing_stops_while_a_source_is_exposed() {
    let mut plant = lift_line();
    let stranded = plant.insert_item("S2", 500.0, 1000.0).unwrap();

    let mut ticks = 0;
    while plant.lift("L").unwrap().exposure() != Exposure::Source(1) {
        plant.advance(DT).unwrap();
        ticks += 1;
        assert!(ticks < 20, "lift never exposed S2");
    }
    assert!(!carrier_occupied(&plant));

    plant
        .set_lift_stops("L", &[("S1", 0.0)], Some(("T", 2000.0)))
        .unwrap();
    assert_eq!(plant.lift("L").unwrap().exposure(), Exposure::None);
    let carrier = plant.segment("L/Carrier").unwrap().handler();
    assert!(!carrier.ready_takeover());
    assert!(carrier.sources().is_empty());

    // S2 is no longer served.
    run(&mut plant, 10);
    assert!(!carrier_occupied(&plant));
    assert_eq!(occupant(&plant, "S2"), Some(stranded));

    // The remaining stop still works.
    let id = plant.insert_item("S1", 500.0, 1000.0).unwrap();
    run(&mut plant, 40);
    assert_eq!(occupant(&plant, "T"), Some(id));
    assert_single_ownership(&plant);
}
