//! Integration test: belt transport and hand-off between segments.

use super::{DT, assert_single_ownership, chain, occupant, run};
use flowsim_common::tag::TagValue;

// ── Single segment ──────────────────────────────────────────────────

#[test]
fn item_stops_at_border_without_target() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant.insert_item("S1", 500.0, 500.0).unwrap();

    let mut last = 500.0;
    for _ in 0..5 {
        plant.advance(DT).unwrap();
        let position = plant.segment("S1").unwrap().position();
        assert!(position >= last, "position moved backwards");
        last = position;
    }
    assert_eq!(last, 1000.0);

    run(&mut plant, 3);
    let s1 = plant.segment("S1").unwrap();
    assert_eq!(s1.position(), 1000.0);
    assert!(s1.handler().at_border());
    assert!(!s1.handler().run_drive());
}

#[test]
fn disabled_area_holds_items() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant.switch_off();
    plant.insert_item("S1", 500.0, 200.0).unwrap();
    run(&mut plant, 3);
    assert_eq!(plant.segment("S1").unwrap().position(), 200.0);
    assert!(!plant.tag("P/A/S1/TransportAllowed").unwrap().as_bool());
}

// ── Hand-off ────────────────────────────────────────────────────────

#[test]
fn hand_off_moves_ownership_in_one_tick() {
    let mut plant = chain(&[("S1", 1000.0, 1000.0), ("S2", 1000.0, 1000.0)]);
    let id = plant.insert_item("S1", 500.0, 0.0).unwrap();

    plant.advance(DT).unwrap();
    assert_eq!(occupant(&plant, "S1"), None);
    assert_eq!(occupant(&plant, "S2"), Some(id));
    assert_eq!(plant.segment("S2").unwrap().position(), 0.0);

    let tail = plant.segment("S1").unwrap().handler().trailing().copied().unwrap();
    assert_eq!(tail.item, id);
    assert_eq!(tail.position, 1000.0);
    assert_eq!(plant.counters().handovers, 1);
    assert_single_ownership(&plant);

    plant.advance(DT).unwrap();
    assert!(plant.segment("S1").unwrap().handler().is_empty());
    assert_eq!(plant.segment("S2").unwrap().position(), 1000.0);
}

#[test]
fn item_travels_down_a_chain() {
    let mut plant = chain(&[
        ("S1", 1000.0, 250.0),
        ("S2", 800.0, 250.0),
        ("S3", 1200.0, 250.0),
    ]);
    let id = plant.insert_new_item("S1").unwrap();

    for _ in 0..40 {
        plant.advance(DT).unwrap();
        assert_single_ownership(&plant);
    }
    assert_eq!(occupant(&plant, "S3"), Some(id));
    assert_eq!(plant.segment("S3").unwrap().position(), 1200.0);
    assert_eq!(plant.counters().handovers, 2);
    assert_eq!(plant.counters().inserted, 1);
    assert_eq!(plant.counters().removed, 0);
}

#[test]
fn occupied_receiver_refuses_hand_off() {
    let mut plant = chain(&[("S1", 1000.0, 1000.0), ("S2", 1000.0, 1000.0)]);
    plant.insert_item("S2", 500.0, 1000.0).unwrap();
    plant.insert_item("S1", 500.0, 1000.0).unwrap();

    run(&mut plant, 3);
    assert!(occupant(&plant, "S1").is_some());
    assert!(plant.tag("P/A/S1/ReadyHandover").unwrap().as_bool());

    plant.remove_item("S2").unwrap();
    plant.advance(DT).unwrap();
    assert!(occupant(&plant, "S1").is_none());
    assert!(occupant(&plant, "S2").is_some());
}

#[test]
fn item_longer_than_segment_leaves_a_tail() {
    let mut plant = chain(&[("S1", 300.0, 200.0), ("S2", 1000.0, 200.0)]);
    plant.insert_item("S1", 500.0, 300.0).unwrap();

    plant.advance(DT).unwrap();
    assert!(occupant(&plant, "S2").is_some());
    assert!(plant.segment("S1").unwrap().handler().trailing().is_some());
    assert!(plant.tag("P/A/S1/Photoeye").unwrap().as_bool());
    assert!(plant.insert_new_item("S1").is_err());

    run(&mut plant, 3);
    assert!(plant.segment("S1").unwrap().handler().is_empty());
    assert!(!plant.tag("P/A/S1/Photoeye").unwrap().as_bool());
    assert_eq!(plant.segment("S2").unwrap().position(), 600.0);
}

#[test]
fn interrupt_blocks_hand_off_until_released() {
    let mut plant = chain(&[("S1", 1000.0, 500.0), ("S2", 1000.0, 500.0)]);
    plant.insert_item("S1", 500.0, 1000.0).unwrap();
    plant
        .write_tag("P/A/S1/Cmd_Interrupt_Toggle", TagValue::Bool(true))
        .unwrap();

    run(&mut plant, 3);
    assert!(occupant(&plant, "S1").is_some());
    assert!(!plant.tag("P/A/S1/ReadyHandover").unwrap().as_bool());

    plant
        .write_tag("P/A/S1/Cmd_Interrupt_Toggle", TagValue::Bool(false))
        .unwrap();
    plant.advance(DT).unwrap();
    assert!(occupant(&plant, "S1").is_none());
    assert!(occupant(&plant, "S2").is_some());
}

// ── Fan-in ──────────────────────────────────────────────────────────

#[test]
fn merge_serves_sources_in_list_order() {
    let mut plant = chain(&[("A1", 1000.0, 200.0), ("B1", 1000.0, 200.0), ("M", 1000.0, 200.0)]);
    // chain() linked A1 -> B1 -> M; rebuild as a merge A1 + B1 -> M.
    plant.set_adjacent("A1", &[], Some("M")).unwrap();
    plant.set_adjacent("B1", &[], Some("M")).unwrap();
    plant.set_adjacent("M", &["A1", "B1"], None).unwrap();
    assert_eq!(plant.tag("P/A/M/SourceName").unwrap().as_text(), "A1,B1");

    let a = plant.insert_item("A1", 500.0, 1000.0).unwrap();
    let b = plant.insert_item("B1", 500.0, 1000.0).unwrap();

    plant.advance(DT).unwrap();
    assert_eq!(occupant(&plant, "M"), Some(a));
    assert_eq!(occupant(&plant, "B1"), Some(b));

    run(&mut plant, 8);
    assert_eq!(occupant(&plant, "M"), Some(a));
    assert_eq!(occupant(&plant, "B1"), Some(b));
    assert!(plant.segment("A1").unwrap().handler().is_empty());

    plant.remove_item("M").unwrap();
    plant.advance(DT).unwrap();
    assert_eq!(occupant(&plant, "M"), Some(b));
    assert_eq!(plant.counters().handovers, 2);
    assert_single_ownership(&plant);
}

// ── Feed and clear ──────────────────────────────────────────────────

#[test]
fn auto_feed_and_auto_clear_keep_counters_balanced() {
    let mut plant = chain(&[("F", 1000.0, 500.0), ("C", 1000.0, 500.0)]);
    plant
        .write_tag("P/A/F/Sim/AutoFeed_Interval", TagValue::Float(2.0))
        .unwrap();
    plant
        .write_tag("P/A/F/Sim/AutoFeed_Toggle", TagValue::Bool(true))
        .unwrap();
    plant
        .write_tag("P/A/C/Sim/AutoClear_Toggle", TagValue::Bool(true))
        .unwrap();

    run(&mut plant, 2);
    assert_eq!(plant.counters().inserted, 1);
    assert!(occupant(&plant, "F").is_some());

    for _ in 0..60 {
        plant.advance(DT).unwrap();
        assert_single_ownership(&plant);
        assert!(plant.item_count() <= 2);
    }
    let c = plant.counters();
    assert!(c.inserted > 3);
    assert!(c.removed > 0);
    assert_eq!(plant.tag("P/ItemsInFlight").unwrap().as_int() as u64, c.in_flight());
}

#[test]
fn auto_clear_waits_three_seconds_at_border() {
    let mut plant = chain(&[("C", 1000.0, 500.0)]);
    plant
        .write_tag("P/A/C/Sim/AutoClear_Toggle", TagValue::Bool(true))
        .unwrap();
    plant.insert_item("C", 500.0, 1000.0).unwrap();

    run(&mut plant, 3);
    assert!(occupant(&plant, "C").is_some());
    assert_eq!(plant.segment("C").unwrap().clear_dwell(), Some(2.0));

    plant.advance(DT).unwrap();
    assert!(occupant(&plant, "C").is_none());
    assert_eq!(plant.counters().removed, 1);
}

#[test]
fn add_item_tap_inserts_on_next_tick() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant
        .write_tag("P/A/S1/Sim/AddItem_Tap", TagValue::Bool(true))
        .unwrap();
    assert_eq!(plant.item_count(), 0);

    plant.advance(DT).unwrap();
    assert_eq!(plant.item_count(), 1);
    assert!(!plant.tag("P/A/S1/Sim/AddItem_Tap").unwrap().as_bool());

    // A second tap on an occupied segment is ignored.
    plant
        .write_tag("P/A/S1/Sim/AddItem_Tap", TagValue::Bool(true))
        .unwrap();
    plant.advance(DT).unwrap();
    assert_eq!(plant.item_count(), 1);
    assert_eq!(plant.counters().inserted, 1);
}
