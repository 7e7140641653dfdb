//! Integration test: station batching and abort.

use super::{DT, assert_single_ownership, occupant, run};
use flowsim::Plant;
use flowsim::station::StationState;
use flowsim_common::line::config::{SegmentConfig, StationConfig};
use flowsim_common::tag::TagValue;

// ── Helpers ─────────────────────────────────────────────────────────

/// `IN` -> station `ST` (batch of 2) -> `OUT`, all at 200/s.
fn station_line() -> Plant {
    let mut plant = Plant::new("P");
    let area = plant.add_area("A", None).unwrap();
    plant.add_segment(area, &SegmentConfig::new("IN")).unwrap();
    plant
        .add_station(area, &StationConfig::new("ST").with_batch_size(2))
        .unwrap();
    plant.add_segment(area, &SegmentConfig::new("OUT")).unwrap();
    plant.link("IN", "ST").unwrap();
    plant.link("ST", "OUT").unwrap();
    plant.switch_on();
    plant
}

/// Feed one item at the `IN` border and run until the station stacked it.
fn feed_one(plant: &mut Plant) {
    let before = plant.station("ST").unwrap().batch_count();
    let done = plant.station("ST").unwrap().batches_done();
    plant.insert_item("IN", 500.0, 1000.0).unwrap();
    for _ in 0..20 {
        plant.advance(DT).unwrap();
        let st = plant.station("ST").unwrap();
        if st.batch_count() > before || st.batches_done() > done {
            return;
        }
    }
    panic!("station never stacked the item");
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn station_links_infeed_and_carrier() {
    let plant = station_line();
    let infeed = plant.segment("ST/Infeed").unwrap();
    let carrier = plant.segment("ST/Carrier").unwrap();
    assert_eq!(infeed.handler().sources(), &[plant.segment_id("IN").unwrap()]);
    assert_eq!(infeed.handler().target(), plant.segment_id("ST/Carrier").ok());
    assert_eq!(carrier.handler().target(), None);
    assert_eq!(
        plant.segment("IN").unwrap().handler().target(),
        plant.segment_id("ST/Infeed").ok()
    );
    assert_eq!(
        plant.segment("OUT").unwrap().handler().sources(),
        &[plant.segment_id("ST/Carrier").unwrap()]
    );
}

#[test]
fn items_are_stacked_until_batch_is_complete() {
    let mut plant = station_line();
    feed_one(&mut plant);

    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Filling);
    assert_eq!(st.batch_count(), 1);
    assert_eq!(plant.tag("P/A/ST/BatchCount").unwrap().as_int(), 1);
    assert_eq!(plant.item_count(), 0);
    assert_eq!(plant.counters().removed, 1);
    assert_single_ownership(&plant);
}

#[test]
fn full_batch_drains_one_item_downstream() {
    let mut plant = station_line();
    plant.insert_item("IN", 300.0, 1000.0).unwrap();
    run(&mut plant, 15);
    feed_one(&mut plant);

    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Draining);
    assert_eq!(st.batches_done(), 1);
    assert_eq!(st.batch_count(), 0);
    assert_eq!(plant.tag("P/A/ST/State").unwrap().as_text(), "Draining");
    let batch = plant.segment("ST/Carrier").unwrap().handler().occupant().unwrap();
    assert_eq!(batch.length(), 500.0);
    assert!(plant.segment("ST/Infeed").unwrap().handler().sources().is_empty());

    run(&mut plant, 20);
    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Filling);
    assert!(occupant(&plant, "OUT").is_some());
    let c = plant.counters();
    assert_eq!(c.inserted, 3);
    assert_eq!(c.removed, 2);
    assert_eq!(plant.item_count(), 1);
    assert_single_ownership(&plant);
}

#[test]
fn abort_drains_partial_batch() {
    let mut plant = station_line();
    feed_one(&mut plant);

    plant.abort_station("ST").unwrap();
    plant.advance(DT).unwrap();
    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Draining);
    assert_eq!(st.batches_done(), 1);
    assert!(plant.segment("ST/Carrier").unwrap().handler().has_occupant());
}

#[test]
fn abort_with_empty_batch_injects_nothing() {
    let mut plant = station_line();
    plant
        .write_tag("P/A/ST/Cmd_Abort_Tap", TagValue::Bool(true))
        .unwrap();

    plant.advance(DT).unwrap();
    assert_eq!(plant.station("ST").unwrap().state(), StationState::Draining);
    assert_eq!(plant.counters().inserted, 0);

    plant.advance(DT).unwrap();
    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Filling);
    assert_eq!(st.batches_done(), 0);
}

#[test]
fn lowered_batch_size_waits_for_item_on_carrier() {
    let mut plant = station_line();
    plant
        .write_tag("P/A/ST/BatchSize", TagValue::Int(4))
        .unwrap();
    feed_one(&mut plant);
    plant.insert_item("ST/Carrier", 500.0, 100.0).unwrap();
    plant
        .write_tag("P/A/ST/BatchSize", TagValue::Int(1))
        .unwrap();

    // The rider is mid-carrier; the batch item cannot be placed yet.
    plant.advance(DT).unwrap();
    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Filling);
    assert_eq!(st.batch_count(), 1);
    assert!(plant.segment("ST/Carrier").unwrap().handler().has_occupant());

    for _ in 0..20 {
        plant.advance(DT).unwrap();
        if plant.station("ST").unwrap().batches_done() > 0 {
            break;
        }
    }
    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Draining);
    assert_eq!(st.batches_done(), 1);
    assert_eq!(st.batch_count(), 0);
    let c = plant.counters();
    assert_eq!(c.inserted, 3);
    assert_eq!(c.removed, 2);
    assert_eq!(plant.item_count(), 1);
    assert_single_ownership(&plant);
}

#[test]
fn faulted_or_stopped_carrier_does_not_stack() {
    let mut plant = station_line();
    plant.insert_item("ST/Carrier", 500.0, 1000.0).unwrap();
    plant.inject_jam("ST/Carrier").unwrap();

    run(&mut plant, 3);
    assert_eq!(plant.station("ST").unwrap().batch_count(), 0);
    assert!(plant.segment("ST/Carrier").unwrap().handler().has_occupant());

    plant.reset_segment("ST/Carrier").unwrap();
    plant.set_area_enabled("A", false).unwrap();
    run(&mut plant, 3);
    assert_eq!(plant.station("ST").unwrap().batch_count(), 0);

    plant.set_area_enabled("A", true).unwrap();
    plant.advance(DT).unwrap();
    assert_eq!(plant.station("ST").unwrap().batch_count(), 1);
    assert!(plant.segment("ST/Carrier").unwrap().handler().is_empty());
}

#[test]
fn abort_stacks_item_on_jammed_carrier() {
    let mut plant = station_line();
    plant.insert_item("ST/Carrier", 500.0, 1000.0).unwrap();
    plant.inject_jam("ST/Carrier").unwrap();

    plant.abort_station("ST").unwrap();
    plant.advance(DT).unwrap();
    let st = plant.station("ST").unwrap();
    assert_eq!(st.state(), StationState::Draining);
    assert_eq!(st.batches_done(), 1);
    assert_eq!(plant.counters().removed, 1);
    assert_single_ownership(&plant);
}

#[test]
fn abort_of_unknown_station_is_rejected() {
    let mut plant = station_line();
    assert!(plant.abort_station("IN").is_err());
    assert!(plant.abort_station("nope").is_err());
}
