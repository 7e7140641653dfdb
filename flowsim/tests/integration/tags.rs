//! Integration test: tag write policies, listeners and operator modes.

use super::{DT, chain, run};
use flowsim::SimError;
use flowsim_common::tag::{ChangeLog, TagValue};

// ── Write policy ────────────────────────────────────────────────────

#[test]
fn state_tags_reject_external_writes() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    let err = plant
        .write_tag("P/A/S1/Occupied", TagValue::Bool(true))
        .unwrap_err();
    assert!(matches!(err, SimError::WriteDenied(name) if name == "P/A/S1/Occupied"));
    assert!(!plant.tag("P/A/S1/Occupied").unwrap().as_bool());
}

#[test]
fn unknown_tag_is_reported() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    let err = plant.write_tag("P/A/S9/Occupied", TagValue::Bool(true)).unwrap_err();
    assert!(matches!(err, SimError::UnknownTag(_)));
    assert!(plant.tag("P/A/S9/Occupied").is_none());
}

#[test]
fn writes_are_coerced_to_the_tag_kind() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant
        .write_tag("P/A/S1/Sim/AutoFeed_Interval", TagValue::Int(7))
        .unwrap();
    assert_eq!(plant.tag("P/A/S1/Sim/AutoFeed_Interval").unwrap().as_float(), 7.0);

    let err = plant
        .write_tag("P/A/S1/Sim/AutoFeed_Interval", TagValue::Text("fast".into()))
        .unwrap_err();
    assert!(matches!(err, SimError::WriteDenied(_)));
}

// ── Listeners ───────────────────────────────────────────────────────

#[test]
fn listener_sees_only_real_changes() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    let log = ChangeLog::new();
    plant.subscribe("P/A/S1/Occupied", log.clone()).unwrap();

    plant.insert_item("S1", 500.0, 0.0).unwrap();
    run(&mut plant, 3);
    plant.remove_item("S1").unwrap();
    plant.advance(DT).unwrap();

    let changes = log.drain();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].new, TagValue::Bool(true));
    assert_eq!(changes[1].old, TagValue::Bool(true));
    assert_eq!(changes[1].new, TagValue::Bool(false));
    assert!(log.is_empty());
}

#[test]
fn subscribe_to_unknown_tag_fails() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    assert!(plant.subscribe("P/Nope", ChangeLog::new()).is_err());
}

#[test]
fn snapshot_lists_every_tag() {
    let mut plant = chain(&[("S1", 1000.0, 100.0), ("S2", 1000.0, 100.0)]);
    plant.advance(DT).unwrap();

    let values = plant.tag_values();
    assert_eq!(values["P/Tick"], TagValue::Int(1));
    assert_eq!(values["P/SimTime"], TagValue::Float(1.0));
    assert_eq!(values["P/A/S2/SourceName"], TagValue::Text("S1".into()));
    assert_eq!(values["P/A/S1/Drive/ReferenceDesignation"], TagValue::Text("S1-D01".into()));
    assert!(values.contains_key("P/A/ChildErrors"));
    assert!(values.keys().all(|k| k.starts_with("P/")));
}

// ── Operator modes ──────────────────────────────────────────────────

#[test]
fn system_taps_switch_every_area() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant.insert_item("S1", 500.0, 200.0).unwrap();

    plant
        .write_tag("P/Cmd_SystemOff_Tap", TagValue::Bool(true))
        .unwrap();
    run(&mut plant, 2);
    assert!(!plant.area("A").unwrap().enabled());
    assert!(!plant.tag("P/A/Cmd_AreaOn_Toggle").unwrap().as_bool());
    assert!(!plant.tag("P/Cmd_SystemOff_Tap").unwrap().as_bool());
    assert_eq!(plant.segment("S1").unwrap().position(), 200.0);

    plant
        .write_tag("P/Cmd_SystemOn_Tap", TagValue::Bool(true))
        .unwrap();
    plant.advance(DT).unwrap();
    assert!(plant.area("A").unwrap().enabled());
    assert_eq!(plant.segment("S1").unwrap().position(), 300.0);
}

#[test]
fn area_toggle_written_externally_releases_transport() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant.set_area_enabled("A", false).unwrap();
    plant.insert_item("S1", 500.0, 200.0).unwrap();
    plant.advance(DT).unwrap();
    assert_eq!(plant.segment("S1").unwrap().position(), 200.0);

    plant
        .write_tag("P/A/Cmd_AreaOn_Toggle", TagValue::Bool(true))
        .unwrap();
    plant.advance(DT).unwrap();
    assert_eq!(plant.segment("S1").unwrap().position(), 300.0);
}

#[test]
fn manual_mode_jogs_only_on_command() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant.insert_item("S1", 500.0, 500.0).unwrap();
    let manual_on = "P/A/S1/Drive/Cmd_ManualOn_Toggle";

    // Manual run is locked while the drive is automatic.
    assert!(matches!(
        plant.write_tag(manual_on, TagValue::Bool(true)),
        Err(SimError::WriteDenied(_))
    ));

    plant.set_area_auto("A", false).unwrap();
    plant.advance(DT).unwrap();
    let s1 = plant.segment("S1").unwrap();
    assert!(s1.drive().is_manual());
    assert_eq!(plant.tag("P/A/S1/Drive/Mode").unwrap().as_text(), "Manual");
    assert_eq!(s1.position(), 500.0);

    plant.write_tag(manual_on, TagValue::Bool(true)).unwrap();
    plant.advance(DT).unwrap();
    assert_eq!(plant.segment("S1").unwrap().position(), 600.0);

    plant.set_area_auto("A", true).unwrap();
    plant.advance(DT).unwrap();
    let s1 = plant.segment("S1").unwrap();
    assert!(!s1.drive().is_manual());
    assert!(!plant.tag(manual_on).unwrap().as_bool());
    assert_eq!(s1.position(), 700.0);
}
