//! Integration test: fixed-cycle tick loop.

use super::chain;
use flowsim::{SimError, SimRunner};
use flowsim_common::line::config::RunnerConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn config(cycle_time_ms: u64, time_scale: f64) -> RunnerConfig {
    RunnerConfig {
        cycle_time_ms,
        time_scale,
    }
}

#[test]
fn background_loop_advances_shared_plant() {
    let mut plant = chain(&[("S1", 1000.0, 100.0)]);
    plant.insert_item("S1", 500.0, 0.0).unwrap();
    let plant = Arc::new(Mutex::new(plant));
    let mut runner = SimRunner::shared(Arc::clone(&plant), &config(5, 1.0));

    runner.start().unwrap();
    assert!(runner.is_running());
    assert!(matches!(runner.run_ticks(1), Err(SimError::Runner(_))));
    std::thread::sleep(Duration::from_millis(100));
    runner.stop().unwrap();
    assert!(!runner.is_running());

    let stats = runner.stats();
    let p = plant.lock();
    assert!(p.tick() > 0);
    assert_eq!(stats.cycle_count, p.tick());
    assert!(stats.max_cycle_time_us >= stats.average_cycle_time_us());
    assert!((p.elapsed() - p.tick() as f64 * 0.005).abs() < 1e-9);
    assert!(p.segment("S1").unwrap().position() > 0.0);
}

#[test]
fn clearing_running_flag_ends_foreground_loop() {
    let plant = chain(&[("S1", 1000.0, 100.0)]);
    let mut runner = SimRunner::new(plant, &config(2, 1.0));
    let running = runner.running_flag();

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::SeqCst);
    });
    runner.run().unwrap();
    stopper.join().unwrap();

    assert!(runner.stats().cycle_count > 0);
    assert_eq!(runner.plant().lock().tick(), runner.stats().cycle_count);
}

#[test]
fn tick_error_stops_the_loop() {
    let plant = chain(&[("S1", 1000.0, 100.0)]);
    let mut runner = SimRunner::new(plant, &config(1, -1.0));
    assert!(matches!(runner.run(), Err(SimError::InvalidParameter(_))));
    assert!(!runner.is_running());
    assert_eq!(runner.stats().cycle_count, 0);
}

#[test]
fn stepped_ticks_use_scaled_time() {
    let plant = chain(&[("S1", 1000.0, 100.0)]);
    let mut runner = SimRunner::new(plant, &config(250, 4.0));
    assert_eq!(runner.tick_seconds(), 1.0);

    runner.run_ticks(3).unwrap();
    let p = runner.plant();
    let p = p.lock();
    assert_eq!(p.tick(), 3);
    assert_eq!(p.elapsed(), 3.0);
    assert_eq!(p.tag("P/Tick").unwrap().as_int(), 3);
}
