//! Line-wide defaults for the flowsim workspace.
//!
//! Lengths are in millimetres, speeds in millimetres per second, currents in
//! ampere and times in seconds unless the name says otherwise.

/// Default service name used as the tag root.
pub const DEFAULT_SERVICE_NAME: &str = "flowsim";

/// Default line configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/flowsim/line.toml";

/// Default tick period of the runner.
pub const DEFAULT_CYCLE_TIME_MS: u64 = 1000;

/// Default simulated seconds per real second.
pub const DEFAULT_TIME_SCALE: f64 = 1.0;

/// Runner logs a debug summary every this many cycles.
pub const STATS_LOG_INTERVAL: u64 = 60;

// ─── Segments ───────────────────────────────────────────────────────

/// Default conveyor segment length.
pub const DEFAULT_SEGMENT_LENGTH: f64 = 1000.0;

/// Default conveyor belt speed.
pub const DEFAULT_SEGMENT_SPEED: f64 = 200.0;

/// Default item length produced by the item pool.
pub const DEFAULT_ITEM_LENGTH: f64 = 500.0;

/// Dwell at the border before auto-clear removes an item.
pub const AUTO_CLEAR_DWELL_S: f64 = 3.0;

/// Default empty time before auto-feed inserts an item.
pub const AUTO_FEED_INTERVAL_S: f64 = 5.0;

// ─── Drives ─────────────────────────────────────────────────────────

/// Fixed jog speed of a positioning drive in manual mode.
pub const MANUAL_SPEED: f64 = 100.0;

/// Current drawn by a running velocity drive.
pub const VELOCITY_DRIVE_CURRENT: f64 = 3.5;

/// Current drawn by a positioning drive jogging in manual mode.
pub const MANUAL_DRIVE_CURRENT: f64 = 5.5;

/// Current drawn by a positioning drive moving to its target.
pub const POSITIONING_DRIVE_CURRENT: f64 = 10.5;

// ─── Lifts ──────────────────────────────────────────────────────────

/// Lift travel speed with `Cmd_MoveFast_Toggle` set.
pub const LIFT_SPEED_FAST: f64 = 1000.0;

/// Lift travel speed with `Cmd_MoveFast_Toggle` cleared.
pub const LIFT_SPEED_SLOW: f64 = 500.0;

/// Default lift travel height.
pub const DEFAULT_LIFT_HEIGHT: f64 = 5000.0;

// ─── Stations ───────────────────────────────────────────────────────

/// Items stacked before a station drains a batch.
pub const DEFAULT_BATCH_SIZE: u32 = 4;

// ─── Items ──────────────────────────────────────────────────────────

/// First identifier handed out by the item pool.
pub const ITEM_ID_BASE: u64 = 10_000_000;

/// Item weight range (inclusive) in kilograms.
pub const ITEM_WEIGHT_RANGE: (u8, u8) = (1, 16);
