//! Line configuration types.
//!
//! - `LineConfig` - Main configuration loaded from a line TOML file
//! - `AreaConfig` - One scheduling area and its ordered members
//! - `MemberConfig` - Segment, lift or station, tagged by `kind`
//! - `SensorConfig` - First-order-lag temperature sensor
//!
//! ```toml
//! [shared]
//! service_name = "smart-delivery"
//!
//! [[areas]]
//! name = "A2"
//!
//! [[areas.members]]
//! kind = "segment"
//! name = "211"
//! target = "212"
//! auto_feed = true
//!
//! [[areas.members]]
//! kind = "segment"
//! name = "212"
//! auto_clear = true
//! ```

use crate::config::{ConfigError, SharedConfig};
use crate::consts::{
    AUTO_FEED_INTERVAL_S, DEFAULT_BATCH_SIZE, DEFAULT_CYCLE_TIME_MS, DEFAULT_ITEM_LENGTH,
    DEFAULT_LIFT_HEIGHT, DEFAULT_SEGMENT_LENGTH, DEFAULT_SEGMENT_SPEED, DEFAULT_TIME_SCALE,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

fn default_cycle_time_ms() -> u64 {
    DEFAULT_CYCLE_TIME_MS
}

fn default_time_scale() -> f64 {
    DEFAULT_TIME_SCALE
}

fn default_item_length() -> f64 {
    DEFAULT_ITEM_LENGTH
}

fn default_segment_length() -> f64 {
    DEFAULT_SEGMENT_LENGTH
}

fn default_segment_speed() -> f64 {
    DEFAULT_SEGMENT_SPEED
}

fn default_feed_interval() -> f64 {
    AUTO_FEED_INTERVAL_S
}

fn default_lift_height() -> f64 {
    DEFAULT_LIFT_HEIGHT
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

/// Main configuration loaded from a line TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineConfig {
    /// Service name and log level.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Tick loop settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Item pool settings.
    #[serde(default)]
    pub items: ItemConfig,

    /// Areas in scheduling order.
    #[serde(default)]
    pub areas: Vec<AreaConfig>,

    /// Sensors, advanced after all areas.
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

/// Tick loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Wall-clock period of one tick in milliseconds.
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u64,

    /// Simulated seconds per wall-clock second.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cycle_time_ms: DEFAULT_CYCLE_TIME_MS,
            time_scale: DEFAULT_TIME_SCALE,
        }
    }
}

impl RunnerConfig {
    /// Simulated seconds advanced per tick.
    pub fn tick_seconds(&self) -> f64 {
        self.cycle_time_ms as f64 / 1000.0 * self.time_scale
    }
}

/// Item pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    /// Seed for item attributes. Unseeded pools draw from entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Length of items created by auto-feed and manual inserts.
    #[serde(default = "default_item_length")]
    pub default_length: f64,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            seed: None,
            default_length: DEFAULT_ITEM_LENGTH,
        }
    }
}

/// One area and its members in advance order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaConfig {
    pub name: String,

    /// Reference designation, e.g. `S1-A2-000-000`.
    #[serde(default)]
    pub designation: Option<String>,

    /// Initial value of `Cmd_AreaOn_Toggle`.
    #[serde(default)]
    pub enabled: bool,

    /// Initial value of `Cmd_ModeAuto_Toggle`.
    #[serde(default = "default_true")]
    pub auto: bool,

    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

/// Area member, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MemberConfig {
    Segment(SegmentConfig),
    Lift(LiftConfig),
    Station(StationConfig),
}

impl MemberConfig {
    pub fn name(&self) -> &str {
        match self {
            MemberConfig::Segment(s) => &s.name,
            MemberConfig::Lift(l) => &l.name,
            MemberConfig::Station(s) => &s.name,
        }
    }

    /// Static downstream neighbor. Lift targets are stops, not links.
    pub fn target(&self) -> Option<&str> {
        match self {
            MemberConfig::Segment(s) => s.target.as_deref(),
            MemberConfig::Lift(_) => None,
            MemberConfig::Station(s) => s.target.as_deref(),
        }
    }
}

/// Conveyor segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub name: String,

    #[serde(default)]
    pub designation: Option<String>,

    #[serde(default = "default_segment_length")]
    pub length: f64,

    /// Belt speed.
    #[serde(default = "default_segment_speed")]
    pub speed: f64,

    /// Downstream member name.
    #[serde(default)]
    pub target: Option<String>,

    /// Insert an item whenever the segment has been empty for `feed_interval`.
    #[serde(default)]
    pub auto_feed: bool,

    #[serde(default = "default_feed_interval")]
    pub feed_interval: f64,

    /// Remove items that wait at the border.
    #[serde(default)]
    pub auto_clear: bool,
}

impl SegmentConfig {
    /// Segment with default length and speed and no links.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            designation: None,
            length: DEFAULT_SEGMENT_LENGTH,
            speed: DEFAULT_SEGMENT_SPEED,
            target: None,
            auto_feed: false,
            feed_interval: AUTO_FEED_INTERVAL_S,
            auto_clear: false,
        }
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_designation(mut self, designation: impl Into<String>) -> Self {
        self.designation = Some(designation.into());
        self
    }
}

/// Lift with a carrier segment and a positioning drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftConfig {
    pub name: String,

    #[serde(default)]
    pub designation: Option<String>,

    /// Travel height. The lift starts at half of it.
    #[serde(default = "default_lift_height")]
    pub height: f64,

    #[serde(default = "default_segment_length")]
    pub carrier_length: f64,

    #[serde(default = "default_segment_speed")]
    pub carrier_speed: f64,

    /// Pick-up stops in priority order.
    pub sources: Vec<LiftStopConfig>,

    /// Drop-off stop.
    pub target: LiftStopConfig,
}

/// Segment served by a lift at a given height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftStopConfig {
    pub segment: String,
    pub position: f64,
}

/// Batching station made of an infeed and a carrier segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub name: String,

    #[serde(default)]
    pub designation: Option<String>,

    #[serde(default = "default_segment_length")]
    pub infeed_length: f64,

    #[serde(default = "default_segment_length")]
    pub carrier_length: f64,

    #[serde(default = "default_segment_speed")]
    pub speed: f64,

    /// Items stacked per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Downstream member name for finished batches.
    #[serde(default)]
    pub target: Option<String>,
}

impl LiftConfig {
    /// Lift with default height and carrier.
    pub fn new(
        name: impl Into<String>,
        sources: Vec<LiftStopConfig>,
        target: LiftStopConfig,
    ) -> Self {
        Self {
            name: name.into(),
            designation: None,
            height: DEFAULT_LIFT_HEIGHT,
            carrier_length: DEFAULT_SEGMENT_LENGTH,
            carrier_speed: DEFAULT_SEGMENT_SPEED,
            sources,
            target,
        }
    }
}

impl LiftStopConfig {
    pub fn new(segment: impl Into<String>, position: f64) -> Self {
        Self {
            segment: segment.into(),
            position,
        }
    }
}

impl StationConfig {
    /// Station with default segments and batch size.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            designation: None,
            infeed_length: DEFAULT_SEGMENT_LENGTH,
            carrier_length: DEFAULT_SEGMENT_LENGTH,
            speed: DEFAULT_SEGMENT_SPEED,
            batch_size: DEFAULT_BATCH_SIZE,
            target: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// First-order-lag temperature sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,

    /// Steady-state gain.
    pub k: f64,

    /// Time constant in seconds.
    pub t: f64,
}

impl LineConfig {
    /// Every member with its area, in scheduling order.
    pub fn members(&self) -> impl Iterator<Item = (&AreaConfig, &MemberConfig)> {
        self.areas
            .iter()
            .flat_map(|area| area.members.iter().map(move |m| (area, m)))
    }

    pub fn member(&self, name: &str) -> Option<&MemberConfig> {
        self.members().map(|(_, m)| m).find(|m| m.name() == name)
    }

    /// Members whose static target is `name`, in declaration order.
    pub fn sources_of(&self, name: &str) -> Vec<&str> {
        self.members()
            .filter(|(_, m)| m.target() == Some(name))
            .map(|(_, m)| m.name())
            .collect()
    }

    /// Validate the line configuration.
    ///
    /// # Validation Rules
    /// 1. Shared section valid, cycle time and time scale positive
    /// 2. Area, member and sensor names unique and non-empty
    /// 3. Lengths, speeds, heights, feed intervals and batch sizes positive
    /// 4. Every target names an existing member other than itself
    /// 5. Lift stops lie within the lift height and name segments
    /// 6. A member targeting a lift is one of that lift's sources
    /// 7. Sensor time constants positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.runner.cycle_time_ms == 0 {
            return Err(invalid("runner.cycle_time_ms must be greater than 0"));
        }
        if !(self.runner.time_scale.is_finite() && self.runner.time_scale > 0.0) {
            return Err(invalid("runner.time_scale must be positive"));
        }
        positive("items.default_length", self.items.default_length)?;

        let mut area_names = HashSet::new();
        for area in &self.areas {
            non_empty("area name", &area.name)?;
            if !area_names.insert(area.name.as_str()) {
                return Err(invalid(format!("Duplicate area name: {}", area.name)));
            }
        }

        let mut members: HashMap<&str, &MemberConfig> = HashMap::new();
        for (_, member) in self.members() {
            non_empty("member name", member.name())?;
            if members.insert(member.name(), member).is_some() {
                return Err(invalid(format!("Duplicate member name: {}", member.name())));
            }
        }

        for (_, member) in self.members() {
            match member {
                MemberConfig::Segment(s) => {
                    positive(&format!("{}.length", s.name), s.length)?;
                    positive(&format!("{}.speed", s.name), s.speed)?;
                    positive(&format!("{}.feed_interval", s.name), s.feed_interval)?;
                }
                MemberConfig::Lift(l) => {
                    positive(&format!("{}.height", l.name), l.height)?;
                    positive(&format!("{}.carrier_length", l.name), l.carrier_length)?;
                    positive(&format!("{}.carrier_speed", l.name), l.carrier_speed)?;
                    if l.sources.is_empty() {
                        return Err(invalid(format!("Lift {} has no sources", l.name)));
                    }
                    for stop in l.sources.iter().chain(std::iter::once(&l.target)) {
                        validate_stop(&members, l, stop)?;
                    }
                }
                MemberConfig::Station(s) => {
                    positive(&format!("{}.infeed_length", s.name), s.infeed_length)?;
                    positive(&format!("{}.carrier_length", s.name), s.carrier_length)?;
                    positive(&format!("{}.speed", s.name), s.speed)?;
                    if s.batch_size == 0 {
                        return Err(invalid(format!(
                            "{}.batch_size must be greater than 0",
                            s.name
                        )));
                    }
                }
            }

            if let Some(target) = member.target() {
                if target == member.name() {
                    return Err(invalid(format!("{} targets itself", member.name())));
                }
                match members.get(target) {
                    None => {
                        return Err(invalid(format!(
                            "{} targets unknown member {}",
                            member.name(),
                            target
                        )));
                    }
                    Some(MemberConfig::Lift(lift)) => {
                        if !lift.sources.iter().any(|s| s.segment == member.name()) {
                            return Err(invalid(format!(
                                "{} targets lift {} which does not list it as a source",
                                member.name(),
                                lift.name
                            )));
                        }
                    }
                    Some(_) => {}
                }
            }
        }

        let mut sensor_names = HashSet::new();
        for sensor in &self.sensors {
            non_empty("sensor name", &sensor.name)?;
            if !sensor_names.insert(sensor.name.as_str()) {
                return Err(invalid(format!("Duplicate sensor name: {}", sensor.name)));
            }
            positive(&format!("{}.t", sensor.name), sensor.t)?;
            if !sensor.k.is_finite() {
                return Err(invalid(format!("{}.k must be finite", sensor.name)));
            }
        }

        Ok(())
    }
}

fn validate_stop(
    members: &HashMap<&str, &MemberConfig>,
    lift: &LiftConfig,
    stop: &LiftStopConfig,
) -> Result<(), ConfigError> {
    if !(0.0..=lift.height).contains(&stop.position) {
        return Err(invalid(format!(
            "Lift {} stop {} at {} outside 0..={}",
            lift.name, stop.segment, stop.position, lift.height
        )));
    }
    match members.get(stop.segment.as_str()) {
        Some(MemberConfig::Segment(_)) => Ok(()),
        Some(_) => Err(invalid(format!(
            "Lift {} stop {} is not a segment",
            lift.name, stop.segment
        ))),
        None => Err(invalid(format!(
            "Lift {} references unknown segment {}",
            lift.name, stop.segment
        ))),
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

fn positive(what: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{what} must be positive, got {value}")))
    }
}

fn non_empty(what: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(invalid(format!("{what} cannot be empty")))
    } else {
        Ok(())
    }
}
