//! Plant: owner of every entity.
//!
//! The [`Plant`] holds the entity arenas, the error tree with its system
//! node, the item pool and the counters. It builds the topology, advances
//! areas in registration order and routes tag reads, writes and
//! subscriptions by full tag name.
//!
//! Tag names follow `{plant}/{area}/{member}/{tag}`. Lift carriers and
//! station segments are addressed as `{member}/Carrier` and
//! `{member}/Infeed`.

use crate::area::{Area, AreaState, Member};
use crate::drive::{Drive, drive_designation};
use crate::engine::{Counters, Engine};
use crate::error::SimError;
use crate::fault::{ErrorTree, FaultKind};
use crate::id::{AreaId, ErrorNodeId, ItemId, LiftId, SegmentId, SensorId, StationId};
use crate::item::{Item, ItemPool};
use crate::lift::{Lift, LiftStop};
use crate::segment::{Segment, SegmentOptions};
use crate::sensor::{Pt1, TemperatureSensor};
use crate::station::Station;
use flowsim_common::consts::LIFT_SPEED_FAST;
use flowsim_common::line::config::{
    LiftConfig, LineConfig, MemberConfig, SegmentConfig, SensorConfig, StationConfig,
};
use flowsim_common::tag::{Tag, TagListener, TagSource, TagValue, ValueAccess, tag_name};
use slotmap::SlotMap;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

static_assertions::assert_impl_all!(Plant: Send);

#[derive(Debug)]
struct PlantTags {
    sim_time: Tag,
    tick: Tag,
    in_flight: Tag,
    inserted: Tag,
    removed: Tag,
    handovers: Tag,
    system_on: Tag,
    system_off: Tag,
}

impl PlantTags {
    fn new(prefix: &str) -> Self {
        Self {
            sim_time: Tag::new(tag_name(prefix, "SimTime"), 0.0),
            tick: Tag::new(tag_name(prefix, "Tick"), 0u64),
            in_flight: Tag::new(tag_name(prefix, "ItemsInFlight"), 0u64),
            inserted: Tag::new(tag_name(prefix, "ItemsInserted"), 0u64),
            removed: Tag::new(tag_name(prefix, "ItemsRemoved"), 0u64),
            handovers: Tag::new(tag_name(prefix, "Handovers"), 0u64),
            system_on: Tag::command(tag_name(prefix, "Cmd_SystemOn_Tap"), false),
            system_off: Tag::command(tag_name(prefix, "Cmd_SystemOff_Tap"), false),
        }
    }

    fn all(&self) -> Vec<&Tag> {
        vec![
            &self.sim_time,
            &self.tick,
            &self.in_flight,
            &self.inserted,
            &self.removed,
            &self.handovers,
            &self.system_on,
            &self.system_off,
        ]
    }

    fn all_mut(&mut self) -> Vec<&mut Tag> {
        vec![
            &mut self.sim_time,
            &mut self.tick,
            &mut self.in_flight,
            &mut self.inserted,
            &mut self.removed,
            &mut self.handovers,
            &mut self.system_on,
            &mut self.system_off,
        ]
    }
}

/// Engine plus the composite arenas, borrowed side by side.
struct Parts<'a> {
    engine: Engine<'a>,
    lifts: &'a mut SlotMap<LiftId, Lift>,
    stations: &'a mut SlotMap<StationId, Station>,
}

/// Owner of a complete line.
#[derive(Debug)]
pub struct Plant {
    name: String,
    segments: SlotMap<SegmentId, Segment>,
    lifts: SlotMap<LiftId, Lift>,
    stations: SlotMap<StationId, Station>,
    areas: SlotMap<AreaId, Area>,
    area_order: Vec<AreaId>,
    sensors: SlotMap<SensorId, TemperatureSensor>,
    sensor_order: Vec<SensorId>,
    errors: ErrorTree,
    system_node: ErrorNodeId,
    pool: ItemPool,
    counters: Counters,
    members: HashMap<String, Member>,
    sensor_names: HashMap<String, SensorId>,
    segment_names: HashMap<String, SegmentId>,
    tick: u64,
    elapsed: f64,
    tags: PlantTags,
}

impl Plant {
    /// Empty plant with a default item pool.
    pub fn new(name: &str) -> Self {
        Self::with_pool(name, ItemPool::default())
    }

    pub fn with_pool(name: &str, pool: ItemPool) -> Self {
        let mut errors = ErrorTree::new();
        let system_node = errors.add_node(name, name);
        Self {
            name: name.to_string(),
            segments: SlotMap::with_key(),
            lifts: SlotMap::with_key(),
            stations: SlotMap::with_key(),
            areas: SlotMap::with_key(),
            area_order: Vec::new(),
            sensors: SlotMap::with_key(),
            sensor_order: Vec::new(),
            errors,
            system_node,
            pool,
            counters: Counters::default(),
            members: HashMap::new(),
            sensor_names: HashMap::new(),
            segment_names: HashMap::new(),
            tick: 0,
            elapsed: 0.0,
            tags: PlantTags::new(name),
        }
    }

    /// Build and link a line from its configuration.
    pub fn from_config(config: &LineConfig) -> Result<Self, SimError> {
        config.validate()?;
        let pool = ItemPool::new(config.items.default_length, config.items.seed)?;
        let mut plant = Self::with_pool(&config.shared.service_name, pool);

        for area_cfg in &config.areas {
            let area = plant.add_area(&area_cfg.name, area_cfg.designation.as_deref())?;
            plant.areas[area].set_enabled(area_cfg.enabled);
            plant.areas[area].set_auto(area_cfg.auto);
            for member in &area_cfg.members {
                match member {
                    MemberConfig::Segment(cfg) => {
                        plant.add_segment(area, cfg)?;
                    }
                    MemberConfig::Lift(cfg) => {
                        plant.add_lift(area, cfg)?;
                    }
                    MemberConfig::Station(cfg) => {
                        plant.add_station(area, cfg)?;
                    }
                }
            }
        }

        for (_, member) in config.members() {
            if let Some(target) = member.target() {
                plant.link(member.name(), target)?;
            }
        }
        for (_, member) in config.members() {
            if let MemberConfig::Lift(cfg) = member {
                let sources: Vec<(&str, f64)> = cfg
                    .sources
                    .iter()
                    .map(|s| (s.segment.as_str(), s.position))
                    .collect();
                let target = (cfg.target.segment.as_str(), cfg.target.position);
                plant.set_lift_stops(&cfg.name, &sources, Some(target))?;
            }
        }
        for sensor in &config.sensors {
            plant.add_sensor(sensor)?;
        }

        info!(
            "Plant {} built: {} areas, {} segments, {} lifts, {} stations, {} sensors",
            plant.name,
            plant.areas.len(),
            plant.segments.len(),
            plant.lifts.len(),
            plant.stations.len(),
            plant.sensors.len()
        );
        Ok(plant)
    }

    fn parts(&mut self) -> Parts<'_> {
        Parts {
            engine: Engine::new(
                &mut self.segments,
                &mut self.errors,
                &mut self.pool,
                &mut self.counters,
                self.tick,
            ),
            lifts: &mut self.lifts,
            stations: &mut self.stations,
        }
    }

    fn engine(&mut self) -> Engine<'_> {
        self.parts().engine
    }

    // ─── Topology ───────────────────────────────────────────────────

    /// Add an area, disabled and in auto mode, below the system node.
    pub fn add_area(&mut self, name: &str, designation: Option<&str>) -> Result<AreaId, SimError> {
        if self.area_id(name).is_some() {
            return Err(SimError::InvalidParameter(format!("Duplicate area: {name}")));
        }
        let prefix = tag_name(&self.name, name);
        let designation = designation.unwrap_or(name);
        let node = self.errors.add_child(designation, &prefix, self.system_node)?;
        let id = self
            .areas
            .insert(Area::new(name, designation, &prefix, node, false, true));
        self.area_order.push(id);
        debug!("Area {} added", name);
        Ok(id)
    }

    fn claim_name(&self, name: &str) -> Result<(), SimError> {
        if name.is_empty() || self.members.contains_key(name) || self.sensor_names.contains_key(name)
        {
            return Err(SimError::InvalidParameter(format!(
                "Member name empty or taken: '{name}'"
            )));
        }
        Ok(())
    }

    fn area_prefix(&self, area: AreaId) -> Result<(String, ErrorNodeId), SimError> {
        let a = self
            .areas
            .get(area)
            .ok_or_else(|| SimError::UnknownEntity(format!("area {area:?}")))?;
        Ok((tag_name(&self.name, a.name()), a.node()))
    }

    /// Create a segment with its drive and error nodes below `parent`.
    #[allow(clippy::too_many_arguments)]
    fn build_segment(
        &mut self,
        name: &str,
        designation: &str,
        prefix: &str,
        parent: ErrorNodeId,
        length: f64,
        speed: f64,
        drive_index: u8,
        options: SegmentOptions,
    ) -> Result<SegmentId, SimError> {
        if !(length.is_finite() && length > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "{name}: length must be positive"
            )));
        }
        let node = self.errors.add_child(designation, prefix, parent)?;
        let drive_prefix = tag_name(prefix, "Drive");
        let drive_id = drive_designation(designation, drive_index);
        let drive_node = self.errors.add_child(drive_id.as_str(), &drive_prefix, node)?;
        let drive = Drive::velocity(&drive_id, &drive_prefix, speed, drive_node);
        let segment = Segment::new(name, designation, prefix, length, drive, node, options);
        let id = self.segments.insert(segment);
        self.segment_names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn add_segment(&mut self, area: AreaId, cfg: &SegmentConfig) -> Result<SegmentId, SimError> {
        self.claim_name(&cfg.name)?;
        let (area_prefix, area_node) = self.area_prefix(area)?;
        let prefix = tag_name(&area_prefix, &cfg.name);
        let designation = cfg.designation.as_deref().unwrap_or(&cfg.name);
        let options = SegmentOptions {
            auto_feed: cfg.auto_feed,
            feed_interval: cfg.feed_interval,
            auto_clear: cfg.auto_clear,
        };
        let id = self.build_segment(
            &cfg.name,
            designation,
            &prefix,
            area_node,
            cfg.length,
            cfg.speed,
            1,
            options,
        )?;
        self.register(area, &cfg.name, Member::Segment(id));
        debug!("Segment {} added", cfg.name);
        Ok(id)
    }

    /// Add a lift without stops; see [`set_lift_stops`](Self::set_lift_stops).
    pub fn add_lift(&mut self, area: AreaId, cfg: &LiftConfig) -> Result<LiftId, SimError> {
        self.claim_name(&cfg.name)?;
        if !(cfg.height.is_finite() && cfg.height > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "{}: height must be positive",
                cfg.name
            )));
        }
        let (area_prefix, area_node) = self.area_prefix(area)?;
        let prefix = tag_name(&area_prefix, &cfg.name);
        let designation = cfg.designation.as_deref().unwrap_or(&cfg.name);
        let node = self.errors.add_child(designation, &prefix, area_node)?;

        let carrier_name = format!("{}/Carrier", cfg.name);
        let carrier = self.build_segment(
            &carrier_name,
            &format!("{designation}/Carrier"),
            &tag_name(&prefix, "Carrier"),
            node,
            cfg.carrier_length,
            cfg.carrier_speed,
            2,
            SegmentOptions::default(),
        )?;

        let drive_prefix = tag_name(&prefix, "Drive");
        let drive_id = drive_designation(designation, 1);
        let drive_node = self.errors.add_child(drive_id.as_str(), &drive_prefix, node)?;
        let drive = Drive::positioning(
            &drive_id,
            &drive_prefix,
            LIFT_SPEED_FAST,
            cfg.height / 2.0,
            drive_node,
        );
        let lift = Lift::new(&cfg.name, designation, &prefix, cfg.height, carrier, drive, node);
        let id = self.lifts.insert(lift);

        let mut e = self.engine();
        e.set_ready_takeover(carrier, false)?;
        e.set_handover_gate(carrier, false)?;
        self.register(area, &cfg.name, Member::Lift(id));
        debug!("Lift {} added", cfg.name);
        Ok(id)
    }

    /// Set pick-up and drop-off stops of a lift by segment name.
    ///
    /// Source segments are pointed at the carrier; the carrier is appended
    /// to the target segment's sources.
    pub fn set_lift_stops(
        &mut self,
        lift: &str,
        sources: &[(&str, f64)],
        target: Option<(&str, f64)>,
    ) -> Result<(), SimError> {
        let lift_id = self.lift_id(lift)?;
        let mut stops = Vec::with_capacity(sources.len());
        for (segment, position) in sources {
            stops.push(LiftStop {
                segment: self.segment_id(segment)?,
                position: *position,
            });
        }
        let target = match target {
            Some((segment, position)) => Some(LiftStop {
                segment: self.segment_id(segment)?,
                position,
            }),
            None => None,
        };

        let Parts {
            mut engine, lifts, ..
        } = self.parts();
        let l = lifts
            .get_mut(lift_id)
            .ok_or_else(|| SimError::UnknownEntity(lift.to_string()))?;
        l.set_stops(&mut engine, stops.clone(), target)?;
        let carrier = l.carrier();

        for stop in &stops {
            let upstream = engine.segment(stop.segment)?.handler().sources().to_vec();
            engine.set_adjacent(stop.segment, upstream, Some(carrier))?;
        }
        if let Some(stop) = target {
            let seg = engine.segment(stop.segment)?.handler();
            let mut upstream = seg.sources().to_vec();
            let downstream = seg.target();
            if !upstream.contains(&carrier) {
                upstream.push(carrier);
            }
            engine.set_adjacent(stop.segment, upstream, downstream)?;
        }
        Ok(())
    }

    pub fn add_station(&mut self, area: AreaId, cfg: &StationConfig) -> Result<StationId, SimError> {
        self.claim_name(&cfg.name)?;
        if cfg.batch_size == 0 {
            return Err(SimError::InvalidParameter(format!(
                "{}: batch size must be positive",
                cfg.name
            )));
        }
        let (area_prefix, area_node) = self.area_prefix(area)?;
        let prefix = tag_name(&area_prefix, &cfg.name);
        let designation = cfg.designation.as_deref().unwrap_or(&cfg.name);
        let node = self.errors.add_child(designation, &prefix, area_node)?;

        let infeed = self.build_segment(
            &format!("{}/Infeed", cfg.name),
            &format!("{designation}/Infeed"),
            &tag_name(&prefix, "Infeed"),
            node,
            cfg.infeed_length,
            cfg.speed,
            1,
            SegmentOptions::default(),
        )?;
        let carrier = self.build_segment(
            &format!("{}/Carrier", cfg.name),
            &format!("{designation}/Carrier"),
            &tag_name(&prefix, "Carrier"),
            node,
            cfg.carrier_length,
            cfg.speed,
            2,
            SegmentOptions::default(),
        )?;
        let station = Station::new(
            &cfg.name,
            designation,
            &prefix,
            infeed,
            carrier,
            node,
            cfg.batch_size,
        );
        let id = self.stations.insert(station);

        let Parts {
            mut engine,
            stations,
            ..
        } = self.parts();
        if let Some(station) = stations.get_mut(id) {
            station.set_links(&mut engine, Vec::new(), None)?;
        }
        self.register(area, &cfg.name, Member::Station(id));
        debug!("Station {} added", cfg.name);
        Ok(id)
    }

    pub fn add_sensor(&mut self, cfg: &SensorConfig) -> Result<SensorId, SimError> {
        self.claim_name(&cfg.name)?;
        let pt1 = Pt1::new(cfg.k, cfg.t)?;
        let prefix = tag_name(&self.name, &cfg.name);
        let id = self
            .sensors
            .insert(TemperatureSensor::new(&cfg.name, &prefix, pt1));
        self.sensor_order.push(id);
        self.sensor_names.insert(cfg.name.clone(), id);
        Ok(id)
    }

    fn register(&mut self, area: AreaId, name: &str, member: Member) {
        if let Some(a) = self.areas.get_mut(area) {
            a.push_member(member);
        }
        self.members.insert(name.to_string(), member);
    }

    /// Link member `from` to member `to`.
    ///
    /// `to` gains `from` as a source unless it is a lift, whose carrier is
    /// re-linked by the lift itself. Lifts cannot be `from`; use
    /// [`set_lift_stops`](Self::set_lift_stops).
    pub fn link(&mut self, from: &str, to: &str) -> Result<(), SimError> {
        let from_member = self.member(from)?;
        let to_member = self.member(to)?;
        let Parts {
            mut engine,
            lifts,
            stations,
        } = self.parts();

        let inbound = match to_member {
            Member::Segment(id) => id,
            Member::Lift(id) => lifts
                .get(id)
                .map(Lift::carrier)
                .ok_or_else(|| SimError::UnknownEntity(to.to_string()))?,
            Member::Station(id) => stations
                .get(id)
                .map(Station::infeed)
                .ok_or_else(|| SimError::UnknownEntity(to.to_string()))?,
        };

        let outbound = match from_member {
            Member::Segment(id) => {
                let upstream = engine.segment(id)?.handler().sources().to_vec();
                engine.set_adjacent(id, upstream, Some(inbound))?;
                id
            }
            Member::Station(id) => {
                let station = stations
                    .get_mut(id)
                    .ok_or_else(|| SimError::UnknownEntity(from.to_string()))?;
                let upstream = station.sources().to_vec();
                station.set_links(&mut engine, upstream, Some(inbound))?;
                station.carrier()
            }
            Member::Lift(_) => {
                return Err(SimError::InvalidParameter(format!(
                    "{from} cannot be linked as an upstream member"
                )));
            }
        };

        match to_member {
            Member::Segment(id) => {
                let h = engine.segment(id)?.handler();
                let mut upstream = h.sources().to_vec();
                let downstream = h.target();
                if !upstream.contains(&outbound) {
                    upstream.push(outbound);
                }
                engine.set_adjacent(id, upstream, downstream)?;
            }
            Member::Station(id) => {
                if let Some(station) = stations.get_mut(id) {
                    let mut upstream = station.sources().to_vec();
                    if !upstream.contains(&outbound) {
                        upstream.push(outbound);
                    }
                    let downstream = station.target();
                    station.set_links(&mut engine, upstream, downstream)?;
                }
            }
            Member::Lift(_) => {}
        }
        debug!("Linked {} -> {}", from, to);
        Ok(())
    }

    /// Re-point a segment by name at runtime.
    pub fn set_adjacent(
        &mut self,
        segment: &str,
        sources: &[&str],
        target: Option<&str>,
    ) -> Result<(), SimError> {
        let id = self.segment_id(segment)?;
        let sources = sources
            .iter()
            .map(|s| self.segment_id(s))
            .collect::<Result<Vec<_>, _>>()?;
        let target = target.map(|t| self.segment_id(t)).transpose()?;
        self.engine().set_adjacent(id, sources, target)
    }

    // ─── Tick ───────────────────────────────────────────────────────

    /// Advance the whole plant by `dt` seconds.
    pub fn advance(&mut self, dt: f64) -> Result<(), SimError> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(SimError::InvalidParameter(format!("dt must be >= 0, got {dt}")));
        }
        self.tick += 1;

        if self.tags.system_on.take_tap() {
            self.switch_on();
        }
        if self.tags.system_off.take_tap() {
            self.switch_off();
        }

        for i in 0..self.area_order.len() {
            let area = self.area_order[i];
            self.advance_area(area, dt)?;
        }
        for &id in &self.sensor_order {
            if let Some(sensor) = self.sensors.get_mut(id) {
                sensor.advance(dt);
            }
        }

        self.elapsed += dt;
        self.publish();
        Ok(())
    }

    fn advance_area(&mut self, area: AreaId, dt: f64) -> Result<(), SimError> {
        let a = self
            .areas
            .get_mut(area)
            .ok_or_else(|| SimError::UnknownEntity(format!("area {area:?}")))?;
        let state = a.state();
        if let Some(auto) = a.take_auto_change() {
            self.set_area_manual(area, !auto);
        }

        let count = self.areas.get(area).map_or(0, |a| a.members().len());
        for i in 0..count {
            let Some(member) = self.areas.get(area).map(|a| a.members()[i]) else {
                break;
            };
            self.advance_member(member, state, dt)?;
        }
        Ok(())
    }

    fn advance_member(&mut self, member: Member, state: AreaState, dt: f64) -> Result<(), SimError> {
        let Parts {
            mut engine,
            lifts,
            stations,
        } = self.parts();
        match member {
            Member::Segment(id) => engine.advance_segment(id, state, dt),
            Member::Lift(id) => match lifts.get_mut(id) {
                Some(lift) => lift.advance(&mut engine, state, dt),
                None => Err(SimError::UnknownEntity(format!("lift {id:?}"))),
            },
            Member::Station(id) => match stations.get_mut(id) {
                Some(station) => station.advance(&mut engine, state, dt),
                None => Err(SimError::UnknownEntity(format!("station {id:?}"))),
            },
        }
    }

    /// Switch every drive of an area's members between manual and automatic.
    fn set_area_manual(&mut self, area: AreaId, manual: bool) {
        let Some(a) = self.areas.get(area) else {
            return;
        };
        let mut drives = Vec::new();
        for member in a.members() {
            match *member {
                Member::Segment(id) => drives.push(id),
                Member::Lift(id) => {
                    if let Some(lift) = self.lifts.get_mut(id) {
                        lift.drive_mut().set_manual(manual);
                        drives.push(lift.carrier());
                    }
                }
                Member::Station(id) => {
                    if let Some(station) = self.stations.get(id) {
                        drives.push(station.infeed());
                        drives.push(station.carrier());
                    }
                }
            }
        }
        for id in drives {
            if let Some(seg) = self.segments.get_mut(id) {
                seg.drive_mut().set_manual(manual);
            }
        }
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Enable every area.
    pub fn switch_on(&mut self) {
        for area in self.areas.values_mut() {
            area.set_enabled(true);
        }
        info!("Plant {} switched on", self.name);
    }

    /// Disable every area.
    pub fn switch_off(&mut self) {
        for area in self.areas.values_mut() {
            area.set_enabled(false);
        }
        info!("Plant {} switched off", self.name);
    }

    pub fn set_area_enabled(&mut self, area: &str, enabled: bool) -> Result<(), SimError> {
        let id = self.area_id(area).ok_or_else(|| SimError::UnknownEntity(area.to_string()))?;
        self.areas[id].set_enabled(enabled);
        Ok(())
    }

    /// Applied to member drives at the start of the area's next tick.
    pub fn set_area_auto(&mut self, area: &str, auto: bool) -> Result<(), SimError> {
        let id = self.area_id(area).ok_or_else(|| SimError::UnknownEntity(area.to_string()))?;
        self.areas[id].set_auto(auto);
        Ok(())
    }

    /// Raise `DriveFault("Overcurrent")` on a segment's or lift's drive.
    pub fn inject_drive_fault(&mut self, name: &str) -> Result<(), SimError> {
        if let Ok(id) = self.lift_id(name) {
            let node = self.lifts[id].drive().node();
            return self.errors.raise(node, FaultKind::Drive, "Overcurrent");
        }
        let id = self.segment_id(name)?;
        self.engine().inject_drive_fault(id)
    }

    /// Raise `JamFault("Jam")` on a segment.
    pub fn inject_jam(&mut self, segment: &str) -> Result<(), SimError> {
        let id = self.segment_id(segment)?;
        self.engine().inject_jam(id)
    }

    /// Clear a segment's and its drive's own faults.
    pub fn reset_segment(&mut self, segment: &str) -> Result<(), SimError> {
        let id = self.segment_id(segment)?;
        self.engine().reset_segment(id)
    }

    /// Operator acknowledge: clear every own fault in the plant.
    pub fn reset_faults(&mut self) -> Result<(), SimError> {
        let pending: Vec<ErrorNodeId> = self
            .errors
            .iter()
            .filter(|(_, n)| n.error_pending())
            .map(|(id, _)| id)
            .collect();
        for node in &pending {
            self.errors.clear_error(*node)?;
        }
        let ids: Vec<SegmentId> = self.segments.keys().collect();
        let mut e = self.engine();
        for id in ids {
            e.publish(id)?;
        }
        if !pending.is_empty() {
            info!("Cleared {} faults", pending.len());
        }
        Ok(())
    }

    pub fn insert_item(
        &mut self,
        segment: &str,
        length: f64,
        position: f64,
    ) -> Result<ItemId, SimError> {
        let id = self.segment_id(segment)?;
        self.engine().insert_item(id, length, position)
    }

    /// Insert a default item at half length.
    pub fn insert_new_item(&mut self, segment: &str) -> Result<ItemId, SimError> {
        let id = self.segment_id(segment)?;
        self.engine().insert_new_item(id)
    }

    pub fn remove_item(&mut self, segment: &str) -> Result<Option<Item>, SimError> {
        let id = self.segment_id(segment)?;
        self.engine().remove_item(id)
    }

    pub fn abort_station(&mut self, station: &str) -> Result<(), SimError> {
        match self.member(station)? {
            Member::Station(id) => {
                self.stations[id].abort();
                Ok(())
            }
            _ => Err(SimError::UnknownEntity(format!("station {station}"))),
        }
    }

    pub fn set_heating(&mut self, sensor: &str, on: bool) -> Result<(), SimError> {
        let id = self
            .sensor_names
            .get(sensor)
            .copied()
            .ok_or_else(|| SimError::UnknownEntity(format!("sensor {sensor}")))?;
        self.sensors[id].set_heating(on);
        Ok(())
    }

    // ─── Queries ────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn errors(&self) -> &ErrorTree {
        &self.errors
    }

    pub fn system_node(&self) -> ErrorNodeId {
        self.system_node
    }

    /// Items on the line with the segment that owns them.
    pub fn items(&self) -> impl Iterator<Item = (&Segment, &Item)> {
        self.segments
            .values()
            .filter_map(|s| s.handler().occupant().map(|item| (s, item)))
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    fn member(&self, name: &str) -> Result<Member, SimError> {
        self.members
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownEntity(name.to_string()))
    }

    pub fn segment_id(&self, name: &str) -> Result<SegmentId, SimError> {
        self.segment_names
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownEntity(format!("segment {name}")))
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segment_names
            .get(name)
            .and_then(|id| self.segments.get(*id))
    }

    pub fn segment_by_id(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    fn lift_id(&self, name: &str) -> Result<LiftId, SimError> {
        match self.member(name)? {
            Member::Lift(id) => Ok(id),
            _ => Err(SimError::UnknownEntity(format!("lift {name}"))),
        }
    }

    pub fn lift(&self, name: &str) -> Option<&Lift> {
        self.lift_id(name).ok().and_then(|id| self.lifts.get(id))
    }

    pub fn station(&self, name: &str) -> Option<&Station> {
        match self.member(name) {
            Ok(Member::Station(id)) => self.stations.get(id),
            _ => None,
        }
    }

    pub fn sensor(&self, name: &str) -> Option<&TemperatureSensor> {
        self.sensor_names
            .get(name)
            .and_then(|id| self.sensors.get(*id))
    }

    fn area_id(&self, name: &str) -> Option<AreaId> {
        self.area_order
            .iter()
            .copied()
            .find(|id| self.areas.get(*id).is_some_and(|a| a.name() == name))
    }

    pub fn area(&self, name: &str) -> Option<&Area> {
        self.area_id(name).and_then(|id| self.areas.get(id))
    }

    // ─── Tags ───────────────────────────────────────────────────────

    fn all_tags(&self) -> Vec<&Tag> {
        let mut out = self.tags.all();
        for id in &self.area_order {
            if let Some(area) = self.areas.get(*id) {
                out.extend(area.tags());
            }
        }
        for segment in self.segments.values() {
            out.extend(segment.tags());
        }
        for lift in self.lifts.values() {
            out.extend(lift.tags());
        }
        for station in self.stations.values() {
            out.extend(station.tags());
        }
        for sensor in self.sensors.values() {
            out.extend(sensor.tags());
        }
        for (_, node) in self.errors.iter() {
            out.extend(node.tags());
        }
        out
    }

    fn all_tags_mut(&mut self) -> Vec<&mut Tag> {
        let mut out = self.tags.all_mut();
        for area in self.areas.values_mut() {
            out.extend(area.tags_mut());
        }
        for segment in self.segments.values_mut() {
            out.extend(segment.tags_mut());
        }
        for lift in self.lifts.values_mut() {
            out.extend(lift.tags_mut());
        }
        for station in self.stations.values_mut() {
            out.extend(station.tags_mut());
        }
        for sensor in self.sensors.values_mut() {
            out.extend(sensor.tags_mut());
        }
        for (_, node) in self.errors.iter_mut() {
            out.extend(node.tags_mut());
        }
        out
    }

    fn find_tag_mut(&mut self, name: &str) -> Result<&mut Tag, SimError> {
        self.all_tags_mut()
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| SimError::UnknownTag(name.to_string()))
    }

    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.all_tags().into_iter().find(|t| t.name() == name)
    }

    /// Every tag name with its current value.
    pub fn tag_values(&self) -> BTreeMap<String, TagValue> {
        self.all_tags()
            .into_iter()
            .map(|t| (t.name().to_string(), t.value().clone()))
            .collect()
    }

    /// External write, honoring the tag's write policy.
    ///
    /// # Errors
    /// - `UnknownTag` if no tag has this name
    /// - `WriteDenied` if the policy or the value kind rejects the write
    pub fn write_tag(&mut self, name: &str, value: TagValue) -> Result<(), SimError> {
        let tag = self.find_tag_mut(name)?;
        match tag.request(value) {
            ValueAccess::Ok => Ok(()),
            ValueAccess::Denied => Err(SimError::WriteDenied(name.to_string())),
        }
    }

    /// Register a change listener on a tag.
    pub fn subscribe<L: TagListener + 'static>(
        &mut self,
        name: &str,
        listener: L,
    ) -> Result<(), SimError> {
        self.find_tag_mut(name)?.on_change(listener);
        Ok(())
    }

    fn publish(&mut self) {
        let in_flight = u64::try_from(self.item_count()).unwrap_or(u64::MAX);
        let c = self.counters;
        let t = &mut self.tags;
        t.sim_time.set(self.elapsed);
        t.tick.set(self.tick);
        t.in_flight.set(in_flight);
        t.inserted.set(c.inserted);
        t.removed.set(c.removed);
        t.handovers.set(c.handovers);
    }
}
