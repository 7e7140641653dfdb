//! Conveyor segment entity.
//!
//! A [`Segment`] couples a [`TransportHandler`] with its belt [`Drive`] and
//! the tags an operator sees. Per-tick behavior lives in
//! [`Engine::advance_segment`](crate::engine::Engine::advance_segment) because
//! hand-off needs both neighbors at once.

use crate::drive::Drive;
use crate::id::ErrorNodeId;
use crate::transport::TransportHandler;
use flowsim_common::consts::AUTO_FEED_INTERVAL_S;
use flowsim_common::tag::{Tag, TagSource, tag_name};

/// Taps consumed at the start of a segment tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentCommands {
    pub reset: bool,
    pub add_item: bool,
    pub drive_error: bool,
    pub jam: bool,
}

#[derive(Debug)]
struct SegmentTags {
    designation: Tag,
    kind: Tag,
    length: Tag,
    box_position: Tag,
    box_id: Tag,
    box_article: Tag,
    occupied: Tag,
    transport_allowed: Tag,
    ready_handover: Tag,
    ready_takeover: Tag,
    photoeye: Tag,
    source_name: Tag,
    target_name: Tag,
    status_word: Tag,
    interrupt: Tag,
    reset: Tag,
    auto_clear: Tag,
    auto_feed: Tag,
    feed_interval: Tag,
    add_item: Tag,
    drive_error: Tag,
    jam_error: Tag,
}

/// Behavior switches set at build time; all of them stay writable as tags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    pub auto_feed: bool,
    pub feed_interval: f64,
    pub auto_clear: bool,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            auto_feed: false,
            feed_interval: AUTO_FEED_INTERVAL_S,
            auto_clear: false,
        }
    }
}

/// Unit-capacity conveyor.
#[derive(Debug)]
pub struct Segment {
    name: String,
    designation: String,
    prefix: String,
    pub(crate) handler: TransportHandler,
    pub(crate) drive: Drive,
    node: ErrorNodeId,
    pub(crate) feed_timer: f64,
    pub(crate) clear_timer: Option<f64>,
    tags: SegmentTags,
}

impl Segment {
    pub fn new(
        name: &str,
        designation: &str,
        prefix: &str,
        length: f64,
        drive: Drive,
        node: ErrorNodeId,
        options: SegmentOptions,
    ) -> Self {
        let tags = SegmentTags {
            designation: Tag::new(tag_name(prefix, "ReferenceDesignation"), designation),
            kind: Tag::new(tag_name(prefix, "Type"), "Segment"),
            length: Tag::new(tag_name(prefix, "Length"), length),
            box_position: Tag::new(tag_name(prefix, "BoxPosition"), 0.0),
            box_id: Tag::new(tag_name(prefix, "BoxId"), 0u64),
            box_article: Tag::new(tag_name(prefix, "BoxArticle"), ""),
            occupied: Tag::new(tag_name(prefix, "Occupied"), false),
            transport_allowed: Tag::new(tag_name(prefix, "TransportAllowed"), false),
            ready_handover: Tag::new(tag_name(prefix, "ReadyHandover"), false),
            ready_takeover: Tag::new(tag_name(prefix, "ReadyTakeover"), true),
            photoeye: Tag::new(tag_name(prefix, "Photoeye"), false),
            source_name: Tag::new(tag_name(prefix, "SourceName"), ""),
            target_name: Tag::new(tag_name(prefix, "TargetName"), ""),
            status_word: Tag::new(tag_name(prefix, "StatusWord"), 0u32),
            interrupt: Tag::command(tag_name(prefix, "Cmd_Interrupt_Toggle"), false),
            reset: Tag::command(tag_name(prefix, "Cmd_ResetError_Tap"), false),
            auto_clear: Tag::command(tag_name(prefix, "Sim/AutoClear_Toggle"), options.auto_clear),
            auto_feed: Tag::command(tag_name(prefix, "Sim/AutoFeed_Toggle"), options.auto_feed),
            feed_interval: Tag::writable(
                tag_name(prefix, "Sim/AutoFeed_Interval"),
                options.feed_interval,
            ),
            add_item: Tag::command(tag_name(prefix, "Sim/AddItem_Tap"), false),
            drive_error: Tag::command(tag_name(prefix, "Sim/DriveError_Tap"), false),
            jam_error: Tag::command(tag_name(prefix, "Sim/JamError_Tap"), false),
        };
        Self {
            name: name.to_string(),
            designation: designation.to_string(),
            prefix: prefix.to_string(),
            handler: TransportHandler::new(length),
            drive,
            node,
            feed_timer: 0.0,
            clear_timer: None,
            tags,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn designation(&self) -> &str {
        &self.designation
    }

    /// Tag prefix, e.g. `Plant/AreaA0x/S1-A2-211-000`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn node(&self) -> ErrorNodeId {
        self.node
    }

    pub fn handler(&self) -> &TransportHandler {
        &self.handler
    }

    pub fn drive(&self) -> &Drive {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut Drive {
        &mut self.drive
    }

    pub fn length(&self) -> f64 {
        self.handler.length()
    }

    pub fn position(&self) -> f64 {
        self.handler.position()
    }

    pub fn auto_clear(&self) -> bool {
        self.tags.auto_clear.as_bool()
    }

    pub fn set_auto_clear(&mut self, on: bool) {
        self.tags.auto_clear.set(on);
    }

    pub fn auto_feed(&self) -> bool {
        self.tags.auto_feed.as_bool()
    }

    pub fn set_auto_feed(&mut self, on: bool) {
        self.tags.auto_feed.set(on);
    }

    /// Auto-feed interval; non-positive writes fall back to the default.
    pub fn feed_interval(&self) -> f64 {
        let interval = self.tags.feed_interval.as_float();
        if interval > 0.0 { interval } else { AUTO_FEED_INTERVAL_S }
    }

    /// Seconds the occupant has waited ready at the border.
    pub fn clear_dwell(&self) -> Option<f64> {
        self.clear_timer
    }

    /// Set the interrupt command directly.
    pub fn set_interrupted(&mut self, on: bool) {
        self.tags.interrupt.set(on);
        self.handler.set_interrupted(on);
    }

    /// Read and reset every tap.
    pub(crate) fn take_commands(&mut self) -> SegmentCommands {
        let t = &mut self.tags;
        let cmds = SegmentCommands {
            reset: t.reset.take_tap(),
            add_item: t.add_item.take_tap(),
            drive_error: t.drive_error.take_tap(),
            jam: t.jam_error.take_tap(),
        };
        self.handler.set_interrupted(self.tags.interrupt.as_bool());
        cmds
    }

    pub(crate) fn set_link_names(&mut self, sources: &str, target: &str) {
        self.tags.source_name.set(sources);
        self.tags.target_name.set(target);
    }

    /// Mirror transport state into the tags.
    pub(crate) fn publish(&mut self, fault: bool) {
        let h = &self.handler;
        let t = &mut self.tags;
        t.box_position.set(h.position());
        match h.occupant() {
            Some(item) => {
                t.box_id.set(item.id().0);
                t.box_article.set(item.article());
            }
            None => {
                t.box_id.set(0u64);
                t.box_article.set("");
            }
        }
        t.occupied.set(h.has_occupant());
        t.transport_allowed.set(h.transport_allowed());
        t.ready_handover.set(h.ready_handover());
        t.ready_takeover.set(h.ready_takeover());
        t.photoeye.set(h.photoeye());
        t.status_word.set(u32::from(h.status(fault).bits()));
    }
}

impl TagSource for Segment {
    fn tags(&self) -> Vec<&Tag> {
        let t = &self.tags;
        let mut out = vec![
            &t.designation,
            &t.kind,
            &t.length,
            &t.box_position,
            &t.box_id,
            &t.box_article,
            &t.occupied,
            &t.transport_allowed,
            &t.ready_handover,
            &t.ready_takeover,
            &t.photoeye,
            &t.source_name,
            &t.target_name,
            &t.status_word,
            &t.interrupt,
            &t.reset,
            &t.auto_clear,
            &t.auto_feed,
            &t.feed_interval,
            &t.add_item,
            &t.drive_error,
            &t.jam_error,
        ];
        out.extend(self.drive.tags());
        out
    }

    fn tags_mut(&mut self) -> Vec<&mut Tag> {
        let t = &mut self.tags;
        let mut out = vec![
            &mut t.designation,
            &mut t.kind,
            &mut t.length,
            &mut t.box_position,
            &mut t.box_id,
            &mut t.box_article,
            &mut t.occupied,
            &mut t.transport_allowed,
            &mut t.ready_handover,
            &mut t.ready_takeover,
            &mut t.photoeye,
            &mut t.source_name,
            &mut t.target_name,
            &mut t.status_word,
            &mut t.interrupt,
            &mut t.reset,
            &mut t.auto_clear,
            &mut t.auto_feed,
            &mut t.feed_interval,
            &mut t.add_item,
            &mut t.drive_error,
            &mut t.jam_error,
        ];
        out.extend(self.drive.tags_mut());
        out
    }
}
