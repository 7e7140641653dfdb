//! Per-segment transport state.
//!
//! A [`TransportHandler`] owns what is physically on one segment: nothing, an
//! item with its front position, or the trailing tail of an item that already
//! belongs to the next segment. It also holds the segment's adjacency and the
//! gates that the hand-off protocol in [`engine`](crate::engine) evaluates.

use crate::id::{ItemId, SegmentId};
use crate::item::Item;
use crate::link::CachedLink;
use bitflags::bitflags;

bitflags! {
    /// Segment status word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentStatus: u16 {
        /// Item owned by this segment.
        const OCCUPIED          = 0x0001;
        /// Tail of a handed-over item still on the belt.
        const TRAILING          = 0x0002;
        /// Area enabled, automatic and no fault.
        const TRANSPORT_ALLOWED = 0x0004;
        /// Drive commanded to run.
        const RUN_DRIVE         = 0x0008;
        /// Item waiting at the border for hand-off.
        const READY_HANDOVER    = 0x0010;
        /// Takeover gate open.
        const READY_TAKEOVER    = 0x0020;
        /// Interrupt command set.
        const INTERRUPTED       = 0x0040;
        /// Photo-eye covered.
        const PHOTOEYE          = 0x0080;
        /// Own or child fault active.
        const FAULT             = 0x0100;
    }
}

/// Part of a handed-over item still on the giving segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trailing {
    pub item: ItemId,
    /// Front position measured on the giving segment.
    pub position: f64,
    pub item_length: f64,
}

/// What is on the belt.
#[derive(Debug, Default)]
pub enum Load {
    #[default]
    Empty,
    Occupied { item: Item, position: f64 },
    Trailing(Trailing),
}

/// Transport state of one segment.
#[derive(Debug)]
pub struct TransportHandler {
    length: f64,
    load: Load,
    sources: Vec<SegmentId>,
    target: Option<SegmentId>,
    source_link: CachedLink,
    target_link: CachedLink,
    interrupted: bool,
    ready_takeover: bool,
    handover_gate: bool,
    transport_allowed: bool,
    run_drive: bool,
    received_tick: Option<u64>,
}

impl TransportHandler {
    pub fn new(length: f64) -> Self {
        Self {
            length,
            load: Load::Empty,
            sources: Vec::new(),
            target: None,
            source_link: CachedLink::default(),
            target_link: CachedLink::default(),
            interrupted: false,
            ready_takeover: true,
            handover_gate: true,
            transport_allowed: false,
            run_drive: false,
            received_tick: None,
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn load(&self) -> &Load {
        &self.load
    }

    pub fn occupant(&self) -> Option<&Item> {
        match &self.load {
            Load::Occupied { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Front position of the occupant; zero without occupant.
    pub fn position(&self) -> f64 {
        match &self.load {
            Load::Occupied { position, .. } => *position,
            _ => 0.0,
        }
    }

    pub fn trailing(&self) -> Option<&Trailing> {
        match &self.load {
            Load::Trailing(t) => Some(t),
            _ => None,
        }
    }

    pub fn has_occupant(&self) -> bool {
        matches!(self.load, Load::Occupied { .. })
    }

    /// Neither occupant nor tail.
    pub fn is_empty(&self) -> bool {
        matches!(self.load, Load::Empty)
    }

    /// Occupant at or past the border.
    pub fn at_border(&self) -> bool {
        match &self.load {
            Load::Occupied { position, .. } => *position >= self.length,
            _ => false,
        }
    }

    pub fn sources(&self) -> &[SegmentId] {
        &self.sources
    }

    pub fn target(&self) -> Option<SegmentId> {
        self.target
    }

    pub fn source_link(&self) -> CachedLink {
        self.source_link
    }

    pub fn target_link(&self) -> CachedLink {
        self.target_link
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn ready_takeover(&self) -> bool {
        self.ready_takeover
    }

    /// Outbound gate; closed only on a lift carrier away from its target stop.
    pub fn handover_gate(&self) -> bool {
        self.handover_gate
    }

    pub fn transport_allowed(&self) -> bool {
        self.transport_allowed
    }

    pub fn run_drive(&self) -> bool {
        self.run_drive
    }

    /// Item waiting at the border with every outbound condition met.
    pub fn ready_handover(&self) -> bool {
        self.transport_allowed && !self.interrupted && self.handover_gate && self.at_border()
    }

    /// Photo-eye at half length, covered by occupant or tail.
    pub fn photoeye(&self) -> bool {
        let eye = self.length / 2.0;
        let covers = |front: f64, len: f64| front >= eye && front - len <= eye;
        match &self.load {
            Load::Occupied { item, position } => covers(*position, item.length()),
            Load::Trailing(t) => covers(t.position, t.item_length),
            Load::Empty => false,
        }
    }

    pub fn received_in(&self, tick: u64) -> bool {
        self.received_tick == Some(tick)
    }

    pub fn status(&self, fault: bool) -> SegmentStatus {
        let mut s = SegmentStatus::empty();
        s.set(SegmentStatus::OCCUPIED, self.has_occupant());
        s.set(SegmentStatus::TRAILING, self.trailing().is_some());
        s.set(SegmentStatus::TRANSPORT_ALLOWED, self.transport_allowed);
        s.set(SegmentStatus::RUN_DRIVE, self.run_drive);
        s.set(SegmentStatus::READY_HANDOVER, self.ready_handover());
        s.set(SegmentStatus::READY_TAKEOVER, self.ready_takeover);
        s.set(SegmentStatus::INTERRUPTED, self.interrupted);
        s.set(SegmentStatus::PHOTOEYE, self.photoeye());
        s.set(SegmentStatus::FAULT, fault);
        s
    }

    // ─── Mutation (engine only) ─────────────────────────────────────

    /// Replace adjacency. Both caches are invalidated; returns whether the
    /// linkage changed.
    pub(crate) fn set_links(&mut self, sources: Vec<SegmentId>, target: Option<SegmentId>) -> bool {
        let changed = self.sources != sources || self.target != target;
        self.sources = sources;
        self.target = target;
        self.invalidate_links();
        changed
    }

    pub(crate) fn invalidate_links(&mut self) {
        self.source_link.invalidate();
        self.target_link.invalidate();
    }

    pub(crate) fn cache_source(&mut self, id: Option<SegmentId>) {
        self.source_link.set(id);
    }

    pub(crate) fn cache_target(&mut self, id: Option<SegmentId>) {
        self.target_link.set(id);
    }

    pub(crate) fn set_interrupted(&mut self, interrupted: bool) {
        self.interrupted = interrupted;
    }

    pub(crate) fn set_ready_takeover(&mut self, open: bool) {
        self.ready_takeover = open;
    }

    pub(crate) fn set_handover_gate(&mut self, open: bool) {
        self.handover_gate = open;
    }

    pub(crate) fn set_transport_allowed(&mut self, allowed: bool) {
        self.transport_allowed = allowed;
    }

    pub(crate) fn set_run_drive(&mut self, run: bool) {
        self.run_drive = run;
    }

    pub(crate) fn set_position(&mut self, next: f64) {
        if let Load::Occupied { position, .. } = &mut self.load {
            *position = next;
        }
    }

    /// Place an item. The caller checks emptiness.
    pub(crate) fn place(&mut self, item: Item, position: f64, tick: Option<u64>) {
        self.load = Load::Occupied { item, position };
        self.received_tick = tick;
    }

    /// Remove the occupant, leaving the segment empty.
    pub(crate) fn take_occupant(&mut self) -> Option<(Item, f64)> {
        match std::mem::take(&mut self.load) {
            Load::Occupied { item, position } => Some((item, position)),
            other => {
                self.load = other;
                None
            }
        }
    }

    /// Keep the tail of an item handed downstream. Dropped at once if it is
    /// already past the belt.
    pub(crate) fn leave_tail(&mut self, item: ItemId, position: f64, item_length: f64) {
        let tail = Trailing {
            item,
            position,
            item_length,
        };
        self.load = if self.tail_cleared(&tail) {
            Load::Empty
        } else {
            Load::Trailing(tail)
        };
    }

    /// Move the tail by `step`; returns `true` once it has left the belt.
    pub(crate) fn advance_tail(&mut self, step: f64) -> bool {
        let Load::Trailing(mut tail) = self.load else {
            return false;
        };
        tail.position += step;
        if self.tail_cleared(&tail) {
            self.load = Load::Empty;
            true
        } else {
            self.load = Load::Trailing(tail);
            false
        }
    }

    fn tail_cleared(&self, tail: &Trailing) -> bool {
        tail.position > self.length + tail.item_length
    }
}
