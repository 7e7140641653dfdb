//! Transport and hand-off engine.
//!
//! The [`Engine`] is a short-lived view over the plant's segment arena, error
//! tree and item pool. It runs the per-tick segment state machine and the
//! hand-off transaction between two segments, which needs mutable access to
//! both sides at once.
//!
//! # Hand-off
//!
//! Ownership moves in one call, either pushed by the giver
//! ([`request_transport`](Engine::request_transport)) or pulled by the taker
//! during its own tick. Either way the receiver must be empty, have its
//! takeover gate open and recognize the giver as its resolved source; the
//! giver keeps a trailing tail until the item has physically left its belt.

use crate::area::AreaState;
use crate::error::SimError;
use crate::fault::{ErrorTree, FaultKind};
use crate::id::{ItemId, SegmentId};
use crate::item::{Item, ItemPool};
use crate::segment::Segment;
use flowsim_common::consts::AUTO_CLEAR_DWELL_S;
use serde::Serialize;
use slotmap::SlotMap;
use tracing::{debug, trace};

/// Item bookkeeping. Only inserts and removals change the set of items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub inserted: u64,
    pub removed: u64,
    pub handovers: u64,
}

impl Counters {
    /// Items that should currently be on the line.
    pub fn in_flight(&self) -> u64 {
        self.inserted - self.removed
    }
}

/// Mutable view used for one advance or one external command.
pub struct Engine<'a> {
    pub(crate) segments: &'a mut SlotMap<SegmentId, Segment>,
    pub(crate) errors: &'a mut ErrorTree,
    pub(crate) pool: &'a mut ItemPool,
    pub(crate) counters: &'a mut Counters,
    /// Tick being advanced; items received in it do not move again.
    pub(crate) tick: u64,
}

impl<'a> Engine<'a> {
    pub fn new(
        segments: &'a mut SlotMap<SegmentId, Segment>,
        errors: &'a mut ErrorTree,
        pool: &'a mut ItemPool,
        counters: &'a mut Counters,
        tick: u64,
    ) -> Self {
        Self {
            segments,
            errors,
            pool,
            counters,
            tick,
        }
    }

    pub fn segment(&self, id: SegmentId) -> Result<&Segment, SimError> {
        self.segments
            .get(id)
            .ok_or_else(|| SimError::UnknownEntity(format!("segment {id:?}")))
    }

    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment, SimError> {
        self.segments
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownEntity(format!("segment {id:?}")))
    }

    pub fn errors(&self) -> &ErrorTree {
        self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ErrorTree {
        self.errors
    }

    // ─── Per-tick state machine ─────────────────────────────────────

    /// Advance one segment by `dt` seconds.
    pub fn advance_segment(
        &mut self,
        id: SegmentId,
        area: AreaState,
        dt: f64,
    ) -> Result<(), SimError> {
        self.apply_commands(id)?;

        let (node, drive_node) = {
            let seg = self.segment(id)?;
            (seg.node(), seg.drive().node())
        };
        let fault = self.errors.fault_active(node);
        let drive_fault = self.errors.fault_active(drive_node);
        let tick = self.tick;

        let seg = self.segment_mut(id)?;
        let allowed = area.released() && !fault;
        seg.handler.set_transport_allowed(allowed);
        let run = allowed
            && ((seg.handler.has_occupant() && !seg.handler.at_border())
                || seg.handler.trailing().is_some());
        seg.handler.set_run_drive(run);
        seg.drive.advance(dt, run, drive_fault);
        let step = dt * seg.drive.current_speed();

        if seg.handler.has_occupant() && !seg.handler.received_in(tick) {
            let next = seg.handler.position() + step;
            if next < seg.length() {
                seg.handler.set_position(next);
            } else {
                seg.handler.set_position(seg.length());
                let h = &seg.handler;
                let outbound = h.target().filter(|_| {
                    !h.interrupted() && h.transport_allowed() && h.handover_gate()
                });
                if let Some(target) = outbound {
                    self.request_transport(target, id, next)?;
                }
            }
        } else if seg.handler.advance_tail(step) {
            trace!("{} tail cleared", seg.name());
        }

        self.try_takeover(id)?;
        self.auto_clear(id, dt)?;
        self.auto_feed(id, dt)?;
        self.publish(id)
    }

    fn apply_commands(&mut self, id: SegmentId) -> Result<(), SimError> {
        let seg = self.segment_mut(id)?;
        let cmds = seg.take_commands();
        let (node, drive_node) = (seg.node(), seg.drive().node());

        if cmds.reset {
            self.reset_segment(id)?;
        }
        if cmds.drive_error {
            self.errors.raise(drive_node, FaultKind::Drive, "Overcurrent")?;
        }
        if cmds.jam {
            self.errors.raise(node, FaultKind::Jam, "Jam")?;
        }
        if cmds.add_item {
            match self.insert_new_item(id) {
                Ok(_) => {}
                Err(SimError::SegmentOccupied(name)) => {
                    debug!("Add item ignored, {} occupied", name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn try_takeover(&mut self, id: SegmentId) -> Result<(), SimError> {
        let seg = self.segment(id)?;
        if !seg.handler.is_empty() || !seg.handler.ready_takeover() {
            return Ok(());
        }
        if self.errors.fault_active(seg.node()) {
            return Ok(());
        }
        let Some(source) = self.resolve_source(id)? else {
            return Ok(());
        };
        let src = self.segment(source)?;
        if src.handler.ready_handover() {
            let at = src.handler.position();
            self.transfer(source, id, at)?;
        }
        Ok(())
    }

    fn auto_clear(&mut self, id: SegmentId, dt: f64) -> Result<(), SimError> {
        let seg = self.segment_mut(id)?;
        if !(seg.auto_clear() && seg.handler.ready_handover()) {
            seg.clear_timer = None;
            return Ok(());
        }
        let dwell = match seg.clear_timer {
            Some(t) => t + dt,
            None => 0.0,
        };
        seg.clear_timer = Some(dwell);
        if dwell >= AUTO_CLEAR_DWELL_S {
            if let Some(item) = self.remove_item(id)? {
                debug!("Auto-clear removed item {}", item.id());
            }
        }
        Ok(())
    }

    fn auto_feed(&mut self, id: SegmentId, dt: f64) -> Result<(), SimError> {
        let seg = self.segment_mut(id)?;
        if !(seg.auto_feed() && seg.handler.is_empty()) {
            seg.feed_timer = 0.0;
            return Ok(());
        }
        seg.feed_timer += dt;
        if seg.feed_timer >= seg.feed_interval() {
            seg.feed_timer = 0.0;
            self.insert_new_item(id)?;
        }
        Ok(())
    }

    // ─── Hand-off protocol ──────────────────────────────────────────

    /// Offer the requester's item to `receiver`.
    ///
    /// Granted iff the receiver is empty and not faulted, its takeover gate is
    /// open and its resolved source is the requester. `front` is the
    /// requester's unclamped next front position; the receiver adopts the
    /// item at `front - requester.length`.
    pub fn request_transport(
        &mut self,
        receiver: SegmentId,
        requester: SegmentId,
        front: f64,
    ) -> Result<bool, SimError> {
        let r = self.segment(receiver)?;
        if !r.handler.is_empty() || !r.handler.ready_takeover() {
            return Ok(false);
        }
        if self.errors.fault_active(r.node()) {
            return Ok(false);
        }
        if self.resolve_source(receiver)? != Some(requester) {
            trace!("Hand-off to {:?} refused, source not resolved", receiver);
            return Ok(false);
        }
        self.transfer(requester, receiver, front)?;
        Ok(true)
    }

    /// Resolve the upstream neighbor that may hand over next.
    ///
    /// One source resolves to itself. With several, a cached source is kept
    /// while it still owns an item; otherwise the first source in list order
    /// that is ready for hand-over wins and is cached.
    pub fn resolve_source(&mut self, id: SegmentId) -> Result<Option<SegmentId>, SimError> {
        let resolved = {
            let seg = self.segment(id)?;
            match seg.handler.sources() {
                [] => None,
                [only] => Some(*only),
                many => {
                    let cached = seg.handler.source_link().get().filter(|c| {
                        self.segments
                            .get(*c)
                            .is_some_and(|s| s.handler.has_occupant())
                    });
                    cached.or_else(|| {
                        many.iter().copied().find(|s| {
                            self.segments
                                .get(*s)
                                .is_some_and(|s| s.handler.ready_handover())
                        })
                    })
                }
            }
        };
        self.segment_mut(id)?.handler.cache_source(resolved);
        Ok(resolved)
    }

    /// Downstream neighbor, cached until the next invalidation.
    pub fn resolve_target(&mut self, id: SegmentId) -> Result<Option<SegmentId>, SimError> {
        let seg = self.segment_mut(id)?;
        if let Some(cached) = seg.handler.target_link().get() {
            return Ok(Some(cached));
        }
        let target = seg.handler.target();
        seg.handler.cache_target(target);
        Ok(target)
    }

    fn transfer(
        &mut self,
        giver: SegmentId,
        receiver: SegmentId,
        front: f64,
    ) -> Result<(), SimError> {
        let tick = self.tick;
        let g = self.segment_mut(giver)?;
        let giver_length = g.length();
        let giver_name = g.name().to_string();
        let Some((item, _)) = g.handler.take_occupant() else {
            return Err(SimError::InvalidParameter(format!(
                "{giver_name} has no item to hand over"
            )));
        };
        g.handler.leave_tail(item.id(), front, item.length());
        g.clear_timer = None;
        let item_id = item.id();

        let r = self.segment_mut(receiver)?;
        let at = (front - giver_length).clamp(0.0, r.length());
        r.handler.place(item, at, Some(tick));
        r.handler.invalidate_links();
        r.clear_timer = None;
        r.feed_timer = 0.0;
        debug!("Hand-off item {} {} -> {} at {}", item_id, giver_name, r.name(), at);

        self.counters.handovers += 1;
        self.publish(giver)?;
        self.publish(receiver)
    }

    // ─── Topology and gates ─────────────────────────────────────────

    /// Re-point a segment's neighbors.
    ///
    /// Both link caches are always invalidated; a changed linkage also resets
    /// the auto-clear dwell.
    pub fn set_adjacent(
        &mut self,
        id: SegmentId,
        sources: Vec<SegmentId>,
        target: Option<SegmentId>,
    ) -> Result<(), SimError> {
        if target == Some(id) || sources.contains(&id) {
            return Err(SimError::InvalidParameter(format!(
                "{} cannot link to itself",
                self.segment(id)?.name()
            )));
        }
        let mut source_names = Vec::with_capacity(sources.len());
        for s in &sources {
            source_names.push(self.segment(*s)?.name().to_string());
        }
        let target_name = match target {
            Some(t) => self.segment(t)?.name().to_string(),
            None => String::new(),
        };

        let seg = self.segment_mut(id)?;
        if seg.handler.set_links(sources, target) {
            seg.clear_timer = None;
            debug!(
                "{} linked [{}] -> [{}]",
                seg.name(),
                source_names.join(","),
                target_name
            );
        }
        seg.set_link_names(&source_names.join(","), &target_name);
        Ok(())
    }

    pub fn set_ready_takeover(&mut self, id: SegmentId, open: bool) -> Result<(), SimError> {
        self.segment_mut(id)?.handler.set_ready_takeover(open);
        self.publish(id)
    }

    pub fn set_handover_gate(&mut self, id: SegmentId, open: bool) -> Result<(), SimError> {
        self.segment_mut(id)?.handler.set_handover_gate(open);
        self.publish(id)
    }

    /// Unknown segments are never ready.
    pub fn ready_handover(&self, id: SegmentId) -> bool {
        self.segments
            .get(id)
            .is_some_and(|s| s.handler.ready_handover())
    }

    // ─── Items ──────────────────────────────────────────────────────

    /// Create an item of `length` on an empty segment at `position`.
    ///
    /// # Errors
    /// `SegmentOccupied` if the segment holds an item or a trailing tail.
    pub fn insert_item(
        &mut self,
        id: SegmentId,
        length: f64,
        position: f64,
    ) -> Result<ItemId, SimError> {
        let seg = self.segment(id)?;
        if !seg.handler.is_empty() {
            return Err(SimError::SegmentOccupied(seg.name().to_string()));
        }
        let item = self.pool.item_with_length(length);
        let item_id = item.id();
        let seg = self.segment_mut(id)?;
        let at = position.clamp(0.0, seg.length());
        seg.handler.place(item, at, None);
        seg.feed_timer = 0.0;
        seg.clear_timer = None;
        debug!("Item {} inserted on {} at {}", item_id, seg.name(), at);
        self.counters.inserted += 1;
        self.publish(id)?;
        Ok(item_id)
    }

    /// Insert a default item at half length.
    pub fn insert_new_item(&mut self, id: SegmentId) -> Result<ItemId, SimError> {
        let half = self.segment(id)?.length() / 2.0;
        let length = self.pool.default_length();
        self.insert_item(id, length, half)
    }

    /// Take the occupant off the line. A trailing tail is left alone.
    pub fn remove_item(&mut self, id: SegmentId) -> Result<Option<Item>, SimError> {
        let seg = self.segment_mut(id)?;
        let Some((item, _)) = seg.handler.take_occupant() else {
            return Ok(None);
        };
        seg.clear_timer = None;
        debug!("Item {} removed from {}", item.id(), seg.name());
        self.counters.removed += 1;
        self.publish(id)?;
        Ok(Some(item))
    }

    // ─── Faults ─────────────────────────────────────────────────────

    /// Raise `DriveFault("Overcurrent")` on the segment's drive.
    pub fn inject_drive_fault(&mut self, id: SegmentId) -> Result<(), SimError> {
        let node = self.segment(id)?.drive().node();
        self.errors.raise(node, FaultKind::Drive, "Overcurrent")?;
        self.publish(id)
    }

    /// Raise `JamFault("Jam")` on the segment.
    pub fn inject_jam(&mut self, id: SegmentId) -> Result<(), SimError> {
        let node = self.segment(id)?.node();
        self.errors.raise(node, FaultKind::Jam, "Jam")?;
        self.publish(id)
    }

    /// Clear the segment's and its drive's own faults.
    pub fn reset_segment(&mut self, id: SegmentId) -> Result<(), SimError> {
        let seg = self.segment(id)?;
        let (node, drive_node) = (seg.node(), seg.drive().node());
        self.errors.clear_error(drive_node)?;
        self.errors.clear_error(node)?;
        self.publish(id)
    }

    pub(crate) fn publish(&mut self, id: SegmentId) -> Result<(), SimError> {
        let node = self.segment(id)?.node();
        let fault = self.errors.fault_active(node);
        self.segment_mut(id)?.publish(fault);
        Ok(())
    }
}
