//! Batching station.
//!
//! Two internal segments, infeed and carrier. While filling, items arriving
//! at the carrier border are stacked as long as the carrier may transport.
//! Once the batch is complete (or on abort) and the carrier is empty, the
//! infeed is detached and one batch item leaves through the carrier.
//!
//! ```text
//! Filling ──(count >= batch size | abort, carrier empty)──▶ Draining ──(carrier empty)──▶ Filling
//! ```

use crate::area::AreaState;
use crate::engine::Engine;
use crate::error::SimError;
use crate::id::{ErrorNodeId, SegmentId};
use crate::item::Item;
use flowsim_common::tag::{Tag, TagSource, tag_name};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StationState {
    Filling,
    Draining,
}

impl StationState {
    pub fn as_str(self) -> &'static str {
        match self {
            StationState::Filling => "Filling",
            StationState::Draining => "Draining",
        }
    }
}

#[derive(Debug)]
struct StationTags {
    designation: Tag,
    kind: Tag,
    state: Tag,
    batch_count: Tag,
    batch_size: Tag,
    batches_done: Tag,
    abort: Tag,
}

#[derive(Debug)]
pub struct Station {
    name: String,
    infeed: SegmentId,
    carrier: SegmentId,
    node: ErrorNodeId,
    sources: Vec<SegmentId>,
    target: Option<SegmentId>,
    state: StationState,
    stack: Vec<Item>,
    abort_pending: bool,
    batches_done: u64,
    tags: StationTags,
}

impl Station {
    pub fn new(
        name: &str,
        designation: &str,
        prefix: &str,
        infeed: SegmentId,
        carrier: SegmentId,
        node: ErrorNodeId,
        batch_size: u32,
    ) -> Self {
        let tags = StationTags {
            designation: Tag::new(tag_name(prefix, "ReferenceDesignation"), designation),
            kind: Tag::new(tag_name(prefix, "Type"), "Station"),
            state: Tag::new(tag_name(prefix, "State"), StationState::Filling.as_str()),
            batch_count: Tag::new(tag_name(prefix, "BatchCount"), 0u32),
            batch_size: Tag::writable(tag_name(prefix, "BatchSize"), batch_size.max(1)),
            batches_done: Tag::new(tag_name(prefix, "BatchesDone"), 0u64),
            abort: Tag::command(tag_name(prefix, "Cmd_Abort_Tap"), false),
        };
        Self {
            name: name.to_string(),
            infeed,
            carrier,
            node,
            sources: Vec::new(),
            target: None,
            state: StationState::Filling,
            stack: Vec::new(),
            abort_pending: false,
            batches_done: 0,
            tags,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn infeed(&self) -> SegmentId {
        self.infeed
    }

    pub fn carrier(&self) -> SegmentId {
        self.carrier
    }

    pub fn node(&self) -> ErrorNodeId {
        self.node
    }

    pub fn state(&self) -> StationState {
        self.state
    }

    /// Items stacked in the current batch.
    pub fn batch_count(&self) -> usize {
        self.stack.len()
    }

    pub fn batches_done(&self) -> u64 {
        self.batches_done
    }

    /// Batch threshold, at least one.
    pub fn batch_size(&self) -> usize {
        usize::try_from(self.tags.batch_size.as_int().max(1)).unwrap_or(1)
    }

    pub fn sources(&self) -> &[SegmentId] {
        &self.sources
    }

    pub fn target(&self) -> Option<SegmentId> {
        self.target
    }

    /// Request draining on the next tick regardless of the count.
    pub fn abort(&mut self) {
        self.tags.abort.set(true);
    }

    /// Replace upstream and downstream neighbors and re-link the internal
    /// segments for the current state.
    pub fn set_links(
        &mut self,
        e: &mut Engine<'_>,
        sources: Vec<SegmentId>,
        target: Option<SegmentId>,
    ) -> Result<(), SimError> {
        self.sources = sources;
        self.target = target;
        match self.state {
            StationState::Filling => self.link_filling(e),
            StationState::Draining => self.link_draining(e),
        }
    }

    fn link_filling(&self, e: &mut Engine<'_>) -> Result<(), SimError> {
        e.set_adjacent(self.infeed, self.sources.clone(), Some(self.carrier))?;
        e.set_adjacent(self.carrier, vec![self.infeed], None)
    }

    fn link_draining(&self, e: &mut Engine<'_>) -> Result<(), SimError> {
        e.set_adjacent(self.infeed, Vec::new(), None)?;
        e.set_adjacent(self.carrier, Vec::new(), self.target)
    }

    pub fn advance(&mut self, e: &mut Engine<'_>, area: AreaState, dt: f64) -> Result<(), SimError> {
        self.abort_pending |= self.tags.abort.take_tap();

        e.advance_segment(self.infeed, area, dt)?;
        e.advance_segment(self.carrier, area, dt)?;

        match self.state {
            StationState::Filling => {
                let (occupied, ready) = {
                    let h = e.segment(self.carrier)?.handler();
                    (h.has_occupant(), h.at_border() && h.transport_allowed())
                };
                if ready || (self.abort_pending && occupied) {
                    if let Some(item) = e.remove_item(self.carrier)? {
                        debug!("Station {} stacked item {}", self.name, item.id());
                        self.stack.push(item);
                    }
                }
                // The batch item needs an empty carrier.
                let full = self.abort_pending || self.stack.len() >= self.batch_size();
                if full && e.segment(self.carrier)?.handler().is_empty() {
                    self.begin_drain(e)?;
                }
            }
            StationState::Draining => {
                // Already draining.
                self.abort_pending = false;
                if e.segment(self.carrier)?.handler().is_empty() {
                    self.state = StationState::Filling;
                    self.link_filling(e)?;
                    debug!("Station {} filling", self.name);
                }
            }
        }
        self.publish();
        Ok(())
    }

    fn begin_drain(&mut self, e: &mut Engine<'_>) -> Result<(), SimError> {
        let longest = self
            .stack
            .iter()
            .map(Item::length)
            .fold(None, |acc: Option<f64>, len| Some(acc.map_or(len, |a| a.max(len))));
        if let Some(length) = longest {
            let half = e.segment(self.carrier)?.length() / 2.0;
            let batch = e.insert_item(self.carrier, length, half)?;
            self.batches_done += 1;
            info!("Station {} released batch item {}", self.name, batch);
        } else {
            debug!("Station {} drained empty batch", self.name);
        }
        self.stack.clear();
        self.abort_pending = false;
        self.state = StationState::Draining;
        self.link_draining(e)
    }

    fn publish(&mut self) {
        let t = &mut self.tags;
        t.state.set(self.state.as_str());
        t.batch_count.set(u64::try_from(self.stack.len()).unwrap_or(u64::MAX));
        t.batches_done.set(self.batches_done);
    }
}

impl TagSource for Station {
    fn tags(&self) -> Vec<&Tag> {
        let t = &self.tags;
        vec![
            &t.designation,
            &t.kind,
            &t.state,
            &t.batch_count,
            &t.batch_size,
            &t.batches_done,
            &t.abort,
        ]
    }

    fn tags_mut(&mut self) -> Vec<&mut Tag> {
        let t = &mut self.tags;
        vec![
            &mut t.designation,
            &mut t.kind,
            &mut t.state,
            &mut t.batch_count,
            &mut t.batch_size,
            &mut t.batches_done,
            &mut t.abort,
        ]
    }
}
