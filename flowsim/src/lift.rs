//! Vertical lift with a carrier segment.
//!
//! A [`Lift`] moves its carrier between pick-up stops (sources, in priority
//! order) and one drop-off stop (target). The carrier is an ordinary
//! [`Segment`](crate::segment::Segment) whose neighbors are re-pointed to
//! whichever stop is currently exposed.
//!
//! ```text
//!   source[0] ──┐
//!   source[1] ──┼──▶ [carrier] ──▶ target
//!   ...       ──┘      ▲▼ positioning drive
//! ```

use crate::area::AreaState;
use crate::drive::Drive;
use crate::engine::Engine;
use crate::error::SimError;
use crate::id::{ErrorNodeId, SegmentId};
use flowsim_common::consts::{LIFT_SPEED_FAST, LIFT_SPEED_SLOW};
use flowsim_common::tag::{Tag, TagSource, tag_name};
use tracing::debug;

/// Segment served by the lift at a height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiftStop {
    pub segment: SegmentId,
    pub position: f64,
}

/// Stop currently linked to the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exposure {
    #[default]
    None,
    /// Index into the source list.
    Source(usize),
    Target,
}

#[derive(Debug)]
struct LiftTags {
    designation: Tag,
    kind: Tag,
    position: Tag,
    in_motion: Tag,
    in_position: Tag,
    move_fast: Tag,
    reset: Tag,
}

#[derive(Debug)]
pub struct Lift {
    name: String,
    designation: String,
    height: f64,
    carrier: SegmentId,
    drive: Drive,
    node: ErrorNodeId,
    sources: Vec<LiftStop>,
    target: Option<LiftStop>,
    exposure: Exposure,
    tags: LiftTags,
}

impl Lift {
    /// Lift without stops. `drive` starts at `height / 2`.
    pub fn new(
        name: &str,
        designation: &str,
        prefix: &str,
        height: f64,
        carrier: SegmentId,
        drive: Drive,
        node: ErrorNodeId,
    ) -> Self {
        let tags = LiftTags {
            designation: Tag::new(tag_name(prefix, "ReferenceDesignation"), designation),
            kind: Tag::new(tag_name(prefix, "Type"), "Lift"),
            position: Tag::new(tag_name(prefix, "LiftPosition"), drive.encoder()),
            in_motion: Tag::new(tag_name(prefix, "InMotion"), false),
            in_position: Tag::new(tag_name(prefix, "InPosition"), true),
            move_fast: Tag::command(tag_name(prefix, "Cmd_MoveFast_Toggle"), true),
            reset: Tag::command(tag_name(prefix, "Cmd_ResetError_Tap"), false),
        };
        Self {
            name: name.to_string(),
            designation: designation.to_string(),
            height,
            carrier,
            drive,
            node,
            sources: Vec::new(),
            target: None,
            exposure: Exposure::None,
            tags,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn designation(&self) -> &str {
        &self.designation
    }

    pub fn carrier(&self) -> SegmentId {
        self.carrier
    }

    pub fn drive(&self) -> &Drive {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut Drive {
        &mut self.drive
    }

    pub fn node(&self) -> ErrorNodeId {
        self.node
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn position(&self) -> f64 {
        self.drive.encoder()
    }

    pub fn sources(&self) -> &[LiftStop] {
        &self.sources
    }

    pub fn target(&self) -> Option<LiftStop> {
        self.target
    }

    pub fn exposure(&self) -> Exposure {
        self.exposure
    }

    /// Replace the stops. The carrier is detached from whatever stop it
    /// currently exposes; the next control pass picks a stop from the new
    /// lists.
    ///
    /// # Errors
    /// `InvalidParameter` if a stop lies outside `0..=height`.
    pub fn set_stops(
        &mut self,
        e: &mut Engine<'_>,
        sources: Vec<LiftStop>,
        target: Option<LiftStop>,
    ) -> Result<(), SimError> {
        for stop in sources.iter().chain(target.iter()) {
            if !(0.0..=self.height).contains(&stop.position) {
                return Err(SimError::InvalidParameter(format!(
                    "{}: stop {} outside 0..={}",
                    self.name, stop.position, self.height
                )));
            }
        }
        if self.exposure != Exposure::None {
            self.unexpose(e)?;
        }
        self.sources = sources;
        self.target = target;
        Ok(())
    }

    /// Select fast or slow travel.
    pub fn set_move_fast(&mut self, fast: bool) {
        self.tags.move_fast.set(fast);
        self.apply_speed();
    }

    fn apply_speed(&mut self) {
        let speed = if self.tags.move_fast.as_bool() {
            LIFT_SPEED_FAST
        } else {
            LIFT_SPEED_SLOW
        };
        if speed != self.drive.setpoint_speed() {
            self.drive.set_speed(speed);
        }
    }

    /// Advance carrier, lift logic and drive by one tick.
    pub fn advance(&mut self, e: &mut Engine<'_>, area: AreaState, dt: f64) -> Result<(), SimError> {
        if self.tags.reset.take_tap() {
            self.reset(e)?;
        }
        self.apply_speed();

        e.advance_segment(self.carrier, area, dt)?;
        self.control(e)?;

        let released = area.released() && !e.errors().fault_active(self.node);
        let drive_fault = e.errors().fault_active(self.drive.node());
        self.drive.advance(dt, released, drive_fault);
        self.publish();
        Ok(())
    }

    /// Clear the lift's, its drive's and the carrier's own faults.
    pub fn reset(&mut self, e: &mut Engine<'_>) -> Result<(), SimError> {
        e.errors_mut().clear_error(self.drive.node())?;
        e.errors_mut().clear_error(self.node)?;
        e.reset_segment(self.carrier)
    }

    fn control(&mut self, e: &mut Engine<'_>) -> Result<(), SimError> {
        if self.drive.busy() {
            return Ok(());
        }
        let (occupied, trailing) = {
            let h = e.segment(self.carrier)?.handler();
            (h.has_occupant(), h.trailing().is_some())
        };

        if occupied {
            if let Exposure::Source(i) = self.exposure {
                if let Some(stop) = self.sources.get(i) {
                    if e.segment(stop.segment)?.handler().trailing().is_some() {
                        return Ok(());
                    }
                }
                self.unexpose(e)?;
            }
            let Some(target) = self.target else {
                return Ok(());
            };
            if self.drive.encoder() == target.position {
                if self.exposure != Exposure::Target {
                    self.expose(e, Exposure::Target)?;
                }
            } else {
                self.drive.move_to(target.position)?;
            }
            return Ok(());
        }

        if trailing {
            return Ok(());
        }

        match self.exposure {
            Exposure::Target => self.unexpose(e)?,
            Exposure::Source(i) => {
                let waiting = self.sources.get(i).is_some_and(|stop| {
                    e.ready_handover(stop.segment) && self.drive.encoder() == stop.position
                });
                if waiting {
                    return Ok(());
                }
                self.unexpose(e)?;
            }
            Exposure::None => {}
        }

        let next = self
            .sources
            .iter()
            .copied()
            .enumerate()
            .find(|(_, stop)| e.ready_handover(stop.segment));
        if let Some((i, stop)) = next {
            if self.drive.encoder() == stop.position {
                self.expose(e, Exposure::Source(i))?;
            } else {
                self.drive.move_to(stop.position)?;
            }
        }
        Ok(())
    }

    fn expose(&mut self, e: &mut Engine<'_>, exposure: Exposure) -> Result<(), SimError> {
        match exposure {
            Exposure::Source(i) => {
                let Some(stop) = self.sources.get(i) else {
                    return self.unexpose(e);
                };
                e.set_adjacent(self.carrier, vec![stop.segment], None)?;
                e.set_handover_gate(self.carrier, false)?;
                e.set_ready_takeover(self.carrier, true)?;
            }
            Exposure::Target => {
                let target = self.target.map(|t| t.segment);
                e.set_adjacent(self.carrier, Vec::new(), target)?;
                e.set_ready_takeover(self.carrier, false)?;
                e.set_handover_gate(self.carrier, true)?;
            }
            Exposure::None => return self.unexpose(e),
        }
        debug!("Lift {} exposes {:?} at {}", self.name, exposure, self.drive.encoder());
        self.exposure = exposure;
        Ok(())
    }

    fn unexpose(&mut self, e: &mut Engine<'_>) -> Result<(), SimError> {
        e.set_adjacent(self.carrier, Vec::new(), None)?;
        e.set_ready_takeover(self.carrier, false)?;
        e.set_handover_gate(self.carrier, false)?;
        self.exposure = Exposure::None;
        Ok(())
    }

    fn publish(&mut self) {
        let t = &mut self.tags;
        t.position.set(self.drive.encoder());
        t.in_motion.set(self.drive.is_running());
        t.in_position.set(!self.drive.busy());
    }
}

impl TagSource for Lift {
    fn tags(&self) -> Vec<&Tag> {
        let t = &self.tags;
        let mut out = vec![
            &t.designation,
            &t.kind,
            &t.position,
            &t.in_motion,
            &t.in_position,
            &t.move_fast,
            &t.reset,
        ];
        out.extend(self.drive.tags());
        out
    }

    fn tags_mut(&mut self) -> Vec<&mut Tag> {
        let t = &mut self.tags;
        let mut out = vec![
            &mut t.designation,
            &mut t.kind,
            &mut t.position,
            &mut t.in_motion,
            &mut t.in_position,
            &mut t.move_fast,
            &mut t.reset,
        ];
        out.extend(self.drive.tags_mut());
        out
    }
}
