//! Scheduling areas.
//!
//! An [`Area`] owns the enable and auto-mode switches its members read and
//! the order in which the [`Plant`](crate::plant::Plant) advances them.

use crate::id::{ErrorNodeId, LiftId, SegmentId, StationId};
use flowsim_common::tag::{Tag, TagSource, tag_name};
use tracing::info;

/// Snapshot of the area switches handed to members each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaState {
    pub enabled: bool,
    pub auto: bool,
}

impl AreaState {
    /// Automatic transport permitted.
    pub fn released(self) -> bool {
        self.enabled && self.auto
    }
}

/// Area member in advance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Segment(SegmentId),
    Lift(LiftId),
    Station(StationId),
}

#[derive(Debug)]
struct AreaTags {
    designation: Tag,
    kind: Tag,
    area_on: Tag,
    mode_auto: Tag,
}

/// Container of members sharing enable and auto mode.
#[derive(Debug)]
pub struct Area {
    name: String,
    node: ErrorNodeId,
    members: Vec<Member>,
    applied_auto: bool,
    tags: AreaTags,
}

impl Area {
    pub fn new(
        name: &str,
        designation: &str,
        prefix: &str,
        node: ErrorNodeId,
        enabled: bool,
        auto: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            node,
            members: Vec::new(),
            applied_auto: true,
            tags: AreaTags {
                designation: Tag::new(tag_name(prefix, "ReferenceDesignation"), designation),
                kind: Tag::new(tag_name(prefix, "Type"), "Area"),
                area_on: Tag::command(tag_name(prefix, "Cmd_AreaOn_Toggle"), enabled),
                mode_auto: Tag::command(tag_name(prefix, "Cmd_ModeAuto_Toggle"), auto),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> ErrorNodeId {
        self.node
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub(crate) fn push_member(&mut self, member: Member) {
        self.members.push(member);
    }

    pub fn enabled(&self) -> bool {
        self.tags.area_on.as_bool()
    }

    pub fn auto(&self) -> bool {
        self.tags.mode_auto.as_bool()
    }

    pub fn state(&self) -> AreaState {
        AreaState {
            enabled: self.enabled(),
            auto: self.auto(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.tags.area_on.set(enabled) {
            info!("Area {} {}", self.name, if enabled { "on" } else { "off" });
        }
    }

    /// Takes effect at the start of the next area tick.
    pub fn set_auto(&mut self, auto: bool) {
        self.tags.mode_auto.set(auto);
    }

    /// New auto mode not yet applied to the member drives, if any.
    pub(crate) fn take_auto_change(&mut self) -> Option<bool> {
        let auto = self.auto();
        if auto == self.applied_auto {
            return None;
        }
        self.applied_auto = auto;
        info!("Area {} mode {}", self.name, if auto { "auto" } else { "manual" });
        Some(auto)
    }
}

impl TagSource for Area {
    fn tags(&self) -> Vec<&Tag> {
        let t = &self.tags;
        vec![&t.designation, &t.kind, &t.area_on, &t.mode_auto]
    }

    fn tags_mut(&mut self) -> Vec<&mut Tag> {
        let t = &mut self.tags;
        vec![
            &mut t.designation,
            &mut t.kind,
            &mut t.area_on,
            &mut t.mode_auto,
        ]
    }
}
