//! Actuator model.
//!
//! A [`Drive`] is either a velocity drive (belt conveyor) or a positioning
//! drive (lift). Both are gated every tick by the run signal, the manual-mode
//! switch and the fault state of their own error node:
//!
//! ```text
//! moving = !fault && ((auto && run) || (manual && manual_run))
//! ```
//!
//! A positioning drive moves at its signed setpoint speed toward the target
//! and snaps to it on the step that would reach or pass it, so it never
//! overshoots.

use crate::error::SimError;
use crate::id::ErrorNodeId;
use flowsim_common::consts::{
    MANUAL_DRIVE_CURRENT, MANUAL_SPEED, POSITIONING_DRIVE_CURRENT, VELOCITY_DRIVE_CURRENT,
};
use flowsim_common::tag::{Tag, TagSource, WritePolicy, tag_name};
use serde::Serialize;
use tracing::{debug, trace};

/// Observable operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriveMode {
    /// Automatic belt drive.
    Velocity,
    /// Automatic positioning drive.
    Positioning,
    /// Manual jog mode.
    Manual,
    /// Own fault pending; outputs forced to zero.
    Error,
}

impl DriveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DriveMode::Velocity => "Velocity",
            DriveMode::Positioning => "Positioning",
            DriveMode::Manual => "Manual",
            DriveMode::Error => "Error",
        }
    }
}

/// Drive variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveKind {
    Velocity,
    Positioning { target: f64, busy: bool },
}

#[derive(Debug)]
struct DriveTags {
    designation: Tag,
    kind: Tag,
    mode: Tag,
    manual_mode: Tag,
    drive_on: Tag,
    current_speed: Tag,
    setpoint_speed: Tag,
    current: Tag,
    encoder: Tag,
    manual_on: Tag,
    busy: Option<Tag>,
    target: Option<Tag>,
}

/// Velocity or positioning actuator.
#[derive(Debug)]
pub struct Drive {
    designation: String,
    kind: DriveKind,
    manual: bool,
    manual_run: bool,
    setpoint_speed: f64,
    current_speed: f64,
    current_draw: f64,
    encoder: f64,
    running: bool,
    faulted: bool,
    node: ErrorNodeId,
    tags: DriveTags,
}

impl Drive {
    /// Belt drive running at `speed` when released.
    pub fn velocity(designation: &str, prefix: &str, speed: f64, node: ErrorNodeId) -> Self {
        Self::build(designation, prefix, speed, 0.0, DriveKind::Velocity, node)
    }

    /// Positioning drive starting at `position`, idle.
    pub fn positioning(
        designation: &str,
        prefix: &str,
        speed: f64,
        position: f64,
        node: ErrorNodeId,
    ) -> Self {
        let kind = DriveKind::Positioning {
            target: position,
            busy: false,
        };
        Self::build(designation, prefix, speed, position, kind, node)
    }

    fn build(
        designation: &str,
        prefix: &str,
        speed: f64,
        encoder: f64,
        kind: DriveKind,
        node: ErrorNodeId,
    ) -> Self {
        let positioning = matches!(kind, DriveKind::Positioning { .. });
        let tags = DriveTags {
            designation: Tag::new(tag_name(prefix, "ReferenceDesignation"), designation),
            kind: Tag::new(
                tag_name(prefix, "Type"),
                if positioning { "DrivePos" } else { "Drive" },
            ),
            mode: Tag::new(tag_name(prefix, "Mode"), ""),
            manual_mode: Tag::new(tag_name(prefix, "ManualMode"), false),
            drive_on: Tag::new(tag_name(prefix, "DriveOn"), false),
            current_speed: Tag::new(tag_name(prefix, "CurrentSpeed"), 0.0),
            setpoint_speed: Tag::new(tag_name(prefix, "SetpointSpeed"), speed),
            current: Tag::new(tag_name(prefix, "Current"), 0.0),
            encoder: Tag::new(tag_name(prefix, "Encoder"), encoder),
            manual_on: Tag::new(tag_name(prefix, "Cmd_ManualOn_Toggle"), false),
            busy: positioning.then(|| Tag::new(tag_name(prefix, "Busy"), false)),
            target: positioning.then(|| Tag::new(tag_name(prefix, "Target"), encoder)),
        };
        let mut drive = Self {
            designation: designation.to_string(),
            kind,
            manual: false,
            manual_run: false,
            setpoint_speed: speed,
            current_speed: 0.0,
            current_draw: 0.0,
            encoder,
            running: false,
            faulted: false,
            node,
            tags,
        };
        drive.publish();
        drive
    }

    pub fn designation(&self) -> &str {
        &self.designation
    }

    pub fn kind(&self) -> DriveKind {
        self.kind
    }

    pub fn node(&self) -> ErrorNodeId {
        self.node
    }

    pub fn mode(&self) -> DriveMode {
        if self.faulted {
            DriveMode::Error
        } else if self.manual {
            DriveMode::Manual
        } else {
            match self.kind {
                DriveKind::Velocity => DriveMode::Velocity,
                DriveKind::Positioning { .. } => DriveMode::Positioning,
            }
        }
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    pub fn manual_run(&self) -> bool {
        self.manual_run
    }

    pub fn setpoint_speed(&self) -> f64 {
        self.setpoint_speed
    }

    /// Signed speed of the last advance.
    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn current_draw(&self) -> f64 {
        self.current_draw
    }

    pub fn encoder(&self) -> f64 {
        self.encoder
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Positioning drive moving toward its target.
    pub fn busy(&self) -> bool {
        matches!(self.kind, DriveKind::Positioning { busy: true, .. })
    }

    pub fn target(&self) -> Option<f64> {
        match self.kind {
            DriveKind::Positioning { target, .. } => Some(target),
            DriveKind::Velocity => None,
        }
    }

    /// Change the setpoint speed.
    pub fn set_speed(&mut self, speed: f64) {
        self.setpoint_speed = speed.abs();
        self.tags.setpoint_speed.set(self.setpoint_speed);
    }

    /// Switch manual mode.
    ///
    /// Leaving manual mode drops the manual-run command and zeroes the
    /// outputs. The manual-run command tag accepts writes only in manual mode.
    pub fn set_manual(&mut self, manual: bool) {
        if !manual {
            self.manual_run = false;
            self.tags.manual_on.set(false);
            self.stop();
        }
        self.manual = manual;
        self.tags.manual_on.set_policy(if manual {
            WritePolicy::Command
        } else {
            WritePolicy::ReadOnly
        });
        self.publish();
        debug!("Drive {} manual={}", self.designation, manual);
    }

    /// Command manual run. Ignored outside manual mode.
    pub fn set_manual_run(&mut self, run: bool) {
        if self.manual {
            self.manual_run = run;
            self.tags.manual_on.set(run);
        }
    }

    /// Command an absolute move.
    ///
    /// # Errors
    /// - `DriveBusy` if a previous move is still in progress
    /// - `InvalidParameter` on a velocity drive or a non-finite target
    pub fn move_to(&mut self, target: f64) -> Result<(), SimError> {
        if !target.is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "{}: target {target} is not finite",
                self.designation
            )));
        }
        match self.kind {
            DriveKind::Velocity => Err(SimError::InvalidParameter(format!(
                "{} is not a positioning drive",
                self.designation
            ))),
            DriveKind::Positioning { busy: true, target: current } => Err(SimError::DriveBusy(
                format!("{} moving to {current}", self.designation),
            )),
            DriveKind::Positioning { busy: false, .. } => {
                let busy = self.encoder != target;
                self.kind = DriveKind::Positioning { target, busy };
                debug!("Drive {} move_to {} (busy={})", self.designation, target, busy);
                self.publish();
                Ok(())
            }
        }
    }

    /// Place the encoder without motion, e.g. at construction of a lift.
    pub fn set_encoder(&mut self, position: f64) {
        self.encoder = position;
        if let DriveKind::Positioning { target, .. } = self.kind {
            self.kind = DriveKind::Positioning {
                target,
                busy: target != position,
            };
        }
        self.publish();
    }

    /// Advance one tick.
    ///
    /// `run` is the automatic run/release signal, `fault` the drive's own
    /// fault state.
    pub fn advance(&mut self, dt: f64, run: bool, fault: bool) {
        self.manual_run = self.manual && self.tags.manual_on.as_bool();
        self.faulted = fault;

        if fault {
            self.stop();
            self.publish();
            return;
        }

        match self.kind {
            DriveKind::Velocity => {
                if (!self.manual && run) || (self.manual && self.manual_run) {
                    self.drive_at(self.setpoint_speed, VELOCITY_DRIVE_CURRENT, dt);
                } else {
                    self.stop();
                }
            }
            DriveKind::Positioning { target, busy } => {
                if self.manual {
                    if self.manual_run {
                        self.drive_at(MANUAL_SPEED, MANUAL_DRIVE_CURRENT, dt);
                    } else {
                        self.stop();
                    }
                } else if busy && run {
                    self.step_towards(target, dt);
                } else {
                    self.stop();
                }
            }
        }

        trace!(
            "Drive {} speed={} encoder={}",
            self.designation, self.current_speed, self.encoder
        );
        self.publish();
    }

    fn drive_at(&mut self, speed: f64, draw: f64, dt: f64) {
        self.current_speed = speed;
        self.current_draw = draw;
        self.encoder += speed * dt;
        self.running = true;
    }

    fn step_towards(&mut self, target: f64, dt: f64) {
        let remaining = target - self.encoder;
        if remaining == 0.0 {
            self.kind = DriveKind::Positioning {
                target,
                busy: false,
            };
            self.stop();
            return;
        }

        let speed = self.setpoint_speed.copysign(remaining);
        self.current_speed = speed;
        self.current_draw = POSITIONING_DRIVE_CURRENT;
        self.running = true;

        let step = speed * dt;
        if step.abs() >= remaining.abs() {
            self.encoder = target;
            self.kind = DriveKind::Positioning {
                target,
                busy: false,
            };
            debug!("Drive {} in position at {}", self.designation, target);
        } else {
            self.encoder += step;
        }
    }

    fn stop(&mut self) {
        self.current_speed = 0.0;
        self.current_draw = 0.0;
        self.running = false;
    }

    fn publish(&mut self) {
        let mode = self.mode().as_str();
        let t = &mut self.tags;
        t.mode.set(mode);
        t.manual_mode.set(self.manual);
        t.drive_on.set(self.running);
        t.current_speed.set(self.current_speed);
        t.current.set(self.current_draw);
        t.encoder.set(self.encoder);
        if let DriveKind::Positioning { target, busy } = self.kind {
            if let Some(tag) = t.busy.as_mut() {
                tag.set(busy);
            }
            if let Some(tag) = t.target.as_mut() {
                tag.set(target);
            }
        }
    }
}

impl TagSource for Drive {
    fn tags(&self) -> Vec<&Tag> {
        let t = &self.tags;
        let mut out = vec![
            &t.designation,
            &t.kind,
            &t.mode,
            &t.manual_mode,
            &t.drive_on,
            &t.current_speed,
            &t.setpoint_speed,
            &t.current,
            &t.encoder,
            &t.manual_on,
        ];
        out.extend(t.busy.iter());
        out.extend(t.target.iter());
        out
    }

    fn tags_mut(&mut self) -> Vec<&mut Tag> {
        let t = &mut self.tags;
        let mut out = vec![
            &mut t.designation,
            &mut t.kind,
            &mut t.mode,
            &mut t.manual_mode,
            &mut t.drive_on,
            &mut t.current_speed,
            &mut t.setpoint_speed,
            &mut t.current,
            &mut t.encoder,
            &mut t.manual_on,
        ];
        out.extend(t.busy.iter_mut());
        out.extend(t.target.iter_mut());
        out
    }
}

/// Designation of an owner's `index`-th drive.
///
/// `S1-A2-211-000` with index 1 becomes `S1-A2-211-D01`.
pub fn drive_designation(owner: &str, index: u8) -> String {
    match owner.rsplit_once('-') {
        Some((head, tail)) if tail.len() == 3 => format!("{head}-D{index:02}"),
        _ => format!("{owner}-D{index:02}"),
    }
}
