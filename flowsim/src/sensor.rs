//! First-order-lag temperature sensor.

use crate::error::SimError;
use flowsim_common::tag::{Tag, TagSource, tag_name};
use tracing::debug;

/// First-order lag `v(t) = k * (1 - exp(-t / T))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pt1 {
    k: f64,
    t: f64,
    elapsed: f64,
    value: f64,
}

impl Pt1 {
    /// # Errors
    /// `InvalidParameter` if `t` is not positive or `k` is not finite.
    pub fn new(k: f64, t: f64) -> Result<Self, SimError> {
        if !(t.is_finite() && t > 0.0) {
            return Err(SimError::InvalidParameter(format!(
                "PT1 time constant must be positive, got {t}"
            )));
        }
        if !k.is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "PT1 gain must be finite, got {k}"
            )));
        }
        Ok(Self {
            k,
            t,
            elapsed: 0.0,
            value: 0.0,
        })
    }

    pub fn tick(&mut self, dt: f64) -> f64 {
        self.elapsed += dt;
        self.value = self.k * (1.0 - (-self.elapsed / self.t).exp());
        self.value
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.value = 0.0;
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[derive(Debug)]
struct SensorTags {
    temperature: Tag,
    heat: Tag,
}

/// Heats along the PT1 curve while `Cmd_Heat_Toggle` is on and cools by the
/// same increments while it is off, never below zero.
#[derive(Debug)]
pub struct TemperatureSensor {
    name: String,
    pt1: Pt1,
    heating: bool,
    value: f64,
    last: f64,
    tags: SensorTags,
}

impl TemperatureSensor {
    pub fn new(name: &str, prefix: &str, pt1: Pt1) -> Self {
        Self {
            name: name.to_string(),
            pt1,
            heating: false,
            value: 0.0,
            last: 0.0,
            tags: SensorTags {
                temperature: Tag::new(tag_name(prefix, "Temperature"), 0.0),
                heat: Tag::command(tag_name(prefix, "Cmd_Heat_Toggle"), false),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn heating(&self) -> bool {
        self.heating
    }

    pub fn set_heating(&mut self, on: bool) {
        self.tags.heat.set(on);
    }

    pub fn advance(&mut self, dt: f64) {
        let heat = self.tags.heat.as_bool();
        if heat != self.heating {
            self.heating = heat;
            self.pt1.reset();
            self.last = 0.0;
            debug!("Sensor {} heating={}", self.name, heat);
        }

        let v = self.pt1.tick(dt);
        if self.heating {
            self.value = v;
        } else {
            self.value = (self.value - (v - self.last)).max(0.0);
            self.last = v;
        }
        self.tags.temperature.set(self.value);
    }
}

impl TagSource for TemperatureSensor {
    fn tags(&self) -> Vec<&Tag> {
        vec![&self.tags.temperature, &self.tags.heat]
    }

    fn tags_mut(&mut self) -> Vec<&mut Tag> {
        vec![&mut self.tags.temperature, &mut self.tags.heat]
    }
}
