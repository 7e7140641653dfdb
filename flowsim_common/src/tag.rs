//! Observable values.
//!
//! A [`Tag`] is the only contract between the simulation core and whatever
//! mirrors its state to a monitor. The core sets tags after each advance and
//! reads command tags at the start of the next one. External writers go
//! through [`Tag::request`], which honors the tag's [`WritePolicy`].
//!
//! Listeners are notified only when a value actually changes.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Typed tag payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Discriminant of a [`TagValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Bool,
    Int,
    Float,
    Text,
}

impl TagValue {
    pub fn kind(&self) -> TagKind {
        match self {
            TagValue::Bool(_) => TagKind::Bool,
            TagValue::Int(_) => TagKind::Int,
            TagValue::Float(_) => TagKind::Float,
            TagValue::Text(_) => TagKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integers widen to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            TagValue::Float(f) => Some(*f),
            TagValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to `kind` where that is lossless enough for an operator write.
    fn coerce(self, kind: TagKind) -> Option<TagValue> {
        match (self, kind) {
            (v, k) if v.kind() == k => Some(v),
            (TagValue::Int(i), TagKind::Float) => Some(TagValue::Float(i as f64)),
            (TagValue::Float(f), TagKind::Int) if f.fract() == 0.0 => {
                Some(TagValue::Int(f as i64))
            }
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Bool(b) => write!(f, "{b}"),
            TagValue::Int(i) => write!(f, "{i}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<u32> for TagValue {
    fn from(value: u32) -> Self {
        TagValue::Int(i64::from(value))
    }
}

impl From<u64> for TagValue {
    fn from(value: u64) -> Self {
        TagValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

/// Who may change a tag from outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// State published by the core. External writes are denied.
    ReadOnly,
    /// Parameter the operator may change.
    Writable,
    /// Command consumed by the core on its next tick.
    Command,
}

impl WritePolicy {
    pub fn accepts_writes(self) -> bool {
        !matches!(self, WritePolicy::ReadOnly)
    }
}

/// Outcome of an external write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueAccess {
    Ok,
    Denied,
}

/// Change notification delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct TagChange {
    pub name: String,
    pub old: TagValue,
    pub new: TagValue,
}

/// Receives change notifications from a [`Tag`].
///
/// Implemented for every `FnMut(&TagChange) + Send` closure.
pub trait TagListener: Send {
    fn value_changed(&mut self, change: &TagChange);
}

impl<F> TagListener for F
where
    F: FnMut(&TagChange) + Send,
{
    fn value_changed(&mut self, change: &TagChange) {
        self(change)
    }
}

/// Listener that collects every change it sees.
///
/// Clones share the same buffer, so one handle can be registered while the
/// other is drained.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    changes: Arc<Mutex<Vec<TagChange>>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all changes recorded so far.
    pub fn drain(&self) -> Vec<TagChange> {
        std::mem::take(&mut *self.changes.lock())
    }

    pub fn len(&self) -> usize {
        self.changes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.lock().is_empty()
    }
}

impl TagListener for ChangeLog {
    fn value_changed(&mut self, change: &TagChange) {
        self.changes.lock().push(change.clone());
    }
}

/// Named observable value with a write policy and change listeners.
pub struct Tag {
    name: String,
    value: TagValue,
    policy: WritePolicy,
    listeners: Vec<Box<dyn TagListener>>,
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("policy", &self.policy)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Tag {
    /// Read-only state tag.
    pub fn new(name: impl Into<String>, initial: impl Into<TagValue>) -> Self {
        Self {
            name: name.into(),
            value: initial.into(),
            policy: WritePolicy::ReadOnly,
            listeners: Vec::new(),
        }
    }

    /// Operator-writable parameter.
    pub fn writable(name: impl Into<String>, initial: impl Into<TagValue>) -> Self {
        Self::new(name, initial).with_policy(WritePolicy::Writable)
    }

    /// Command tag.
    pub fn command(name: impl Into<String>, initial: impl Into<TagValue>) -> Self {
        Self::new(name, initial).with_policy(WritePolicy::Command)
    }

    pub fn with_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &TagValue {
        &self.value
    }

    pub fn kind(&self) -> TagKind {
        self.value.kind()
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Change the write policy, e.g. to gate a conditional command.
    pub fn set_policy(&mut self, policy: WritePolicy) {
        self.policy = policy;
    }

    pub fn as_bool(&self) -> bool {
        self.value.as_bool().unwrap_or(false)
    }

    pub fn as_float(&self) -> f64 {
        self.value.as_float().unwrap_or(0.0)
    }

    pub fn as_int(&self) -> i64 {
        self.value.as_int().unwrap_or(0)
    }

    pub fn as_text(&self) -> &str {
        self.value.as_text().unwrap_or("")
    }

    /// Update from the core side, bypassing the write policy.
    ///
    /// Returns `true` when the value changed; listeners fire only then.
    pub fn set(&mut self, value: impl Into<TagValue>) -> bool {
        let value = value.into();
        if value == self.value {
            return false;
        }
        let old = std::mem::replace(&mut self.value, value);
        if !self.listeners.is_empty() {
            let change = TagChange {
                name: self.name.clone(),
                old,
                new: self.value.clone(),
            };
            for listener in &mut self.listeners {
                listener.value_changed(&change);
            }
        }
        true
    }

    /// External write request.
    ///
    /// Denied for read-only tags and for values that cannot be converted to
    /// the tag's kind.
    pub fn request(&mut self, value: TagValue) -> ValueAccess {
        if !self.policy.accepts_writes() {
            return ValueAccess::Denied;
        }
        match value.coerce(self.kind()) {
            Some(value) => {
                self.set(value);
                ValueAccess::Ok
            }
            None => ValueAccess::Denied,
        }
    }

    /// Consume a momentary command: returns whether it was set and resets it.
    pub fn take_tap(&mut self) -> bool {
        let set = self.as_bool();
        if set {
            self.set(false);
        }
        set
    }

    /// Register a change listener.
    pub fn on_change<L: TagListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn subscribe(&mut self, listener: Box<dyn TagListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Entity that publishes tags.
pub trait TagSource {
    fn tags(&self) -> Vec<&Tag>;
    fn tags_mut(&mut self) -> Vec<&mut Tag>;

    fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.tags().into_iter().find(|t| t.name() == name)
    }

    fn find_tag_mut(&mut self, name: &str) -> Option<&mut Tag> {
        self.tags_mut().into_iter().find(|t| t.name() == name)
    }
}

/// Join a tag prefix and a short name with `/`.
pub fn tag_name(prefix: &str, short: &str) -> String {
    if prefix.is_empty() {
        short.to_string()
    } else {
        format!("{prefix}/{short}")
    }
}
