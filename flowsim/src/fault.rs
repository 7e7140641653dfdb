//! Hierarchical fault model.
//!
//! Every drive, segment, lift, station and area owns a node in the
//! [`ErrorTree`]. A fault set on a node is mirrored, keyed by its source id,
//! into the child map of every ancestor, so a parent knows which descendants
//! are faulted without walking the tree. Aggregates are updated when a fault
//! is set or cleared, never per tick.

use crate::error::SimError;
use crate::id::ErrorNodeId;
use flowsim_common::tag::{Tag, tag_name};
use serde::Serialize;
use slotmap::SlotMap;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Fault taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultKind {
    /// Actuator fault, e.g. overcurrent.
    Drive,
    /// Item stuck on a segment.
    Jam,
    /// Aggregated fault of a descendant.
    Child,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultKind::Drive => "DriveFault",
            FaultKind::Jam => "JamFault",
            FaultKind::Child => "ChildFault",
        })
    }
}

/// A node's own fault.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub source: String,
}

/// Entry of an ancestor's child map.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildFault {
    pub kind: FaultKind,
    pub message: String,
}

#[derive(Debug)]
struct NodeTags {
    error_active: Tag,
    error_source: Tag,
    error_message: Tag,
    child_error_active: Tag,
    child_errors: Tag,
}

impl NodeTags {
    fn new(prefix: &str) -> Self {
        Self {
            error_active: Tag::new(tag_name(prefix, "ErrorActive"), false),
            error_source: Tag::new(tag_name(prefix, "ErrorSource"), ""),
            error_message: Tag::new(tag_name(prefix, "ErrorMessage"), ""),
            child_error_active: Tag::new(tag_name(prefix, "ChildErrorActive"), false),
            child_errors: Tag::new(tag_name(prefix, "ChildErrors"), ""),
        }
    }
}

/// Fault flag with parent aggregation.
#[derive(Debug)]
pub struct ErrorNode {
    source_id: String,
    own: Option<Fault>,
    children: BTreeMap<String, ChildFault>,
    parent: Option<ErrorNodeId>,
    tags: NodeTags,
}

impl ErrorNode {
    /// Key under which this node's faults appear in ancestors.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn own_fault(&self) -> Option<&Fault> {
        self.own.as_ref()
    }

    /// Faults of descendants keyed by source id.
    pub fn child_faults(&self) -> &BTreeMap<String, ChildFault> {
        &self.children
    }

    pub fn parent(&self) -> Option<ErrorNodeId> {
        self.parent
    }

    /// Own fault present.
    pub fn error_pending(&self) -> bool {
        self.own.is_some()
    }

    /// Own fault or any descendant fault present.
    pub fn fault_active(&self) -> bool {
        self.own.is_some() || !self.children.is_empty()
    }

    /// Kind seen from outside: own kind, or `Child` when only descendants are faulted.
    pub fn aggregate_kind(&self) -> Option<FaultKind> {
        match (&self.own, self.children.is_empty()) {
            (Some(fault), _) => Some(fault.kind),
            (None, false) => Some(FaultKind::Child),
            (None, true) => None,
        }
    }

    fn publish(&mut self) {
        let (source, message) = match &self.own {
            Some(f) => (f.source.clone(), format!("{}: {}", f.kind, f.message)),
            None => (String::new(), String::new()),
        };
        let children = self
            .children
            .iter()
            .map(|(src, f)| format!("{src}={}: {}", f.kind, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        let pending = self.own.is_some();
        let child_active = !self.children.is_empty();
        self.tags.error_active.set(pending);
        self.tags.error_source.set(source);
        self.tags.error_message.set(message);
        self.tags.child_error_active.set(child_active);
        self.tags.child_errors.set(children);
    }

    pub fn tags(&self) -> Vec<&Tag> {
        let t = &self.tags;
        vec![
            &t.error_active,
            &t.error_source,
            &t.error_message,
            &t.child_error_active,
            &t.child_errors,
        ]
    }

    pub fn tags_mut(&mut self) -> Vec<&mut Tag> {
        let t = &mut self.tags;
        vec![
            &mut t.error_active,
            &mut t.error_source,
            &mut t.error_message,
            &mut t.child_error_active,
            &mut t.child_errors,
        ]
    }
}

/// Arena of error nodes.
#[derive(Debug, Default)]
pub struct ErrorTree {
    nodes: SlotMap<ErrorNodeId, ErrorNode>,
}

impl ErrorTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unlinked node. Its tags are published under `tag_prefix`.
    pub fn add_node(&mut self, source_id: impl Into<String>, tag_prefix: &str) -> ErrorNodeId {
        self.nodes.insert(ErrorNode {
            source_id: source_id.into(),
            own: None,
            children: BTreeMap::new(),
            parent: None,
            tags: NodeTags::new(tag_prefix),
        })
    }

    /// Add a node and link it below `parent`.
    pub fn add_child(
        &mut self,
        source_id: impl Into<String>,
        tag_prefix: &str,
        parent: ErrorNodeId,
    ) -> Result<ErrorNodeId, SimError> {
        let id = self.add_node(source_id, tag_prefix);
        if let Err(e) = self.link_to_parent(id, parent) {
            self.nodes.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn node(&self, id: ErrorNodeId) -> Option<&ErrorNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ErrorNodeId, &ErrorNode)> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ErrorNodeId, &mut ErrorNode)> {
        self.nodes.iter_mut()
    }

    fn get(&self, id: ErrorNodeId) -> Result<&ErrorNode, SimError> {
        self.nodes
            .get(id)
            .ok_or_else(|| SimError::UnknownEntity(format!("error node {id:?}")))
    }

    fn get_mut(&mut self, id: ErrorNodeId) -> Result<&mut ErrorNode, SimError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| SimError::UnknownEntity(format!("error node {id:?}")))
    }

    /// Link `node` below `parent`.
    ///
    /// # Errors
    /// - `AlreadyLinked` if `node` already has a parent
    /// - `LinkAfterFault` if `node` carries own or child faults
    /// - `LinkCycle` if `parent` is `node` or one of its descendants
    pub fn link_to_parent(&mut self, node: ErrorNodeId, parent: ErrorNodeId) -> Result<(), SimError> {
        self.get(parent)?;
        let n = self.get(node)?;
        if n.parent.is_some() {
            return Err(SimError::AlreadyLinked(n.source_id.clone()));
        }
        if n.fault_active() {
            return Err(SimError::LinkAfterFault(n.source_id.clone()));
        }
        if parent == node || self.ancestors(parent).contains(&node) {
            return Err(SimError::LinkCycle(n.source_id.clone()));
        }
        self.get_mut(node)?.parent = Some(parent);
        Ok(())
    }

    /// Ancestors of `node`, nearest first.
    pub fn ancestors(&self, node: ErrorNodeId) -> Vec<ErrorNodeId> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(id) = cursor {
            if out.len() > self.nodes.len() {
                break;
            }
            out.push(id);
            cursor = self.nodes.get(id).and_then(|n| n.parent);
        }
        out
    }

    /// Set the node's own fault and mirror it into every ancestor.
    ///
    /// Setting again under the same source overwrites; under a different
    /// source the previous key is retracted from the ancestors first.
    pub fn set_error(
        &mut self,
        node: ErrorNodeId,
        kind: FaultKind,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), SimError> {
        let message = message.into();
        let source = source.into();
        let previous = self.get(node)?.own.as_ref().map(|f| f.source.clone());
        if let Some(prev) = previous.filter(|p| *p != source) {
            for ancestor in self.ancestors(node) {
                self.clear_child_fault(ancestor, &prev)?;
            }
        }

        let n = self.get_mut(node)?;
        n.own = Some(Fault {
            kind,
            message: message.clone(),
            source: source.clone(),
        });
        n.publish();
        info!("Fault set on {}: {} {}", source, kind, message);

        for ancestor in self.ancestors(node) {
            self.report_child_fault(ancestor, &source, kind, &message)?;
        }
        Ok(())
    }

    /// Set a fault using the node's own source id.
    pub fn raise(
        &mut self,
        node: ErrorNodeId,
        kind: FaultKind,
        message: impl Into<String>,
    ) -> Result<(), SimError> {
        let source = self.get(node)?.source_id.clone();
        self.set_error(node, kind, message, source)
    }

    /// Clear the node's own fault and retract its key from every ancestor.
    /// Idempotent.
    pub fn clear_error(&mut self, node: ErrorNodeId) -> Result<(), SimError> {
        let n = self.get_mut(node)?;
        let Some(fault) = n.own.take() else {
            return Ok(());
        };
        n.publish();
        info!("Fault cleared on {}", fault.source);
        for ancestor in self.ancestors(node) {
            self.clear_child_fault(ancestor, &fault.source)?;
        }
        Ok(())
    }

    /// Insert or overwrite a child map entry.
    pub fn report_child_fault(
        &mut self,
        node: ErrorNodeId,
        source: &str,
        kind: FaultKind,
        message: &str,
    ) -> Result<(), SimError> {
        let n = self.get_mut(node)?;
        n.children.insert(
            source.to_string(),
            ChildFault {
                kind,
                message: message.to_string(),
            },
        );
        n.publish();
        debug!("{} sees child fault {} from {}", n.source_id, kind, source);
        Ok(())
    }

    /// Remove a child map entry. Absent keys are ignored.
    pub fn clear_child_fault(&mut self, node: ErrorNodeId, source: &str) -> Result<(), SimError> {
        let n = self.get_mut(node)?;
        if n.children.remove(source).is_some() {
            n.publish();
            debug!("{} child fault from {} cleared", n.source_id, source);
        }
        Ok(())
    }

    /// Own fault present. Unknown nodes report `false`.
    pub fn error_pending(&self, node: ErrorNodeId) -> bool {
        self.nodes.get(node).is_some_and(ErrorNode::error_pending)
    }

    /// Own or descendant fault present. Unknown nodes report `false`.
    pub fn fault_active(&self, node: ErrorNodeId) -> bool {
        self.nodes.get(node).is_some_and(ErrorNode::fault_active)
    }
}
