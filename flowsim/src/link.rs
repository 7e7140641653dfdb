//! Cached neighbor resolution.

use crate::id::SegmentId;

/// Lazily resolved neighbor of a segment.
///
/// Invalidated by `set_adjacent` and after every ownership transfer into the
/// segment, then resolved again on the next lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachedLink {
    #[default]
    Unresolved,
    Resolved(SegmentId),
}

impl CachedLink {
    pub fn get(self) -> Option<SegmentId> {
        match self {
            CachedLink::Resolved(id) => Some(id),
            CachedLink::Unresolved => None,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, CachedLink::Resolved(_))
    }

    pub fn set(&mut self, id: Option<SegmentId>) {
        *self = match id {
            Some(id) => CachedLink::Resolved(id),
            None => CachedLink::Unresolved,
        };
    }

    pub fn invalidate(&mut self) {
        *self = CachedLink::Unresolved;
    }
}
