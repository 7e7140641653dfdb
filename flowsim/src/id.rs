//! Arena keys.
//!
//! Entities live in `slotmap` arenas owned by the [`Plant`](crate::plant::Plant);
//! adjacency, parent links and area membership are plain key fields.

use serde::Serialize;
use std::fmt;

slotmap::new_key_type! {
    /// Conveyor segment, including lift carriers and station segments.
    pub struct SegmentId;
    /// Lift.
    pub struct LiftId;
    /// Batching station.
    pub struct StationId;
    /// Scheduling area.
    pub struct AreaId;
    /// Temperature sensor.
    pub struct SensorId;
    /// Node in the error tree.
    pub struct ErrorNodeId;
}

/// Identifier of a transported item, unique per item pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
