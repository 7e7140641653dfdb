//! # flowsim
//!
//! Discrete-time transport simulator for conveyor lines with lifts and
//! batching stations.
//!
//! # Module Structure
//!
//! - [`plant`] - Plant: entity arenas, topology, tick order, tag routing
//! - [`engine`] - Segment state machine and hand-off transaction
//! - [`transport`] - Per-segment load and link state
//! - [`segment`], [`lift`], [`station`] - Line entities
//! - [`drive`] - Velocity and positioning drive models
//! - [`fault`] - Hierarchical error tree
//! - [`area`] - Scheduling areas
//! - [`sensor`] - PT1 temperature sensor
//! - [`item`] - Items and the item pool
//! - [`runner`] - Fixed-cycle tick loop
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           Plant                               │
//! │  ┌───────────┐   ┌───────────────────────┐   ┌─────────────┐  │
//! │  │  Areas    │──►│ Lifts / Stations      │──►│   Engine    │  │
//! │  │ (order)   │   │ (composite logic)     │   │ (hand-off)  │  │
//! │  └───────────┘   └───────────────────────┘   └──────┬──────┘  │
//! │                                                     ▼         │
//! │  ┌───────────┐   ┌───────────────────────┐   ┌─────────────┐  │
//! │  │ ErrorTree │◄──│ Segments + Drives     │◄──│  ItemPool   │  │
//! │  └───────────┘   └───────────────────────┘   └─────────────┘  │
//! └───────────────────────────────▲───────────────────────────────┘
//!                                 │ Arc<Mutex<Plant>>
//!                           ┌─────┴─────┐
//!                           │ SimRunner │
//!                           └───────────┘
//! ```
//!
//! ```rust
//! use flowsim::Plant;
//! use flowsim_common::line::config::SegmentConfig;
//!
//! let mut plant = Plant::new("Demo");
//! let area = plant.add_area("A1", None).unwrap();
//! plant.add_segment(area, &SegmentConfig::new("S1")).unwrap();
//! plant.add_segment(area, &SegmentConfig::new("S2")).unwrap();
//! plant.link("S1", "S2").unwrap();
//! plant.switch_on();
//! plant.insert_new_item("S1").unwrap();
//! for _ in 0..10 {
//!     plant.advance(1.0).unwrap();
//! }
//! assert_eq!(plant.counters().handovers, 1);
//! ```

pub mod area;
pub mod drive;
pub mod engine;
pub mod error;
pub mod fault;
pub mod id;
pub mod item;
pub mod lift;
pub mod link;
pub mod plant;
pub mod runner;
pub mod segment;
pub mod sensor;
pub mod station;
pub mod transport;

// Re-export key types for convenience
pub use crate::engine::Counters;
pub use crate::error::SimError;
pub use crate::fault::{ErrorTree, FaultKind};
pub use crate::id::{ItemId, SegmentId};
pub use crate::item::{Item, ItemPool};
pub use crate::plant::Plant;
pub use crate::runner::{SimRunner, TimingStats};
