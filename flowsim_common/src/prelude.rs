//! Prelude module for common re-exports.
//!
//! ```rust
//! use flowsim_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::line::config::{
    AreaConfig, ItemConfig, LiftConfig, LiftStopConfig, LineConfig, MemberConfig, RunnerConfig,
    SegmentConfig, SensorConfig, StationConfig,
};

// ─── Tags ───────────────────────────────────────────────────────────
pub use crate::tag::{
    ChangeLog, Tag, TagChange, TagKind, TagListener, TagSource, TagValue, ValueAccess,
    WritePolicy, tag_name,
};
