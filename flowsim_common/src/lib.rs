//! flowsim common library
//!
//! Shared constants, configuration loading and the observable tag contract
//! used by every flowsim workspace crate.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Line-wide defaults
//! - [`line`] - Line topology configuration
//! - [`tag`] - Observable values, write policies and listeners
//! - [`prelude`] - Common re-exports for convenience
//!
//! ```rust
//! use flowsim_common::prelude::*;
//!
//! let mut tag = Tag::command("Cmd_AreaOn_Toggle", false);
//! assert_eq!(tag.request(TagValue::Bool(true)), ValueAccess::Ok);
//! ```

pub mod config;
pub mod consts;
pub mod line;
pub mod prelude;
pub mod tag;
