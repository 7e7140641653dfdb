//! Line topology description.
//!
//! A line is a set of areas, each with an ordered list of members (segments,
//! lifts and stations), plus free-standing sensors. The description is
//! data only; `flowsim::Plant::from_config` turns it into live entities.

pub mod config;
