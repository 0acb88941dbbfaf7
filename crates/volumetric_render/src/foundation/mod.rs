//! Foundation utilities shared by every subsystem
//!
//! Math aliases and helpers, handle collections, and logging setup.

pub mod collections;
pub mod logging;
pub mod math;
