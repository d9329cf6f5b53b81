//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Time sources (real and manually driven clocks)
//! - Logging utilities

pub mod time;
pub mod logging;
