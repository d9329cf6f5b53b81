//! # Core Canvas Module
//!
//! Shared records describing what a canvas should look like. Every adapter
//! receives the same [`CanvasConfig`], already checked against its
//! capabilities.

pub mod config;

// Re-export commonly used config types
pub use config::{
    CanvasConfig,
    ContextSpec,
    GlConfig,
    ParentHandle,
};
