//! # Rust Canvas
//!
//! One application-level windowing API (create a canvas, show it, receive
//! input, draw, run an event loop) over interchangeable native toolkits.
//!
//! ## Features
//!
//! - **Backend Selection**: name-keyed registry probed in a deterministic order
//! - **Normalized Input**: press/release/move/wheel with double-click
//!   detection, drag tracking and move throttling, identical on every backend
//! - **Timers**: interval timers driven by the selected event loop
//! - **Context Sharing**: canvases can share one GL context identity
//! - **Interactive Use**: a prompt idle hook and a pull-based notebook backend
//!   driven by an async host loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_canvas::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     let runtime = Runtime::new();
//!     let app = runtime.use_app(None)?;
//!
//!     let canvas = Canvas::new(&app, CanvasConfig::new("Hello").with_size(640, 480))?;
//!     let weak = canvas.downgrade();
//!     canvas.connect(EventType::KeyPress, move |_| {
//!         if let Some(canvas) = weak.upgrade() {
//!             canvas.close();
//!         }
//!     });
//!
//!     canvas.show(true);
//!     app.run();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod foundation;
pub mod input;
pub mod interactive;
pub mod timer;

mod application;
mod canvas;
mod runtime;

#[cfg(test)]
mod test_support;

pub use application::Application;
pub use backend::{Capabilities, SharedContext};
pub use canvas::{Canvas, WeakCanvas};
pub use crate::core::config::{CanvasConfig, GlConfig};
pub use error::{AppError, ProbeError};
pub use events::{CanvasEvent, EventHub, EventType};
pub use interactive::{HookStatus, InteractiveHook};
pub use runtime::Runtime;
pub use timer::{Timer, TimerCallbackId, TimerEvent};

/// Common imports for canvas users
pub mod prelude {
    pub use crate::{
        AppError, Application, Canvas, CanvasConfig, CanvasEvent, EventType, GlConfig, Runtime,
        SharedContext, Timer, TimerEvent, WeakCanvas,
        config::{AppConfig, Config, ProbeEnvironment},
        input::{Key, Modifiers, MouseButton, MouseEvent, MouseEventKind},
        interactive::{HookStatus, InteractiveHook},
    };
}
