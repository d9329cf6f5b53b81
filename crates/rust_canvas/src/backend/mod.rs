//! Backend contracts
//!
//! This module defines the traits that every toolkit adapter implements. The
//! public [`Application`](crate::Application), [`Canvas`](crate::Canvas) and
//! [`Timer`](crate::Timer) wrappers only ever talk to these traits; concrete
//! toolkit names are known to the [`BackendRegistry`] alone.
//!
//! # Design Philosophy
//! - **Composition**: an adapter owns its native widget plus a [`CanvasCore`]
//!   that performs the shared event synthesis
//! - **Single threaded**: every method takes `&self` and adapters use interior
//!   mutability, never holding a borrow while emitting events
//! - **No-op after close**: operations against a closed native handle log at
//!   debug level and return, they never panic or fail

pub mod context;
pub mod canvas_core;
pub mod headless;
pub mod notebook;
pub mod offscreen;
pub mod registry;
pub mod tick_timer;

#[cfg(feature = "glfw")]
pub mod glfw;

use std::any::Any;
use std::rc::Rc;
use std::time::Duration;

use bitflags::bitflags;

use crate::core::config::CanvasConfig;
use crate::error::AppError;
use crate::timer::TimerTarget;

pub use context::{ContextRef, ContextRole, NativeContextHandle, SharedContext};
pub use canvas_core::CanvasCore;
pub use offscreen::{Frame, FrameBuffer};
pub use registry::{BackendDescriptor, BackendFactory, BackendRegistry, ProbeContext};

bitflags! {
    /// Options an adapter is able to honour
    ///
    /// The canvas configuration validator compares requested options against
    /// this set before any native resource is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        /// Window title can be set
        const TITLE = 1 << 0;
        /// Size can be set
        const SIZE = 1 << 1;
        /// Position can be set
        const POSITION = 1 << 2;
        /// Visibility can be toggled
        const SHOW = 1 << 3;
        /// Vertical sync can be requested
        const VSYNC = 1 << 4;
        /// Resizability can be toggled
        const RESIZABLE = 1 << 5;
        /// Decorations can be toggled
        const DECORATE = 1 << 6;
        /// Fullscreen mode is available
        const FULLSCREEN = 1 << 7;
        /// GL contexts can be shared between canvases
        const CONTEXT = 1 << 8;
        /// More than one canvas may exist at once
        const MULTI_WINDOW = 1 << 9;
        /// Wheel events are delivered
        const SCROLL = 1 << 10;
        /// Canvases can be embedded in a parent widget
        const PARENT = 1 << 11;
        /// Canvases can be kept above other windows
        const ALWAYS_ON_TOP = 1 << 12;
        /// Toolkit reports double-clicks itself
        const NATIVE_DOUBLE_CLICK = 1 << 13;
    }
}

/// Window placement: position of the top-left corner plus logical size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Screen position
    pub position: (i32, i32),
    /// Logical size
    pub size: (u32, u32),
}

/// Everything an adapter needs to build one canvas
pub struct CanvasRequest {
    /// Validated configuration
    pub config: CanvasConfig,
    /// Context identity to join; the adapter calls [`SharedContext::add_ref`]
    pub context: SharedContext,
    /// Event synthesizer wired to the public canvas' event hub
    pub core: CanvasCore,
}

/// Application-level backend
///
/// One instance exists per selected backend. It owns the native event loop
/// and creates canvases and timers.
pub trait ApplicationBackend {
    /// Run one non-blocking dispatch pass; tick-driven timers tick here
    fn process_events(&self);

    /// Block in the native event loop until [`quit`](Self::quit)
    fn run(&self);

    /// Leave the event loop
    fn quit(&self);

    /// Create the native canvas described by `request`
    fn create_canvas(&self, request: CanvasRequest) -> Result<Rc<dyn CanvasBackend>, AppError>;

    /// Create a native timer that calls [`TimerTarget::fire`] on expiry
    fn create_timer(&self, target: TimerTarget) -> Result<Rc<dyn TimerBackend>, AppError>;

    /// Get access to the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Canvas-level backend
///
/// Adapters translate native events into calls on their [`CanvasCore`] and
/// implement the operations below. Once closed, every operation is a no-op.
pub trait CanvasBackend {
    /// Make this canvas' GL context current
    ///
    /// This is the only GL synchronization point.
    fn set_current(&self);

    /// Present the back buffer
    fn swap_buffers(&self);

    /// Get the current title
    fn get_title(&self) -> String;

    /// Set the title text
    fn set_title(&self, title: &str);

    /// Get the logical size
    fn get_size(&self) -> (u32, u32);

    /// Set the logical size
    fn set_size(&self, width: u32, height: u32);

    /// Get the framebuffer size in device pixels
    fn get_physical_size(&self) -> (u32, u32) {
        self.get_size()
    }

    /// Get the screen position of the top-left corner
    fn get_position(&self) -> (i32, i32);

    /// Move the canvas
    fn set_position(&self, x: i32, y: i32);

    /// Position and size together
    fn get_geometry(&self) -> Geometry {
        Geometry {
            position: self.get_position(),
            size: self.get_size(),
        }
    }

    /// Show or hide the canvas
    fn set_visible(&self, visible: bool);

    /// Check if the canvas is in fullscreen mode
    fn is_fullscreen(&self) -> bool;

    /// Switch fullscreen mode
    fn set_fullscreen(&self, fullscreen: bool);

    /// Request a redraw at the toolkit's convenience
    fn update(&self);

    /// Destroy the native canvas and emit `close`
    fn close(&self);

    /// Whether the native canvas is gone
    fn is_closed(&self) -> bool;

    /// Native context this canvas renders with
    fn context_handle(&self) -> Option<NativeContextHandle>;

    /// Snapshot of the rendered pixels, for offscreen adapters
    fn framebuffer(&self) -> Option<Frame> {
        None
    }

    /// Get access to the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;
}

/// Timer-level backend
///
/// At most one native schedule is pending at a time.
pub trait TimerBackend {
    /// Cancel any pending schedule, then fire every `interval`
    fn start(&self, interval: Duration);

    /// Cancel the pending schedule; idempotent
    fn stop(&self);

    /// Get access to the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;
}
