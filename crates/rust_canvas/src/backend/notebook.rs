//! Pull-based notebook backend
//!
//! The frontend (a notebook widget) pulls frames with
//! [`NotebookCanvas::get_frame`] and pushes user input through
//! [`NotebookCanvas::handle_event`]. Nothing is drawn synchronously:
//! `update()` schedules a pull on the [`HostLoop`], and timers are host loop
//! callbacks that re-arm themselves.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, info};

use super::{
    ApplicationBackend, BackendDescriptor, CanvasBackend, CanvasCore, CanvasRequest, Capabilities,
    ContextRef, Frame, FrameBuffer, NativeContextHandle, ProbeContext, TimerBackend,
};
use crate::error::{AppError, ProbeError};
use crate::foundation::time::Clock;
use crate::input::{Key, Modifiers, MouseButton, MouseInput};
use crate::interactive::host_loop::{CallHandle, HostLoop};
use crate::timer::TimerTarget;

/// Registry name
pub const NAME: &str = "notebook";

/// Wheel deltas arrive in browser pixels; this many make one scroll step
const WHEEL_STEP: f64 = 100.0;

/// Descriptor of the notebook backend
pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor {
        name: NAME,
        toolkit: "Notebook",
        capabilities: Capabilities::SIZE
            | Capabilities::RESIZABLE
            | Capabilities::MULTI_WINDOW
            | Capabilities::SCROLL
            | Capabilities::NATIVE_DOUBLE_CLICK,
        offscreen: true,
        factory: probe,
    }
}

fn probe(context: &ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError> {
    let host = context
        .host_loop
        .ok_or_else(|| ProbeError::Unavailable("no host loop to schedule frames on".into()))?;
    Ok(Rc::new(NotebookApp::new(Rc::clone(host), Rc::clone(context.clock))))
}

/// Receives frames produced by scheduled draws
pub trait FrameSink {
    /// A new frame is ready for the frontend
    fn present(&self, frame: &Frame);
}

/// Input and lifecycle messages sent by the frontend
#[derive(Debug, Clone, PartialEq)]
pub enum FrontendEvent {
    /// Widget size changed
    Resize {
        /// Logical width
        width: f64,
        /// Logical height
        height: f64,
        /// Device pixels per logical pixel
        pixel_ratio: f64,
    },
    /// Button went down; buttons are numbered 1 = left, 2 = right, 3 = middle
    PointerDown {
        /// Position
        x: f64,
        /// Position
        y: f64,
        /// Button number
        button: u8,
        /// Modifiers
        modifiers: Modifiers,
    },
    /// Button went up
    PointerUp {
        /// Position
        x: f64,
        /// Position
        y: f64,
        /// Button number
        button: u8,
        /// Modifiers
        modifiers: Modifiers,
    },
    /// Pointer moved
    PointerMove {
        /// Position
        x: f64,
        /// Position
        y: f64,
        /// Modifiers
        modifiers: Modifiers,
    },
    /// Browser-detected double-click
    DoubleClick {
        /// Position
        x: f64,
        /// Position
        y: f64,
        /// Button number
        button: u8,
        /// Modifiers
        modifiers: Modifiers,
    },
    /// Wheel scrolled, deltas in browser pixels
    Wheel {
        /// Position
        x: f64,
        /// Position
        y: f64,
        /// Horizontal delta
        dx: f64,
        /// Vertical delta, positive is down
        dy: f64,
        /// Modifiers
        modifiers: Modifiers,
    },
    /// Key went down, `key` is the browser key name
    KeyDown {
        /// Browser key name
        key: String,
        /// Modifiers
        modifiers: Modifiers,
    },
    /// Key went up
    KeyUp {
        /// Browser key name
        key: String,
        /// Modifiers
        modifiers: Modifiers,
    },
    /// Widget was closed
    Close,
}

/// Application backend that defers everything to the host loop
pub struct NotebookApp {
    host: Rc<dyn HostLoop>,
    clock: Rc<dyn Clock>,
    next_context: Cell<u64>,
    canvases: RefCell<Vec<Weak<NotebookCanvas>>>,
}

impl NotebookApp {
    /// Backend scheduling onto `host`
    pub fn new(host: Rc<dyn HostLoop>, clock: Rc<dyn Clock>) -> Self {
        Self {
            host,
            clock,
            next_context: Cell::new(1),
            canvases: RefCell::new(Vec::new()),
        }
    }

    /// Canvases not yet closed
    pub fn canvas_count(&self) -> usize {
        let mut canvases = self.canvases.borrow_mut();
        canvases.retain(|canvas| canvas.upgrade().is_some_and(|canvas| !canvas.is_closed()));
        canvases.len()
    }
}

impl ApplicationBackend for NotebookApp {
    fn process_events(&self) {
        // The host loop dispatches everything
    }

    fn run(&self) {
        debug!("The notebook backend is driven by its host loop, run() returns");
    }

    fn quit(&self) {
        debug!("The notebook backend is driven by its host loop, quit() ignored");
    }

    fn create_canvas(&self, request: CanvasRequest) -> Result<Rc<dyn CanvasBackend>, AppError> {
        let CanvasRequest { config, context, core } = request;
        let context = context.add_ref(NAME, || {
            let id = self.next_context.get();
            self.next_context.set(id + 1);
            Ok(NativeContextHandle(id))
        })?;

        let canvas = Rc::new_cyclic(|weak_self| NotebookCanvas {
            weak_self: weak_self.clone(),
            host: Rc::clone(&self.host),
            clock: Rc::clone(&self.clock),
            core,
            context,
            title: RefCell::new(config.title.clone()),
            logical_size: Cell::new(config.size),
            pixel_ratio: Cell::new(1.0),
            lifecycle: Cell::new(Lifecycle::Pending),
            framebuffer: RefCell::new(FrameBuffer::default()),
            draw_pending: Cell::new(false),
            sink: RefCell::new(None),
            latest_frame: RefCell::new(None),
            frames_drawn: Cell::new(0),
        });

        self.canvases.borrow_mut().push(Rc::downgrade(&canvas));
        canvas.update();
        info!("Created notebook canvas '{}' {:?}", config.title, config.size);
        Ok(canvas)
    }

    fn create_timer(&self, target: TimerTarget) -> Result<Rc<dyn TimerBackend>, AppError> {
        let host = Rc::clone(&self.host);
        Ok(Rc::new_cyclic(|weak_self| HostTimer {
            weak_self: weak_self.clone(),
            host,
            target,
            interval: Cell::new(Duration::ZERO),
            pending: RefCell::new(None),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Pending,
    Initialized,
    Closed,
}

/// Canvas rendered on demand for a notebook frontend
pub struct NotebookCanvas {
    weak_self: Weak<NotebookCanvas>,
    host: Rc<dyn HostLoop>,
    clock: Rc<dyn Clock>,
    core: CanvasCore,
    context: ContextRef,
    title: RefCell<String>,
    logical_size: Cell<(u32, u32)>,
    pixel_ratio: Cell<f64>,
    lifecycle: Cell<Lifecycle>,
    framebuffer: RefCell<FrameBuffer>,
    draw_pending: Cell<bool>,
    sink: RefCell<Option<Rc<dyn FrameSink>>>,
    latest_frame: RefCell<Option<Frame>>,
    frames_drawn: Cell<u64>,
}

impl NotebookCanvas {
    /// Deliver scheduled frames to `sink`
    pub fn set_frame_sink(&self, sink: Rc<dyn FrameSink>) {
        self.sink.replace(Some(sink));
    }

    /// Frame produced by the most recent scheduled draw
    pub fn latest_frame(&self) -> Option<Frame> {
        self.latest_frame.borrow().clone()
    }

    /// Draw passes performed so far
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.get()
    }

    /// Device pixels per logical pixel
    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio.get()
    }

    /// Draw into the framebuffer, typically from a `draw` handler
    pub fn with_framebuffer<R>(&self, draw: impl FnOnce(&mut FrameBuffer) -> R) -> R {
        draw(&mut self.framebuffer.borrow_mut())
    }

    /// Render one frame for the frontend
    ///
    /// The first call emits `initialize` and `resize` before drawing. Returns
    /// `None` once closed or while the widget has no usable size.
    pub fn get_frame(&self) -> Option<Frame> {
        if self.lifecycle.get() == Lifecycle::Closed {
            return None;
        }
        let physical = self.get_physical_size();
        if physical.0 <= 1 || physical.1 <= 1 {
            debug!("Notebook canvas too small to draw: {physical:?}");
            return None;
        }

        if self.lifecycle.get() == Lifecycle::Pending {
            self.lifecycle.set(Lifecycle::Initialized);
            self.core.initialize();
            self.core.resize(self.logical_size.get(), physical);
        }
        if self.lifecycle.get() == Lifecycle::Closed {
            return None;
        }

        self.framebuffer.borrow_mut().resize(physical.0, physical.1);
        self.core.draw(None);
        self.frames_drawn.set(self.frames_drawn.get() + 1);
        let frame = self.framebuffer.borrow().snapshot();
        Some(frame)
    }

    /// Feed one frontend message
    pub fn handle_event(&self, event: FrontendEvent) {
        if self.lifecycle.get() == Lifecycle::Closed {
            debug!("Frontend event on a closed notebook canvas ignored");
            return;
        }
        match event {
            FrontendEvent::Resize { width, height, pixel_ratio } => {
                self.logical_size.set((to_pixels(width), to_pixels(height)));
                self.pixel_ratio.set(pixel_ratio);
                // Before the first pull the size goes out with `initialize`
                if self.lifecycle.get() == Lifecycle::Initialized {
                    self.schedule_resize();
                }
                self.update();
            }
            FrontendEvent::PointerDown { x, y, button, modifiers } => {
                let input = self.input((x, y), modifiers);
                self.core.mouse_press(MouseButton::from_index(button), input);
            }
            FrontendEvent::PointerUp { x, y, button, modifiers } => {
                let input = self.input((x, y), modifiers);
                self.core.mouse_release(MouseButton::from_index(button), input);
            }
            FrontendEvent::PointerMove { x, y, modifiers } => {
                let input = self.input((x, y), modifiers);
                self.core.mouse_move(input);
            }
            FrontendEvent::DoubleClick { x, y, button, modifiers } => {
                let input = self.input((x, y), modifiers);
                self.core.mouse_double_click(MouseButton::from_index(button), input);
            }
            FrontendEvent::Wheel { x, y, dx, dy, modifiers } => {
                let input = self
                    .input((x, y), modifiers)
                    .with_delta((dx / WHEEL_STEP, -dy / WHEEL_STEP));
                self.core.mouse_wheel(input);
            }
            FrontendEvent::KeyDown { key, modifiers } => {
                let text = key_text(&key);
                self.core.key_press(Key::from_name(&key), text, modifiers);
            }
            FrontendEvent::KeyUp { key, modifiers } => {
                let text = key_text(&key);
                self.core.key_release(Key::from_name(&key), text, modifiers);
            }
            FrontendEvent::Close => self.close(),
        }
    }

    fn input(&self, pos: (f64, f64), modifiers: Modifiers) -> MouseInput {
        MouseInput::new(pos, self.clock.now()).with_modifiers(modifiers)
    }

    fn schedule_resize(&self) {
        let weak = self.weak_self.clone();
        self.host.call_soon(Box::new(move || {
            let Some(canvas) = weak.upgrade() else { return };
            if canvas.lifecycle.get() == Lifecycle::Initialized {
                canvas.core.resize(canvas.logical_size.get(), canvas.get_physical_size());
            }
        }));
    }

    fn deliver_frame(&self) {
        self.draw_pending.set(false);
        let Some(frame) = self.get_frame() else {
            return;
        };
        let sink = self.sink.borrow().clone();
        if let Some(sink) = sink {
            sink.present(&frame);
        }
        self.latest_frame.replace(Some(frame));
    }
}

fn to_pixels(value: f64) -> u32 {
    // Saturating float to int conversion
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pixels = value.round().max(0.0) as u32;
    pixels
}

fn key_text(key: &str) -> String {
    if key.chars().count() == 1 {
        key.to_string()
    } else {
        String::new()
    }
}

impl CanvasBackend for NotebookCanvas {
    fn set_current(&self) {
        // Single context per frontend, nothing to switch
    }

    fn swap_buffers(&self) {
        // Frames are pulled by the frontend
    }

    fn get_title(&self) -> String {
        self.title.borrow().clone()
    }

    fn set_title(&self, title: &str) {
        debug!("Notebook canvases have no title bar, keeping '{title}' for reference");
        self.title.replace(title.to_string());
    }

    fn get_size(&self) -> (u32, u32) {
        self.logical_size.get()
    }

    fn set_size(&self, width: u32, height: u32) {
        if self.lifecycle.get() == Lifecycle::Closed || self.logical_size.get() == (width, height) {
            return;
        }
        self.logical_size.set((width, height));
        self.schedule_resize();
        self.update();
    }

    fn get_physical_size(&self) -> (u32, u32) {
        let (width, height) = self.logical_size.get();
        let ratio = self.pixel_ratio.get();
        (
            to_pixels(f64::from(width) * ratio),
            to_pixels(f64::from(height) * ratio),
        )
    }

    fn get_position(&self) -> (i32, i32) {
        (0, 0)
    }

    fn set_position(&self, x: i32, y: i32) {
        debug!("Notebook canvases cannot be moved (requested {x}, {y})");
    }

    fn set_visible(&self, visible: bool) {
        debug!("Notebook canvas visibility is controlled by the frontend (requested {visible})");
    }

    fn is_fullscreen(&self) -> bool {
        false
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        debug!("Notebook canvases cannot go fullscreen (requested {fullscreen})");
    }

    fn update(&self) {
        if self.lifecycle.get() == Lifecycle::Closed {
            debug!("update on a closed notebook canvas ignored");
            return;
        }
        if self.draw_pending.replace(true) {
            return;
        }
        let weak = self.weak_self.clone();
        self.host.call_soon(Box::new(move || {
            if let Some(canvas) = weak.upgrade() {
                canvas.deliver_frame();
            }
        }));
    }

    fn close(&self) {
        if self.lifecycle.replace(Lifecycle::Closed) == Lifecycle::Closed {
            return;
        }
        self.core.close();
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.get() == Lifecycle::Closed
    }

    fn context_handle(&self) -> Option<NativeContextHandle> {
        Some(self.context.handle)
    }

    fn framebuffer(&self) -> Option<Frame> {
        Some(self.framebuffer.borrow().snapshot())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Timer built on host loop callbacks
///
/// Each expiry schedules the next one before delivering the timeout, so at
/// most one callback is pending at any time.
pub struct HostTimer {
    weak_self: Weak<HostTimer>,
    host: Rc<dyn HostLoop>,
    target: TimerTarget,
    interval: Cell<Duration>,
    pending: RefCell<Option<CallHandle>>,
}

impl HostTimer {
    /// Whether a callback is scheduled
    pub fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    fn arm(&self) {
        let weak = self.weak_self.clone();
        let handle = self.host.call_later(
            self.interval.get(),
            Box::new(move || {
                if let Some(timer) = weak.upgrade() {
                    timer.expire();
                }
            }),
        );
        if let Some(previous) = self.pending.replace(Some(handle)) {
            previous.cancel();
        }
    }

    fn expire(&self) {
        self.pending.replace(None);
        self.arm();
        self.target.fire();
    }
}

impl TimerBackend for HostTimer {
    fn start(&self, interval: Duration) {
        self.stop();
        self.interval.set(interval);
        self.arm();
    }

    fn stop(&self) {
        if let Some(handle) = self.pending.replace(None) {
            handle.cancel();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
