//! Offscreen backend
//!
//! Canvases render into an in-memory [`FrameBuffer`]; there is no display
//! connection and no native event source. Timers are ticked and pending
//! redraws are performed on every `process_events()` pass, and input can be
//! injected through [`HeadlessCanvas::core`].

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, error, info};
use slotmap::{DefaultKey, Key, KeyData, SlotMap};

use super::tick_timer::{TickTimer, TimerRegistry};
use super::{
    ApplicationBackend, BackendDescriptor, CanvasBackend, CanvasCore, CanvasRequest, Capabilities,
    ContextRef, Frame, FrameBuffer, NativeContextHandle, ProbeContext, TimerBackend,
};
use crate::core::config::GlConfig;
use crate::error::{AppError, ProbeError};
use crate::foundation::time::Clock;
use crate::input::MouseInput;
use crate::timer::TimerTarget;

/// Registry name
pub const NAME: &str = "headless";

/// Descriptor of the offscreen backend
pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor {
        name: NAME,
        toolkit: "Offscreen",
        capabilities: Capabilities::TITLE
            | Capabilities::SIZE
            | Capabilities::POSITION
            | Capabilities::SHOW
            | Capabilities::RESIZABLE
            | Capabilities::DECORATE
            | Capabilities::CONTEXT
            | Capabilities::MULTI_WINDOW
            | Capabilities::SCROLL,
        offscreen: true,
        factory: probe,
    }
}

fn probe(context: &ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError> {
    let app = HeadlessApp::new(Rc::clone(context.clock))
        .with_poll_interval(context.config.run_poll_interval());
    Ok(Rc::new(app))
}

#[derive(Debug)]
struct ContextRecord {
    gl: GlConfig,
}

struct HeadlessState {
    clock: Rc<dyn Clock>,
    poll_interval: Cell<Duration>,
    contexts: RefCell<SlotMap<DefaultKey, ContextRecord>>,
    current: Cell<Option<NativeContextHandle>>,
    canvases: RefCell<Vec<Weak<HeadlessCanvas>>>,
    timers: TimerRegistry,
    quit_requested: Cell<bool>,
    had_canvas: Cell<bool>,
}

impl HeadlessState {
    fn live_canvases(&self) -> Vec<Rc<HeadlessCanvas>> {
        let mut canvases = self.canvases.borrow_mut();
        canvases.retain(|canvas| canvas.strong_count() > 0);
        canvases.iter().filter_map(Weak::upgrade).collect()
    }

    fn open_canvases(&self) -> usize {
        self.live_canvases()
            .iter()
            .filter(|canvas| !canvas.closed.get())
            .count()
    }

    fn create_context(&self, gl: GlConfig) -> NativeContextHandle {
        let key = self.contexts.borrow_mut().insert(ContextRecord { gl });
        NativeContextHandle(key.data().as_ffi())
    }

    fn context_exists(&self, handle: NativeContextHandle) -> bool {
        let key = DefaultKey::from(KeyData::from_ffi(handle.0));
        self.contexts.borrow().contains_key(key)
    }
}

/// Application backend of the offscreen toolkit
pub struct HeadlessApp {
    state: Rc<HeadlessState>,
}

impl HeadlessApp {
    /// Backend stamping time with `clock`
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            state: Rc::new(HeadlessState {
                clock,
                poll_interval: Cell::new(Duration::from_millis(1)),
                contexts: RefCell::new(SlotMap::new()),
                current: Cell::new(None),
                canvases: RefCell::new(Vec::new()),
                timers: TimerRegistry::new(),
                quit_requested: Cell::new(false),
                had_canvas: Cell::new(false),
            }),
        }
    }

    /// Sleep between passes of [`run`](ApplicationBackend::run)
    #[must_use]
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        self.state.poll_interval.set(interval);
        self
    }

    /// Live tick timers
    pub fn timer_count(&self) -> usize {
        self.state.timers.len()
    }

    /// Canvases not yet closed
    pub fn canvas_count(&self) -> usize {
        self.state.open_canvases()
    }

    /// Native contexts created so far
    pub fn context_count(&self) -> usize {
        self.state.contexts.borrow().len()
    }

    /// Context made current most recently
    pub fn current_context(&self) -> Option<NativeContextHandle> {
        self.state.current.get()
    }

    /// Surface format a context was created with
    pub fn context_config(&self, handle: NativeContextHandle) -> Option<GlConfig> {
        let key = DefaultKey::from(KeyData::from_ffi(handle.0));
        self.state.contexts.borrow().get(key).map(|record| record.gl)
    }
}

impl ApplicationBackend for HeadlessApp {
    fn process_events(&self) {
        self.state.timers.tick_all();
        for canvas in self.state.live_canvases() {
            if canvas.needs_draw.get() {
                canvas.draw_now();
            }
        }
    }

    fn run(&self) {
        self.state.quit_requested.set(false);
        loop {
            self.process_events();
            if self.state.quit_requested.get() {
                break;
            }
            let open = self.state.open_canvases();
            if open == 0 && (self.state.had_canvas.get() || self.state.timers.next_deadline().is_none()) {
                debug!("No open canvases left, leaving the headless loop");
                break;
            }
            std::thread::sleep(self.state.poll_interval.get());
        }
        self.quit();
    }

    fn quit(&self) {
        self.state.quit_requested.set(true);
        for canvas in self.state.live_canvases() {
            canvas.close();
        }
        self.state.timers.stop_all();
    }

    fn create_canvas(&self, request: CanvasRequest) -> Result<Rc<dyn CanvasBackend>, AppError> {
        let CanvasRequest { config, context, core } = request;

        let state = &self.state;
        let context = context.add_ref(NAME, || Ok(state.create_context(config.context.gl)))?;

        let canvas = Rc::new(HeadlessCanvas {
            app: Rc::downgrade(&self.state),
            core,
            context,
            title: RefCell::new(config.title.clone()),
            size: Cell::new(config.size),
            position: Cell::new(config.position.unwrap_or((0, 0))),
            visible: Cell::new(config.show),
            framebuffer: RefCell::new(FrameBuffer::new(config.size.0, config.size.1)),
            needs_draw: Cell::new(true),
            initialized: Cell::new(false),
            closed: Cell::new(false),
            draw_count: Cell::new(0),
            swap_count: Cell::new(0),
        });

        self.state.canvases.borrow_mut().push(Rc::downgrade(&canvas));
        self.state.had_canvas.set(true);
        info!("Created headless canvas '{}' {:?}", config.title, config.size);
        Ok(canvas)
    }

    fn create_timer(&self, target: TimerTarget) -> Result<Rc<dyn TimerBackend>, AppError> {
        let timer = Rc::new(TickTimer::new(Rc::clone(&self.state.clock), target));
        self.state.timers.register(&timer);
        Ok(timer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Offscreen canvas
pub struct HeadlessCanvas {
    app: Weak<HeadlessState>,
    core: CanvasCore,
    context: ContextRef,
    title: RefCell<String>,
    size: Cell<(u32, u32)>,
    position: Cell<(i32, i32)>,
    visible: Cell<bool>,
    framebuffer: RefCell<FrameBuffer>,
    needs_draw: Cell<bool>,
    initialized: Cell<bool>,
    closed: Cell<bool>,
    draw_count: Cell<u64>,
    swap_count: Cell<u64>,
}

impl HeadlessCanvas {
    /// Event synthesizer, used to inject input
    pub fn core(&self) -> &CanvasCore {
        &self.core
    }

    /// Mouse input at `pos` stamped with the backend clock
    pub fn mouse_input(&self, pos: (f64, f64)) -> MouseInput {
        let time = self.app.upgrade().map_or(0.0, |state| state.clock.now());
        MouseInput::new(pos, time)
    }

    /// Draw into the framebuffer, typically from a `draw` handler
    pub fn with_framebuffer<R>(&self, draw: impl FnOnce(&mut FrameBuffer) -> R) -> R {
        draw(&mut self.framebuffer.borrow_mut())
    }

    /// Whether the canvas is visible
    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    /// Completed draw passes
    pub fn draw_count(&self) -> u64 {
        self.draw_count.get()
    }

    /// Buffer swaps so far
    pub fn swap_count(&self) -> u64 {
        self.swap_count.get()
    }

    /// How this canvas joined its context
    pub fn context(&self) -> ContextRef {
        self.context
    }

    fn draw_now(&self) {
        if self.closed.get() {
            return;
        }
        self.needs_draw.set(false);
        self.set_current();
        if !self.initialized.replace(true) {
            self.core.initialize();
            let size = self.size.get();
            self.core.resize(size, size);
        }
        if self.closed.get() {
            return;
        }
        self.core.draw(None);
        self.draw_count.set(self.draw_count.get() + 1);
    }

    fn ignore_closed(&self, operation: &str) -> bool {
        if self.closed.get() {
            debug!("{operation} on a closed headless canvas ignored");
        }
        self.closed.get()
    }
}

impl CanvasBackend for HeadlessCanvas {
    fn set_current(&self) {
        if self.ignore_closed("set_current") {
            return;
        }
        let Some(state) = self.app.upgrade() else {
            return;
        };
        if !state.context_exists(self.context.handle) {
            error!(
                "{}",
                AppError::NativeResource(format!("context {:?} no longer exists", self.context.handle))
            );
            return;
        }
        state.current.set(Some(self.context.handle));
    }

    fn swap_buffers(&self) {
        if self.ignore_closed("swap_buffers") {
            return;
        }
        self.swap_count.set(self.swap_count.get() + 1);
    }

    fn get_title(&self) -> String {
        self.title.borrow().clone()
    }

    fn set_title(&self, title: &str) {
        if self.ignore_closed("set_title") {
            return;
        }
        self.title.replace(title.to_string());
    }

    fn get_size(&self) -> (u32, u32) {
        self.size.get()
    }

    fn set_size(&self, width: u32, height: u32) {
        if self.ignore_closed("set_size") || self.size.get() == (width, height) {
            return;
        }
        self.size.set((width, height));
        self.framebuffer.borrow_mut().resize(width, height);
        if self.initialized.get() {
            self.core.resize((width, height), (width, height));
        }
        self.needs_draw.set(true);
    }

    fn get_position(&self) -> (i32, i32) {
        self.position.get()
    }

    fn set_position(&self, x: i32, y: i32) {
        if self.ignore_closed("set_position") {
            return;
        }
        self.position.set((x, y));
    }

    fn set_visible(&self, visible: bool) {
        if self.ignore_closed("set_visible") {
            return;
        }
        self.visible.set(visible);
        if visible {
            self.needs_draw.set(true);
        }
    }

    fn is_fullscreen(&self) -> bool {
        false
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        debug!("Headless canvases cannot go fullscreen (requested {fullscreen})");
    }

    fn update(&self) {
        if self.ignore_closed("update") {
            return;
        }
        self.needs_draw.set(true);
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.visible.set(false);
        if let Some(state) = self.app.upgrade() {
            if state.current.get() == Some(self.context.handle) {
                state.current.set(None);
            }
        }
        self.core.close();
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
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
