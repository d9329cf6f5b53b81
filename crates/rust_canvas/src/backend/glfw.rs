//! GLFW desktop backend
//!
//! One GLFW window per canvas, each with its own GL context. Windows that
//! join an existing [`SharedContext`](super::SharedContext) are created with
//! `create_shared` against the owner's window. GLFW has no timer facility,
//! so timers are ticked on every `process_events()` pass.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use glfw::Context as _;
use log::{debug, error, info, warn};
use slotmap::{DefaultKey, Key as _, KeyData, SlotMap};

use super::tick_timer::{TickTimer, TimerRegistry};
use super::{
    ApplicationBackend, BackendDescriptor, CanvasBackend, CanvasCore, CanvasRequest, Capabilities,
    ContextRef, ContextRole, NativeContextHandle, ProbeContext, TimerBackend,
};
use crate::core::config::{CanvasConfig, GlConfig};
use crate::error::{AppError, ProbeError};
use crate::foundation::time::Clock;
use crate::input::{Key, Modifiers, MouseButton, MouseInput};
use crate::timer::TimerTarget;

/// Registry name
pub const NAME: &str = "glfw";

/// Descriptor of the GLFW backend
pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor {
        name: NAME,
        toolkit: "GLFW",
        capabilities: Capabilities::TITLE
            | Capabilities::SIZE
            | Capabilities::POSITION
            | Capabilities::SHOW
            | Capabilities::VSYNC
            | Capabilities::RESIZABLE
            | Capabilities::DECORATE
            | Capabilities::FULLSCREEN
            | Capabilities::CONTEXT
            | Capabilities::MULTI_WINDOW
            | Capabilities::SCROLL
            | Capabilities::ALWAYS_ON_TOP,
        offscreen: false,
        factory: probe,
    }
}

fn log_glfw_error(err: glfw::Error, description: String) {
    error!("GLFW error {err:?}: {description}");
}

fn probe(context: &ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError> {
    if context.environment.is_headless() {
        return Err(ProbeError::Unavailable("no display available".into()));
    }
    let glfw = glfw::init(log_glfw_error)
        .map_err(|err| ProbeError::InitializationFailed(format!("glfw::init failed: {err:?}")))?;
    Ok(Rc::new(GlfwApp::new(
        glfw,
        Rc::clone(context.clock),
        context.config.run_poll_interval(),
    )))
}

type Events = glfw::GlfwReceiver<(f64, glfw::WindowEvent)>;

struct GlfwState {
    glfw: RefCell<glfw::Glfw>,
    clock: Rc<dyn Clock>,
    poll_interval: Duration,
    /// Context owners, keyed by native context handle
    contexts: RefCell<SlotMap<DefaultKey, Weak<GlfwCanvas>>>,
    canvases: RefCell<Vec<Weak<GlfwCanvas>>>,
    timers: TimerRegistry,
    quit_requested: Cell<bool>,
}

impl GlfwState {
    fn live_canvases(&self) -> Vec<Rc<GlfwCanvas>> {
        let mut canvases = self.canvases.borrow_mut();
        canvases.retain(|canvas| canvas.upgrade().is_some_and(|canvas| !canvas.closed.get()));
        canvases.iter().filter_map(Weak::upgrade).collect()
    }

    fn apply_hints(&self, config: &CanvasConfig) {
        let gl: &GlConfig = &config.context.gl;
        let mut glfw = self.glfw.borrow_mut();
        glfw.default_window_hints();
        glfw.window_hint(glfw::WindowHint::RedBits(Some(u32::from(gl.red_size))));
        glfw.window_hint(glfw::WindowHint::GreenBits(Some(u32::from(gl.green_size))));
        glfw.window_hint(glfw::WindowHint::BlueBits(Some(u32::from(gl.blue_size))));
        glfw.window_hint(glfw::WindowHint::AlphaBits(Some(u32::from(gl.alpha_size))));
        glfw.window_hint(glfw::WindowHint::DepthBits(Some(u32::from(gl.depth_size))));
        glfw.window_hint(glfw::WindowHint::StencilBits(Some(u32::from(gl.stencil_size))));
        glfw.window_hint(glfw::WindowHint::Samples(Some(u32::from(gl.samples))));
        glfw.window_hint(glfw::WindowHint::DoubleBuffer(gl.double_buffer));
        glfw.window_hint(glfw::WindowHint::Stereo(gl.stereo));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));
        glfw.window_hint(glfw::WindowHint::Decorated(config.decorate));
        glfw.window_hint(glfw::WindowHint::Floating(config.always_on_top));
        // Shown later, once positioned
        glfw.window_hint(glfw::WindowHint::Visible(false));
    }

    fn open_window(
        &self,
        config: &CanvasConfig,
        share_with: Option<NativeContextHandle>,
    ) -> Result<(glfw::PWindow, Events), AppError> {
        self.apply_hints(config);
        let (width, height) = config.size;

        let created = match share_with {
            Some(handle) => {
                let owner = self.context_owner(handle).ok_or_else(|| {
                    AppError::NativeResource(format!("context {} has no live window", handle.0))
                })?;
                let window = owner.window.borrow();
                let window = window.as_ref().ok_or_else(|| {
                    AppError::NativeResource(format!("window owning context {} was closed", handle.0))
                })?;
                window.create_shared(width, height, &config.title, glfw::WindowMode::Windowed)
            }
            None => self.glfw.borrow_mut().create_window(
                width,
                height,
                &config.title,
                glfw::WindowMode::Windowed,
            ),
        };

        created.ok_or_else(|| {
            AppError::NativeResource(format!("GLFW could not create window '{}'", config.title))
        })
    }

    fn reserve_context(&self) -> NativeContextHandle {
        let key = self.contexts.borrow_mut().insert(Weak::new());
        NativeContextHandle(key.data().as_ffi())
    }

    fn context_owner(&self, handle: NativeContextHandle) -> Option<Rc<GlfwCanvas>> {
        let key = DefaultKey::from(KeyData::from_ffi(handle.0));
        self.contexts.borrow().get(key).and_then(Weak::upgrade)
    }
}

/// GLFW application
pub struct GlfwApp {
    state: Rc<GlfwState>,
}

impl GlfwApp {
    fn new(glfw: glfw::Glfw, clock: Rc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            state: Rc::new(GlfwState {
                glfw: RefCell::new(glfw),
                clock,
                poll_interval,
                contexts: RefCell::new(SlotMap::new()),
                canvases: RefCell::new(Vec::new()),
                timers: TimerRegistry::new(),
                quit_requested: Cell::new(false),
            }),
        }
    }
}

impl ApplicationBackend for GlfwApp {
    fn process_events(&self) {
        self.state.glfw.borrow_mut().poll_events();
        let canvases = self.state.live_canvases();
        for canvas in &canvases {
            canvas.dispatch_events();
        }
        self.state.timers.tick_all();
        for canvas in &canvases {
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
            if self.state.live_canvases().is_empty() {
                debug!("All GLFW windows closed, leaving the event loop");
                break;
            }
            self.state
                .glfw
                .borrow_mut()
                .wait_events_timeout(self.state.poll_interval.as_secs_f64());
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

        let (context, (mut window, events)) = context.join(
            NAME,
            || {
                let opened = state.open_window(&config, None)?;
                Ok((state.reserve_context(), opened))
            },
            |handle| state.open_window(&config, Some(handle)),
        )?;

        window.set_all_polling(true);
        if let Some((x, y)) = config.position {
            window.set_pos(x, y);
        }
        window.make_current();
        state.glfw.borrow_mut().set_swap_interval(if config.vsync {
            glfw::SwapInterval::Sync(1)
        } else {
            glfw::SwapInterval::None
        });
        let windowed_position = window.get_pos();

        let canvas = Rc::new(GlfwCanvas {
            app: Rc::downgrade(state),
            clock: Rc::clone(&state.clock),
            core,
            context,
            title: RefCell::new(config.title.clone()),
            window: RefCell::new(Some(window)),
            events,
            cursor: Cell::new((0.0, 0.0)),
            pending_key: Cell::new(None),
            windowed: Cell::new((windowed_position, config.size)),
            fullscreen: Cell::new(false),
            needs_draw: Cell::new(true),
            initialized: Cell::new(false),
            closed: Cell::new(false),
        });

        if context.role == ContextRole::Owner {
            let key = DefaultKey::from(KeyData::from_ffi(context.handle.0));
            if let Some(owner) = state.contexts.borrow_mut().get_mut(key) {
                *owner = Rc::downgrade(&canvas);
            }
        }
        if config.fullscreen {
            canvas.set_fullscreen(true);
        }
        if config.show {
            canvas.set_visible(true);
        }

        state.canvases.borrow_mut().push(Rc::downgrade(&canvas));
        info!("Created GLFW window '{}' {:?}", config.title, config.size);
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

/// GLFW window adapter
pub struct GlfwCanvas {
    app: Weak<GlfwState>,
    clock: Rc<dyn Clock>,
    core: CanvasCore,
    context: ContextRef,
    title: RefCell<String>,
    window: RefCell<Option<glfw::PWindow>>,
    events: Events,
    cursor: Cell<(f64, f64)>,
    /// Key press waiting for the `Char` event that carries its text
    pending_key: Cell<Option<(Option<Key>, Modifiers)>>,
    windowed: Cell<((i32, i32), (u32, u32))>,
    fullscreen: Cell<bool>,
    needs_draw: Cell<bool>,
    initialized: Cell<bool>,
    closed: Cell<bool>,
}

impl GlfwCanvas {
    /// Event synthesizer of this window
    pub fn core(&self) -> &CanvasCore {
        &self.core
    }

    fn with_window<R>(&self, operation: &str, f: impl FnOnce(&mut glfw::PWindow) -> R) -> Option<R> {
        if self.closed.get() {
            debug!("{operation} on a closed GLFW window ignored");
            return None;
        }
        let mut window = self.window.borrow_mut();
        if let Some(window) = window.as_mut() {
            Some(f(window))
        } else {
            let err = AppError::NativeResource(format!("{operation}: window already destroyed"));
            error!("{err}");
            None
        }
    }

    fn input(&self, pos: (f64, f64), modifiers: Modifiers) -> MouseInput {
        MouseInput::new(pos, self.clock.now()).with_modifiers(modifiers)
    }

    fn flush_pending_key(&self) {
        if let Some((key, modifiers)) = self.pending_key.take() {
            self.core.key_press(key, String::new(), modifiers);
        }
    }

    fn dispatch_events(&self) {
        // Collected first so handlers may touch the window
        let messages: Vec<glfw::WindowEvent> =
            glfw::flush_messages(&self.events).map(|(_, event)| event).collect();

        for event in messages {
            if self.closed.get() {
                break;
            }
            if !matches!(event, glfw::WindowEvent::Char(_)) {
                self.flush_pending_key();
            }
            self.handle_event(event);
        }
        self.flush_pending_key();
    }

    fn handle_event(&self, event: glfw::WindowEvent) {
        match event {
            glfw::WindowEvent::Size(width, height) => {
                let size = (to_extent(width), to_extent(height));
                if self.initialized.get() {
                    self.core.resize(size, self.get_physical_size());
                }
                self.needs_draw.set(true);
            }
            glfw::WindowEvent::Refresh => self.needs_draw.set(true),
            glfw::WindowEvent::Close => self.close(),
            glfw::WindowEvent::CursorPos(x, y) => {
                self.cursor.set((x, y));
                let modifiers = self.held_modifiers();
                self.core.mouse_move(self.input((x, y), modifiers));
            }
            glfw::WindowEvent::MouseButton(button, action, mods) => {
                let input = self.input(self.cursor.get(), map_modifiers(mods));
                match action {
                    glfw::Action::Press => {
                        self.core.mouse_press(map_button(button), input);
                    }
                    glfw::Action::Release => {
                        self.core.mouse_release(map_button(button), input);
                    }
                    glfw::Action::Repeat => {}
                }
            }
            glfw::WindowEvent::Scroll(dx, dy) => {
                let modifiers = self.held_modifiers();
                let input = self.input(self.cursor.get(), modifiers).with_delta((dx, dy));
                self.core.mouse_wheel(input);
            }
            glfw::WindowEvent::Key(key, _, action, mods) => {
                let key = map_key(key);
                let modifiers = map_modifiers(mods);
                match action {
                    glfw::Action::Press | glfw::Action::Repeat => {
                        self.pending_key.set(Some((key, modifiers)));
                    }
                    glfw::Action::Release => self.core.key_release(key, String::new(), modifiers),
                }
            }
            glfw::WindowEvent::Char(text) => match self.pending_key.take() {
                Some((key, modifiers)) => self.core.key_press(key, text.to_string(), modifiers),
                None => debug!("Text '{text}' without a key press"),
            },
            _ => {}
        }
    }

    fn held_modifiers(&self) -> Modifiers {
        let Some(window) = self.window.try_borrow().ok() else {
            return Modifiers::empty();
        };
        let Some(window) = window.as_ref() else {
            return Modifiers::empty();
        };
        let pressed = |keys: [glfw::Key; 2]| {
            keys.iter()
                .any(|key| window.get_key(*key) == glfw::Action::Press)
        };
        let mut modifiers = Modifiers::empty();
        modifiers.set(Modifiers::SHIFT, pressed([glfw::Key::LeftShift, glfw::Key::RightShift]));
        modifiers.set(
            Modifiers::CONTROL,
            pressed([glfw::Key::LeftControl, glfw::Key::RightControl]),
        );
        modifiers.set(Modifiers::ALT, pressed([glfw::Key::LeftAlt, glfw::Key::RightAlt]));
        modifiers.set(Modifiers::META, pressed([glfw::Key::LeftSuper, glfw::Key::RightSuper]));
        modifiers
    }

    fn draw_now(&self) {
        if self.closed.get() {
            return;
        }
        self.needs_draw.set(false);
        self.set_current();
        if !self.initialized.replace(true) {
            self.core.initialize();
            self.core.resize(self.get_size(), self.get_physical_size());
        }
        if self.closed.get() {
            return;
        }
        self.core.draw(None);
        self.swap_buffers();
    }
}

fn to_extent(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn map_modifiers(mods: glfw::Modifiers) -> Modifiers {
    let mut modifiers = Modifiers::empty();
    modifiers.set(Modifiers::SHIFT, mods.contains(glfw::Modifiers::Shift));
    modifiers.set(Modifiers::CONTROL, mods.contains(glfw::Modifiers::Control));
    modifiers.set(Modifiers::ALT, mods.contains(glfw::Modifiers::Alt));
    modifiers.set(Modifiers::META, mods.contains(glfw::Modifiers::Super));
    modifiers
}

fn map_button(button: glfw::MouseButton) -> MouseButton {
    match button {
        glfw::MouseButton::Button1 => MouseButton::Left,
        glfw::MouseButton::Button2 => MouseButton::Right,
        glfw::MouseButton::Button3 => MouseButton::Middle,
        glfw::MouseButton::Button4 => MouseButton::Other(4),
        glfw::MouseButton::Button5 => MouseButton::Other(5),
        glfw::MouseButton::Button6 => MouseButton::Other(6),
        glfw::MouseButton::Button7 => MouseButton::Other(7),
        glfw::MouseButton::Button8 => MouseButton::Other(8),
    }
}

/// GLFW key codes of printable keys are their ASCII values
const PRINTABLE: std::ops::RangeInclusive<i32> = 33..=96;
const FUNCTION_KEYS: std::ops::RangeInclusive<i32> = 290..=301;

fn map_key(key: glfw::Key) -> Option<Key> {
    use glfw::Key as G;

    let named = match key {
        G::LeftShift | G::RightShift => Key::Shift,
        G::LeftControl | G::RightControl => Key::Control,
        G::LeftAlt | G::RightAlt => Key::Alt,
        G::LeftSuper | G::RightSuper => Key::Meta,
        G::Up => Key::Up,
        G::Down => Key::Down,
        G::Left => Key::Left,
        G::Right => Key::Right,
        G::PageUp => Key::PageUp,
        G::PageDown => Key::PageDown,
        G::Home => Key::Home,
        G::End => Key::End,
        G::Insert => Key::Insert,
        G::Delete => Key::Delete,
        G::Backspace => Key::Backspace,
        G::Tab => Key::Tab,
        G::Enter | G::KpEnter => Key::Enter,
        G::Escape => Key::Escape,
        G::Space => Key::Space,
        other => {
            let code = other as i32;
            return if PRINTABLE.contains(&code) {
                u8::try_from(code).ok().map(|c| Key::Char(char::from(c)))
            } else if FUNCTION_KEYS.contains(&code) {
                u8::try_from(code - FUNCTION_KEYS.start() + 1).ok().map(Key::F)
            } else {
                None
            };
        }
    };
    Some(named)
}

impl CanvasBackend for GlfwCanvas {
    fn set_current(&self) {
        self.with_window("set_current", |window| window.make_current());
    }

    fn swap_buffers(&self) {
        self.with_window("swap_buffers", |window| window.swap_buffers());
    }

    fn get_title(&self) -> String {
        self.title.borrow().clone()
    }

    fn set_title(&self, title: &str) {
        if self.with_window("set_title", |window| window.set_title(title)).is_some() {
            self.title.replace(title.to_string());
        }
    }

    fn get_size(&self) -> (u32, u32) {
        self.with_window("get_size", |window| window.get_size())
            .map_or((0, 0), |(w, h)| (to_extent(w), to_extent(h)))
    }

    fn set_size(&self, width: u32, height: u32) {
        let (Ok(w), Ok(h)) = (i32::try_from(width), i32::try_from(height)) else {
            warn!("Window size {width}x{height} out of range");
            return;
        };
        self.with_window("set_size", |window| window.set_size(w, h));
    }

    fn get_physical_size(&self) -> (u32, u32) {
        self.with_window("get_physical_size", |window| window.get_framebuffer_size())
            .map_or((0, 0), |(w, h)| (to_extent(w), to_extent(h)))
    }

    fn get_position(&self) -> (i32, i32) {
        self.with_window("get_position", |window| window.get_pos())
            .unwrap_or((0, 0))
    }

    fn set_position(&self, x: i32, y: i32) {
        self.with_window("set_position", |window| window.set_pos(x, y));
    }

    fn set_visible(&self, visible: bool) {
        self.with_window("set_visible", |window| {
            if visible {
                window.show();
            } else {
                window.hide();
            }
        });
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.get()
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        if self.closed.get() || self.fullscreen.get() == fullscreen {
            return;
        }
        let Some(app) = self.app.upgrade() else {
            debug!("set_fullscreen after the GLFW application was dropped");
            return;
        };

        if fullscreen {
            self.windowed.set((self.get_position(), self.get_size()));
            let mut glfw = app.glfw.borrow_mut();
            let switched = glfw.with_primary_monitor(|_, monitor| {
                let monitor = monitor?;
                let mode = monitor.get_video_mode()?;
                self.with_window("set_fullscreen", |window| {
                    window.set_monitor(
                        glfw::WindowMode::FullScreen(monitor),
                        0,
                        0,
                        mode.width,
                        mode.height,
                        Some(mode.refresh_rate),
                    );
                })
            });
            if switched.is_none() {
                warn!("No primary monitor, staying windowed");
                return;
            }
        } else {
            let ((x, y), (width, height)) = self.windowed.get();
            self.with_window("set_fullscreen", |window| {
                window.set_monitor(glfw::WindowMode::Windowed, x, y, width, height, None);
            });
        }
        self.fullscreen.set(fullscreen);
    }

    fn update(&self) {
        if self.closed.get() {
            debug!("update on a closed GLFW window ignored");
            return;
        }
        self.needs_draw.set(true);
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.core.close();
        if let Some(mut window) = self.window.borrow_mut().take() {
            window.set_should_close(true);
        }
        debug!("GLFW window '{}' destroyed", self.title.borrow());
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn context_handle(&self) -> Option<NativeContextHandle> {
        Some(self.context.handle)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key(glfw::Key::A), Some(Key::Char('A')));
        assert_eq!(map_key(glfw::Key::Num7), Some(Key::Char('7')));
        assert_eq!(map_key(glfw::Key::F5), Some(Key::F(5)));
        assert_eq!(map_key(glfw::Key::RightShift), Some(Key::Shift));
        assert_eq!(map_key(glfw::Key::KpEnter), Some(Key::Enter));
        assert_eq!(map_key(glfw::Key::F20), None);
    }

    #[test]
    fn test_modifier_and_button_mapping() {
        let mods = glfw::Modifiers::Shift | glfw::Modifiers::Super;
        assert_eq!(map_modifiers(mods), Modifiers::SHIFT | Modifiers::META);
        assert_eq!(map_button(glfw::MouseButton::Button2), MouseButton::Right);
        assert_eq!(map_button(glfw::MouseButton::Button5), MouseButton::Other(5));
    }

    #[test]
    fn test_probe_refuses_without_display() {
        use crate::config::{AppConfig, ProbeEnvironment};
        use crate::foundation::time::ManualClock;

        let config = AppConfig::default();
        let environment = ProbeEnvironment::default().with_display(false);
        let clock: Rc<dyn Clock> = Rc::new(ManualClock::new());
        let context = ProbeContext {
            config: &config,
            environment: &environment,
            clock: &clock,
            host_loop: None,
        };
        assert!(matches!(probe(&context), Err(ProbeError::Unavailable(_))));
    }
}
