//! Public canvas wrapper
//!
//! A [`Canvas`] owns exactly one backend canvas and exposes its lifecycle and
//! event hub. All backend specifics stay behind [`CanvasBackend`].

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use log::info;

use crate::application::Application;
use crate::backend::{
    CanvasBackend, CanvasCore, CanvasRequest, Capabilities, Frame, Geometry, NativeContextHandle,
    SharedContext,
};
use crate::core::config::CanvasConfig;
use crate::error::AppError;
use crate::events::{CanvasEvent, EventHub, EventType, HandlerId};

struct CanvasInner {
    app: Application,
    backend: Rc<dyn CanvasBackend>,
    events: EventHub,
    context: SharedContext,
    close_requested: Cell<bool>,
}

/// A drawable surface on the selected backend
///
/// Cloning yields another handle to the same canvas. Handlers that need the
/// canvas should capture a [`WeakCanvas`] from [`downgrade`](Self::downgrade).
#[derive(Clone)]
pub struct Canvas {
    inner: Rc<CanvasInner>,
}

/// Non-owning canvas handle
#[derive(Clone)]
pub struct WeakCanvas {
    inner: Weak<CanvasInner>,
}

impl WeakCanvas {
    /// The canvas, if any handle still owns it
    pub fn upgrade(&self) -> Option<Canvas> {
        self.inner.upgrade().map(|inner| Canvas { inner })
    }
}

impl Canvas {
    /// Validate `config` against the backend, then create the native canvas
    ///
    /// Unsupported options fail with [`AppError::Configuration`] before any
    /// native resource is touched.
    pub fn new(app: &Application, config: CanvasConfig) -> Result<Self, AppError> {
        let capabilities = app.capabilities();
        config.validate(app.backend_name(), capabilities, app.live_canvas_count())?;

        let events = EventHub::new();
        let core = CanvasCore::new(
            events.clone(),
            app.config().input_timing(),
            capabilities.contains(Capabilities::NATIVE_DOUBLE_CLICK),
        );
        let context = config.context.shared.clone().unwrap_or_default();
        let title = config.title.clone();

        let backend = app.backend().create_canvas(CanvasRequest {
            config,
            context: context.clone(),
            core,
        })?;
        app.register_canvas(&backend);
        info!("Created canvas '{title}' on backend '{}'", app.backend_name());

        Ok(Self {
            inner: Rc::new(CanvasInner {
                app: app.clone(),
                backend,
                events,
                context,
                close_requested: Cell::new(false),
            }),
        })
    }

    /// Application the canvas belongs to
    pub fn app(&self) -> &Application {
        &self.inner.app
    }

    /// Event hub of this canvas
    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }

    /// Register a callback for one event type
    pub fn connect<F>(&self, event_type: EventType, callback: F) -> HandlerId
    where
        F: FnMut(&CanvasEvent) + 'static,
    {
        self.inner.events.connect(event_type, callback)
    }

    /// Show or hide
    pub fn show(&self, visible: bool) {
        self.inner.backend.set_visible(visible);
    }

    /// Request a redraw; the draw happens later on the event loop
    pub fn update(&self) {
        self.inner.backend.update();
    }

    /// Close the canvas; safe to call repeatedly and from its own handlers
    pub fn close(&self) {
        if self.inner.close_requested.replace(true) {
            return;
        }
        self.inner.backend.close();
    }

    /// Whether the canvas was closed, by the user or the toolkit
    pub fn is_closed(&self) -> bool {
        self.inner.close_requested.get() || self.inner.backend.is_closed()
    }

    /// Window title
    pub fn title(&self) -> String {
        self.inner.backend.get_title()
    }

    /// Change the window title
    pub fn set_title(&self, title: &str) {
        self.inner.backend.set_title(title);
    }

    /// Logical size
    pub fn size(&self) -> (u32, u32) {
        self.inner.backend.get_size()
    }

    /// Change the logical size
    pub fn set_size(&self, width: u32, height: u32) {
        self.inner.backend.set_size(width, height);
    }

    /// Framebuffer size in device pixels
    pub fn physical_size(&self) -> (u32, u32) {
        self.inner.backend.get_physical_size()
    }

    /// Screen position
    pub fn position(&self) -> (i32, i32) {
        self.inner.backend.get_position()
    }

    /// Move the canvas
    pub fn set_position(&self, x: i32, y: i32) {
        self.inner.backend.set_position(x, y);
    }

    /// Position and size together
    pub fn geometry(&self) -> Geometry {
        self.inner.backend.get_geometry()
    }

    /// Apply only the parts of the geometry that differ from the current one
    pub fn set_geometry(&self, position: Option<(i32, i32)>, size: Option<(u32, u32)>) {
        let current = self.geometry();
        if let Some((x, y)) = position.filter(|position| *position != current.position) {
            self.inner.backend.set_position(x, y);
        }
        if let Some((width, height)) = size.filter(|size| *size != current.size) {
            self.inner.backend.set_size(width, height);
        }
    }

    /// Whether the canvas is fullscreen
    pub fn fullscreen(&self) -> bool {
        self.inner.backend.is_fullscreen()
    }

    /// Switch fullscreen mode
    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.inner.backend.set_fullscreen(fullscreen);
    }

    /// Make the GL context current
    pub fn set_current(&self) {
        self.inner.backend.set_current();
    }

    /// Present the back buffer
    pub fn swap_buffers(&self) {
        self.inner.backend.swap_buffers();
    }

    /// Context identity, to share with canvases created later
    pub fn context(&self) -> SharedContext {
        self.inner.context.clone()
    }

    /// Native context handle
    pub fn context_handle(&self) -> Option<NativeContextHandle> {
        self.inner.backend.context_handle()
    }

    /// Rendered pixels, for offscreen backends
    pub fn framebuffer(&self) -> Option<Frame> {
        self.inner.backend.framebuffer()
    }

    /// The backend canvas
    pub fn backend(&self) -> &Rc<dyn CanvasBackend> {
        &self.inner.backend
    }

    /// Downcast the backend canvas
    pub fn backend_as<T: 'static>(&self) -> Option<&T> {
        self.inner.backend.as_any().downcast_ref::<T>()
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakCanvas {
        WeakCanvas {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("backend", &self.inner.app.backend_name())
            .field("title", &self.title())
            .field("size", &self.size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessCanvas;
    use crate::input::{MouseButton, MouseEventKind};
    use crate::test_support::{headless_app, single_window_app};
    use std::cell::RefCell;

    #[test]
    fn test_close_twice_emits_close_once() {
        let (app, _clock) = headless_app();
        let canvas = Canvas::new(&app, CanvasConfig::default()).unwrap();
        let closes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&closes);
        canvas.connect(EventType::Close, move |_| counter.set(counter.get() + 1));

        canvas.close();
        canvas.close();
        assert!(canvas.is_closed());
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_close_from_own_close_handler() {
        let (app, _clock) = headless_app();
        let canvas = Canvas::new(&app, CanvasConfig::default()).unwrap();
        let weak = canvas.downgrade();
        canvas.connect(EventType::Close, move |_| {
            if let Some(canvas) = weak.upgrade() {
                canvas.close();
            }
        });
        canvas.close();
        assert!(canvas.is_closed());
    }

    #[test]
    fn test_resizable_false_always_accepted() {
        let app = single_window_app();
        let canvas = Canvas::new(&app, CanvasConfig::default().with_resizable(false));
        assert!(canvas.is_ok());
    }

    #[test]
    fn test_second_canvas_on_single_window_backend() {
        let app = single_window_app();
        let first = Canvas::new(&app, CanvasConfig::default()).unwrap();
        assert!(matches!(
            Canvas::new(&app, CanvasConfig::default()),
            Err(AppError::Configuration(_))
        ));

        first.close();
        assert!(Canvas::new(&app, CanvasConfig::default()).is_ok());
    }

    #[test]
    fn test_set_geometry_applies_only_changes() {
        let (app, _clock) = headless_app();
        let canvas = Canvas::new(&app, CanvasConfig::default().with_position(5, 5)).unwrap();
        let resizes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&resizes);
        canvas.connect(EventType::Resize, move |_| counter.set(counter.get() + 1));
        app.process_events();
        assert_eq!(resizes.get(), 1);

        canvas.set_geometry(Some((10, 20)), Some((800, 600)));
        assert_eq!(resizes.get(), 1);
        assert_eq!(canvas.position(), (10, 20));

        canvas.set_geometry(None, Some((320, 240)));
        assert_eq!(resizes.get(), 2);
        assert_eq!(
            canvas.geometry(),
            Geometry { position: (10, 20), size: (320, 240) }
        );
        assert_eq!(canvas.physical_size(), (320, 240));
    }

    #[test]
    fn test_injected_input_reaches_handlers() {
        let (app, clock) = headless_app();
        let canvas = Canvas::new(&app, CanvasConfig::default()).unwrap();
        let kinds = Rc::new(RefCell::new(Vec::new()));
        for event_type in [EventType::MousePress, EventType::MouseRelease, EventType::MouseDoubleClick] {
            let sink = Rc::clone(&kinds);
            canvas.connect(event_type, move |event| {
                if let Some(mouse) = event.as_mouse() {
                    sink.borrow_mut().push(mouse.kind);
                }
            });
        }

        let backend = canvas.backend_as::<HeadlessCanvas>().unwrap();
        for _ in 0..2 {
            backend.core().mouse_press(MouseButton::Left, backend.mouse_input((2.0, 2.0)));
            backend.core().mouse_release(MouseButton::Left, backend.mouse_input((2.0, 2.0)));
            clock.advance(0.1);
        }

        assert_eq!(
            *kinds.borrow(),
            vec![
                MouseEventKind::Press,
                MouseEventKind::Release,
                MouseEventKind::Press,
                MouseEventKind::DoubleClick,
                MouseEventKind::Release,
            ]
        );
    }
}
