//! Application handle wrapping the selected backend

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, info};

use crate::backend::{ApplicationBackend, BackendDescriptor, CanvasBackend, Capabilities};
use crate::config::{AppConfig, ProbeEnvironment};
use crate::foundation::time::{Clock, Stopwatch};

pub(crate) struct ApplicationInner {
    descriptor: BackendDescriptor,
    backend: Rc<dyn ApplicationBackend>,
    config: AppConfig,
    suppress_run: bool,
    clock: Rc<dyn Clock>,
    interactive: Cell<bool>,
    canvases: RefCell<Vec<Weak<dyn CanvasBackend>>>,
}

/// The selected backend and its event loop
///
/// Obtained from [`Runtime::use_app`](crate::Runtime::use_app). Cloning yields
/// another handle to the same application.
#[derive(Clone)]
pub struct Application {
    inner: Rc<ApplicationInner>,
}

impl Application {
    pub(crate) fn new(
        descriptor: BackendDescriptor,
        backend: Rc<dyn ApplicationBackend>,
        config: AppConfig,
        environment: &ProbeEnvironment,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Rc::new(ApplicationInner {
                descriptor,
                backend,
                config,
                suppress_run: environment.suppress_run,
                clock,
                interactive: Cell::new(false),
                canvases: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Registry name of the backend
    pub fn backend_name(&self) -> &'static str {
        self.inner.descriptor.name
    }

    /// Descriptor of the backend
    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.inner.descriptor
    }

    /// Options the backend honours
    pub fn capabilities(&self) -> Capabilities {
        self.inner.descriptor.capabilities
    }

    /// Settings the application was created with
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// The native backend
    pub fn backend(&self) -> &Rc<dyn ApplicationBackend> {
        &self.inner.backend
    }

    /// Time source shared with the backend
    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.inner.clock)
    }

    /// Run one non-blocking pass of the event loop
    pub fn process_events(&self) {
        self.inner.backend.process_events();
    }

    /// Enter the event loop until [`quit`](Self::quit)
    ///
    /// Returns immediately while an interactive hook is installed or when the
    /// gallery environment flag is set.
    pub fn run(&self) {
        if self.inner.suppress_run {
            info!("Gallery mode, not entering the '{}' event loop", self.backend_name());
            return;
        }
        if self.is_interactive() {
            debug!("Interactive hook installed, run() returns immediately");
            return;
        }
        self.inner.backend.run();
    }

    /// Leave the event loop
    pub fn quit(&self) {
        self.inner.backend.quit();
    }

    /// Keep processing events for `duration`
    pub fn sleep(&self, duration: Duration) {
        let poll = self.inner.config.run_poll_interval();
        let stopwatch = Stopwatch::start_new();
        loop {
            self.process_events();
            let remaining = stopwatch.remaining(duration);
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(poll));
        }
    }

    /// Whether an interactive hook drives the loop
    pub fn is_interactive(&self) -> bool {
        self.inner.interactive.get()
    }

    pub(crate) fn set_interactive(&self, interactive: bool) {
        self.inner.interactive.set(interactive);
    }

    /// Whether both handles refer to the same application
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Canvases created on this application that are still open
    pub fn live_canvas_count(&self) -> usize {
        let mut canvases = self.inner.canvases.borrow_mut();
        canvases.retain(|canvas| canvas.upgrade().is_some_and(|canvas| !canvas.is_closed()));
        canvases.len()
    }

    pub(crate) fn register_canvas(&self, canvas: &Rc<dyn CanvasBackend>) {
        self.inner.canvases.borrow_mut().push(Rc::downgrade(canvas));
    }

    pub(crate) fn downgrade(&self) -> Weak<ApplicationInner> {
        Rc::downgrade(&self.inner)
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<rust_canvas app, wrapping the {} toolkit>",
            self.inner.descriptor.toolkit
        )
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("backend", &self.backend_name())
            .field("interactive", &self.is_interactive())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{headless_app, headless_runtime};
    use crate::{Canvas, CanvasConfig};

    #[test]
    fn test_display_names_toolkit() {
        let (app, _clock) = headless_app();
        assert_eq!(app.to_string(), "<rust_canvas app, wrapping the Offscreen toolkit>");
        assert_eq!(app.backend_name(), "headless");
    }

    #[test]
    fn test_run_returns_immediately_in_gallery_mode() {
        let runtime = headless_runtime().with_environment(
            ProbeEnvironment::default().with_suppress_run(true),
        );
        let app = runtime.use_app(Some("headless")).unwrap();
        let _canvas = Canvas::new(&app, CanvasConfig::default()).unwrap();
        // Would block forever with an open canvas otherwise
        app.run();
    }

    #[test]
    fn test_run_returns_immediately_when_interactive() {
        let (app, _clock) = headless_app();
        let _canvas = Canvas::new(&app, CanvasConfig::default()).unwrap();
        app.set_interactive(true);
        app.run();
        assert!(app.is_interactive());
    }

    #[test]
    fn test_sleep_processes_events() {
        let (app, clock) = headless_app();
        let canvas = Canvas::new(&app, CanvasConfig::default()).unwrap();
        let draws = Rc::new(Cell::new(0));
        let counter = Rc::clone(&draws);
        canvas.connect(crate::EventType::Draw, move |_| counter.set(counter.get() + 1));

        canvas.update();
        clock.advance(0.1);
        app.sleep(Duration::from_millis(2));
        assert_eq!(draws.get(), 1);
    }

    #[test]
    fn test_live_canvas_count_ignores_closed() {
        let (app, _clock) = headless_app();
        let first = Canvas::new(&app, CanvasConfig::default()).unwrap();
        let _second = Canvas::new(&app, CanvasConfig::default()).unwrap();
        assert_eq!(app.live_canvas_count(), 2);
        first.close();
        assert_eq!(app.live_canvas_count(), 1);
    }
}
