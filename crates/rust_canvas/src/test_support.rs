//! Shared fixtures for unit tests

use std::rc::Rc;

use crate::backend::headless::HeadlessApp;
use crate::backend::{ApplicationBackend, BackendDescriptor, BackendRegistry, Capabilities, ProbeContext};
use crate::config::{AppConfig, ProbeEnvironment};
use crate::error::ProbeError;
use crate::foundation::time::{Clock, ManualClock};
use crate::{Application, Runtime};

/// Built-in registry, default settings, a display, no forced backend
pub(crate) fn headless_runtime() -> Runtime {
    Runtime::new()
        .with_config(AppConfig::default())
        .with_environment(ProbeEnvironment::default())
        .with_clock(Rc::new(ManualClock::new()))
}

/// Headless application driven by a manual clock
pub(crate) fn headless_app() -> (Application, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new());
    let app = headless_runtime()
        .with_clock(Rc::clone(&clock) as Rc<dyn Clock>)
        .use_app(Some("headless"))
        .expect("headless backend always probes");
    (app, clock)
}

fn offscreen(context: &ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError> {
    Ok(Rc::new(HeadlessApp::new(Rc::clone(context.clock))))
}

/// Offscreen application whose descriptor only allows one canvas and no
/// resizing or decoration control
pub(crate) fn single_window_app() -> Application {
    let registry = BackendRegistry::empty().with(BackendDescriptor {
        name: "single",
        toolkit: "SingleKit",
        capabilities: Capabilities::TITLE | Capabilities::SIZE,
        offscreen: true,
        factory: offscreen,
    });
    headless_runtime()
        .with_registry(registry)
        .use_app(None)
        .expect("offscreen factory always succeeds")
}
