//! Backend selection
//!
//! A [`Runtime`] owns the registry, the process facts used for probing and at
//! most one selected [`Application`].

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info, warn, Level};

use crate::application::Application;
use crate::backend::{BackendDescriptor, BackendRegistry, ProbeContext};
use crate::config::{is_default_backend, AppConfig, Config, ProbeEnvironment};
use crate::error::{AppError, ProbeAttempt};
use crate::foundation::time::{Clock, SystemClock};
use crate::interactive::host_loop::HostLoop;

/// Backend registry plus the application selected from it
pub struct Runtime {
    registry: BackendRegistry,
    config: AppConfig,
    environment: ProbeEnvironment,
    clock: Rc<dyn Clock>,
    host_loop: Option<Rc<dyn HostLoop>>,
    app: RefCell<Option<Application>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Built-in backends, default settings, facts read from the environment
    pub fn new() -> Self {
        Self {
            registry: BackendRegistry::builtin(),
            config: AppConfig::default(),
            environment: ProbeEnvironment::from_env(),
            clock: Rc::new(SystemClock::new()),
            host_loop: None,
            app: RefCell::new(None),
        }
    }

    /// Like [`new`](Self::new) with settings loaded from a TOML or RON file
    pub fn from_config_file(path: &str) -> Result<Self, AppError> {
        Ok(Self::new().with_config(AppConfig::load_from_file(path)?))
    }

    /// Replace the backend registry
    #[must_use]
    pub fn with_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the settings
    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the probe facts
    #[must_use]
    pub fn with_environment(mut self, environment: ProbeEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Provide the async loop the notebook backend schedules onto
    #[must_use]
    pub fn with_host_loop(mut self, host_loop: Rc<dyn HostLoop>) -> Self {
        self.host_loop = Some(host_loop);
        self
    }

    /// Known backends
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Probe facts in use
    pub fn environment(&self) -> &ProbeEnvironment {
        &self.environment
    }

    /// The selected application, if any
    pub fn app(&self) -> Option<Application> {
        self.app.borrow().clone()
    }

    /// Select a backend, or return the one already selected
    ///
    /// `None` or `"default"` means no preference. Once an application exists
    /// asking for a different backend is a configuration error.
    pub fn use_app(&self, name: Option<&str>) -> Result<Application, AppError> {
        let requested = name.filter(|name| !is_default_backend(name));

        if let Some(app) = self.app() {
            return match requested {
                None => Ok(app),
                Some(name) if app.descriptor().matches(name) => Ok(app),
                Some(name) => Err(AppError::Configuration(format!(
                    "Backend '{}' is already in use, cannot switch to '{name}'",
                    app.backend_name()
                ))),
            };
        }

        let requested = requested.map(str::to_string).or_else(|| {
            self.environment
                .forced_backend
                .clone()
                .filter(|name| !is_default_backend(name))
        });

        let candidates: Vec<&BackendDescriptor> = match &requested {
            Some(name) => {
                let descriptor = self.registry.get(name).ok_or_else(|| {
                    AppError::Configuration(format!(
                        "Unknown backend '{name}', expected one of: {}",
                        self.registry.names().join(", ")
                    ))
                })?;
                vec![descriptor]
            }
            None => self.registry.candidates(&self.environment, &self.config),
        };

        let context = ProbeContext {
            config: &self.config,
            environment: &self.environment,
            clock: &self.clock,
            host_loop: self.host_loop.as_ref(),
        };

        let mut attempts = Vec::with_capacity(candidates.len());
        for descriptor in candidates {
            debug!("Probing backend '{}'", descriptor.name);
            match (descriptor.factory)(&context) {
                Ok(backend) => {
                    info!(
                        "Using backend '{}' ({} toolkit)",
                        descriptor.name, descriptor.toolkit
                    );
                    let app = Application::new(
                        *descriptor,
                        backend,
                        self.config.clone(),
                        &self.environment,
                        Rc::clone(&self.clock),
                    );
                    self.app.replace(Some(app.clone()));
                    return Ok(app);
                }
                Err(err) => {
                    let level = if self.environment.toolkit_loaded(descriptor.toolkit) {
                        warn!(
                            "{} is already loaded but backend '{}' failed: {err}",
                            descriptor.toolkit, descriptor.name
                        );
                        Level::Warn
                    } else {
                        debug!("Backend '{}' unavailable: {err}", descriptor.name);
                        Level::Debug
                    };
                    attempts.push(ProbeAttempt {
                        backend: descriptor.name.to_string(),
                        reason: err.to_string(),
                        level,
                    });
                }
            }
        }

        Err(AppError::Selection { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::backend::headless::HeadlessApp;
    use crate::backend::{ApplicationBackend, Capabilities};
    use crate::error::ProbeError;
    use crate::foundation::time::ManualClock;

    thread_local! {
        static INITIALIZED: Cell<usize> = const { Cell::new(0) };
    }

    fn counting(context: &ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError> {
        INITIALIZED.with(|count| count.set(count.get() + 1));
        Ok(Rc::new(HeadlessApp::new(Rc::clone(context.clock))))
    }

    fn broken(_: &ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError> {
        Err(ProbeError::InitializationFailed("no display".into()))
    }

    fn descriptor(name: &'static str, toolkit: &'static str, working: bool) -> BackendDescriptor {
        BackendDescriptor {
            name,
            toolkit,
            capabilities: Capabilities::SIZE | Capabilities::MULTI_WINDOW,
            offscreen: false,
            factory: if working { counting } else { broken },
        }
    }

    fn runtime(registry: BackendRegistry) -> Runtime {
        Runtime::new()
            .with_registry(registry)
            .with_config(AppConfig::default())
            .with_environment(ProbeEnvironment::default())
            .with_clock(Rc::new(ManualClock::new()))
    }

    #[test]
    fn test_use_app_twice_initializes_once() {
        INITIALIZED.with(|count| count.set(0));
        let runtime = runtime(BackendRegistry::empty().with(descriptor("fake", "FakeKit", true)));

        let first = runtime.use_app(None).unwrap();
        let second = runtime.use_app(None).unwrap();
        let third = runtime.use_app(Some("DEFAULT")).unwrap();
        let fourth = runtime.use_app(Some("Fake")).unwrap();

        assert!(first.ptr_eq(&second) && first.ptr_eq(&third) && first.ptr_eq(&fourth));
        assert_eq!(INITIALIZED.with(Cell::get), 1);
    }

    #[test]
    fn test_switching_backend_is_rejected() {
        let registry = BackendRegistry::empty()
            .with(descriptor("one", "OneKit", true))
            .with(descriptor("two", "TwoKit", true));
        let runtime = runtime(registry);
        runtime.use_app(Some("one")).unwrap();

        let err = runtime.use_app(Some("two")).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_unknown_backend_is_configuration_error() {
        let runtime = runtime(BackendRegistry::empty().with(descriptor("one", "OneKit", true)));
        let err = runtime.use_app(Some("nope")).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(runtime.app().is_none());
    }

    #[test]
    fn test_falls_through_failing_backends() {
        let registry = BackendRegistry::empty()
            .with(descriptor("broken", "BrokenKit", false))
            .with(descriptor("working", "WorkingKit", true));
        let runtime = runtime(registry).with_environment(
            ProbeEnvironment::default().with_loaded_toolkit("BrokenKit"),
        );

        let app = runtime.use_app(None).unwrap();
        assert_eq!(app.backend_name(), "working");
    }

    #[test]
    fn test_failure_of_loaded_toolkit_is_a_warning() {
        let registry = BackendRegistry::empty()
            .with(descriptor("quiet", "QuietKit", false))
            .with(descriptor("loud", "LoudKit", false));
        let runtime = runtime(registry)
            .with_environment(ProbeEnvironment::default().with_loaded_toolkit("LoudKit"));

        let Err(AppError::Selection { attempts }) = runtime.use_app(None) else {
            panic!("expected a selection error");
        };
        let levels: Vec<(&str, Level)> = attempts
            .iter()
            .map(|attempt| (attempt.backend.as_str(), attempt.level))
            .collect();
        assert_eq!(levels, vec![("loud", Level::Warn), ("quiet", Level::Debug)]);
    }

    #[test]
    fn test_all_failing_backends_are_reported_together() {
        let registry = BackendRegistry::empty()
            .with(descriptor("first", "FirstKit", false))
            .with(descriptor("second", "SecondKit", false));
        let runtime = runtime(registry);

        let Err(AppError::Selection { attempts }) = runtime.use_app(Some("default")) else {
            panic!("expected a selection error");
        };
        let names: Vec<&str> = attempts.iter().map(|a| a.backend.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(attempts.iter().all(|a| a.reason.contains("no display")));
    }

    #[test]
    fn test_explicit_failing_backend_reports_single_attempt() {
        let registry = BackendRegistry::empty()
            .with(descriptor("first", "FirstKit", false))
            .with(descriptor("second", "SecondKit", true));
        let runtime = runtime(registry);

        let Err(AppError::Selection { attempts }) = runtime.use_app(Some("first")) else {
            panic!("expected a selection error");
        };
        assert_eq!(attempts.len(), 1);
    }

    #[test]
    fn test_forced_backend_bypasses_probe_order() {
        let registry = BackendRegistry::empty()
            .with(descriptor("first", "FirstKit", true))
            .with(descriptor("second", "SecondKit", true));
        let runtime = runtime(registry)
            .with_environment(ProbeEnvironment::default().with_forced_backend("second"));

        assert_eq!(runtime.use_app(None).unwrap().backend_name(), "second");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let select = || {
            let registry = BackendRegistry::empty()
                .with(descriptor("first", "FirstKit", true))
                .with(descriptor("second", "SecondKit", true))
                .with(descriptor("third", "ThirdKit", true));
            runtime(registry)
                .with_environment(ProbeEnvironment::default().with_loaded_toolkit("ThirdKit"))
                .use_app(None)
                .unwrap()
                .backend_name()
        };
        assert_eq!(select(), "third");
        assert_eq!(select(), select());
    }
}
