//! Name-keyed backend registry
//!
//! The registry is the only place that knows concrete toolkit names. Its
//! declaration order is the fallback probe order.

use std::fmt;
use std::rc::Rc;

use log::warn;

use super::{ApplicationBackend, Capabilities};
use crate::config::{is_default_backend, AppConfig, ProbeEnvironment};
use crate::error::ProbeError;
use crate::foundation::time::Clock;
use crate::interactive::host_loop::HostLoop;

/// Everything a factory may consult while probing
pub struct ProbeContext<'a> {
    /// Process-wide settings
    pub config: &'a AppConfig,
    /// Facts about the hosting process
    pub environment: &'a ProbeEnvironment,
    /// Time source for tick-driven timers and input timestamps
    pub clock: &'a Rc<dyn Clock>,
    /// Async host loop, when the process embeds one
    pub host_loop: Option<&'a Rc<dyn HostLoop>>,
}

/// Initializes a toolkit; an error means the toolkit is unusable here
pub type BackendFactory = fn(&ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError>;

/// Immutable description of one adapter
#[derive(Clone, Copy)]
pub struct BackendDescriptor {
    /// Registry name, matched case-insensitively
    pub name: &'static str,
    /// Name of the native toolkit it wraps
    pub toolkit: &'static str,
    /// Options the adapter honours
    pub capabilities: Capabilities,
    /// Renders without a display server
    pub offscreen: bool,
    /// Probe and construct the application backend
    pub factory: BackendFactory,
}

impl BackendDescriptor {
    /// Whether `name` refers to this backend
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("toolkit", &self.toolkit)
            .field("capabilities", &self.capabilities)
            .field("offscreen", &self.offscreen)
            .finish_non_exhaustive()
    }
}

/// Ordered set of known backends
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    descriptors: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    /// Registry without any backend
    pub fn empty() -> Self {
        Self::default()
    }

    /// The adapters shipped with this crate, in probe order
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        #[cfg(feature = "glfw")]
        registry.register(super::glfw::descriptor());
        registry.register(super::notebook::descriptor());
        registry.register(super::headless::descriptor());
        registry
    }

    /// Append a backend, replacing any previous one with the same name
    pub fn register(&mut self, descriptor: BackendDescriptor) {
        if let Some(existing) = self
            .descriptors
            .iter_mut()
            .find(|existing| existing.matches(descriptor.name))
        {
            *existing = descriptor;
        } else {
            self.descriptors.push(descriptor);
        }
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with(mut self, descriptor: BackendDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Look up a backend by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&BackendDescriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.matches(name))
    }

    /// Registered names in declaration order
    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(|descriptor| descriptor.name).collect()
    }

    /// Iterate in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.iter()
    }

    /// Probe order when no backend was named
    ///
    /// 1. offscreen backends, when no display is reachable
    /// 2. backends whose toolkit is already loaded
    /// 3. the configured default backend
    /// 4. everything else in declaration order
    pub fn candidates(&self, environment: &ProbeEnvironment, config: &AppConfig) -> Vec<&BackendDescriptor> {
        let mut ordered: Vec<&BackendDescriptor> = Vec::with_capacity(self.descriptors.len());

        if environment.is_headless() {
            for descriptor in self.descriptors.iter().filter(|d| d.offscreen) {
                push_unique(&mut ordered, descriptor);
            }
        }

        for descriptor in self
            .descriptors
            .iter()
            .filter(|d| environment.toolkit_loaded(d.toolkit))
        {
            push_unique(&mut ordered, descriptor);
        }

        if !is_default_backend(&config.default_backend) {
            match self.get(&config.default_backend) {
                Some(descriptor) => push_unique(&mut ordered, descriptor),
                None => warn!(
                    "Configured default backend '{}' is not registered",
                    config.default_backend
                ),
            }
        }

        for descriptor in &self.descriptors {
            push_unique(&mut ordered, descriptor);
        }
        ordered
    }
}

fn push_unique<'a>(ordered: &mut Vec<&'a BackendDescriptor>, descriptor: &'a BackendDescriptor) {
    if !ordered.iter().any(|existing| existing.matches(descriptor.name)) {
        ordered.push(descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable(_: &ProbeContext<'_>) -> Result<Rc<dyn ApplicationBackend>, ProbeError> {
        Err(ProbeError::Unavailable("test".into()))
    }

    fn descriptor(name: &'static str, toolkit: &'static str, offscreen: bool) -> BackendDescriptor {
        BackendDescriptor {
            name,
            toolkit,
            capabilities: Capabilities::empty(),
            offscreen,
            factory: unavailable,
        }
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::empty()
            .with(descriptor("alpha", "AlphaKit", false))
            .with(descriptor("beta", "BetaKit", false))
            .with(descriptor("gamma", "GammaKit", true))
            .with(descriptor("delta", "DeltaKit", false))
    }

    fn names(candidates: &[&BackendDescriptor]) -> Vec<&'static str> {
        candidates.iter().map(|d| d.name).collect()
    }

    #[test]
    fn test_declaration_order_without_preferences() {
        let registry = registry();
        let order = registry.candidates(&ProbeEnvironment::default(), &AppConfig::default());
        assert_eq!(names(&order), vec!["alpha", "beta", "gamma", "delta"]);
    }

    #[test]
    fn test_loaded_toolkits_then_default_then_rest() {
        let registry = registry();
        let environment = ProbeEnvironment::default().with_loaded_toolkit("deltakit");
        let config = AppConfig::default().with_default_backend("Beta");

        let order = registry.candidates(&environment, &config);
        assert_eq!(names(&order), vec!["delta", "beta", "alpha", "gamma"]);
    }

    #[test]
    fn test_headless_prefers_offscreen() {
        let registry = registry();
        let environment = ProbeEnvironment::default()
            .with_display(false)
            .with_loaded_toolkit("AlphaKit");

        let order = registry.candidates(&environment, &AppConfig::default().with_default_backend("gamma"));
        assert_eq!(names(&order), vec!["gamma", "alpha", "beta", "delta"]);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(descriptor("ALPHA", "Other", true));
        assert_eq!(registry.names().len(), 4);
        assert_eq!(registry.get("alpha").map(|d| d.toolkit), Some("Other"));
    }
}
