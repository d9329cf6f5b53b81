//! # Canvas Configuration
//!
//! Serializable description of a canvas plus the validator that rejects
//! options the selected backend cannot honour.
//!
//! ## Validation Rules
//!
//! - **Title / Size**: only an error when changed from the default on a
//!   backend that cannot set them
//! - **Position / Show / Vsync / Fullscreen / Parent / Always on top**: an
//!   error when requested on a backend that lacks the capability
//! - **Resizable / Decorate**: asking to disable them is always legal
//! - **Shared context**: joining an existing context requires context support
//! - **Multiple canvases**: a second live canvas requires multi-window support

use log::debug;
use serde::{Deserialize, Serialize};

use crate::backend::{Capabilities, SharedContext};
use crate::config::Config;
use crate::error::AppError;

/// Default canvas title
pub const DEFAULT_TITLE: &str = "Canvas";

/// Default canvas size in logical pixels
pub const DEFAULT_SIZE: (u32, u32) = (800, 600);

/// # GL Surface Configuration
///
/// Requested pixel format of the canvas' GL surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlConfig {
    /// Red channel bits
    pub red_size: u8,
    /// Green channel bits
    pub green_size: u8,
    /// Blue channel bits
    pub blue_size: u8,
    /// Alpha channel bits
    pub alpha_size: u8,
    /// Depth buffer bits
    pub depth_size: u8,
    /// Stencil buffer bits
    pub stencil_size: u8,
    /// Double buffering
    pub double_buffer: bool,
    /// Stereo rendering
    pub stereo: bool,
    /// Multisample count, 0 disables multisampling
    pub samples: u8,
}

impl Default for GlConfig {
    fn default() -> Self {
        Self {
            red_size: 8,
            green_size: 8,
            blue_size: 8,
            alpha_size: 8,
            depth_size: 24,
            stencil_size: 0,
            double_buffer: true,
            stereo: false,
            samples: 0,
        }
    }
}

/// Context to render with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSpec {
    /// Surface format
    pub gl: GlConfig,
    /// Context identity to share with another canvas, if any
    #[serde(skip)]
    pub shared: Option<SharedContext>,
}

/// Toolkit widget to embed the canvas in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentHandle(pub u64);

/// # Canvas Configuration
///
/// Everything that can be requested when creating a canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Window title
    pub title: String,
    /// Logical size
    pub size: (u32, u32),
    /// Screen position, `None` lets the toolkit decide
    pub position: Option<(i32, i32)>,
    /// Show immediately after creation
    pub show: bool,
    /// Synchronize swaps with the display refresh
    pub vsync: bool,
    /// Whether the user may resize the canvas
    pub resizable: bool,
    /// Whether the window has decorations
    pub decorate: bool,
    /// Start in fullscreen mode
    pub fullscreen: bool,
    /// GL context request
    pub context: ContextSpec,
    /// Embed in a toolkit widget
    pub parent: Option<ParentHandle>,
    /// Keep above other windows
    pub always_on_top: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            size: DEFAULT_SIZE,
            position: None,
            show: false,
            vsync: false,
            resizable: true,
            decorate: true,
            fullscreen: false,
            context: ContextSpec::default(),
            parent: None,
            always_on_top: false,
        }
    }
}

impl Config for CanvasConfig {}

impl CanvasConfig {
    /// Create a configuration with a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the logical size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    /// Set the screen position
    pub fn with_position(mut self, x: i32, y: i32) -> Self {
        self.position = Some((x, y));
        self
    }

    /// Show right after creation
    pub fn with_show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }

    /// Request vertical sync
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Allow or forbid user resizing
    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Enable or disable decorations
    pub fn with_decorate(mut self, decorate: bool) -> Self {
        self.decorate = decorate;
        self
    }

    /// Start fullscreen
    pub fn with_fullscreen(mut self, fullscreen: bool) -> Self {
        self.fullscreen = fullscreen;
        self
    }

    /// Set the surface format
    pub fn with_gl(mut self, gl: GlConfig) -> Self {
        self.context.gl = gl;
        self
    }

    /// Share the GL context of another canvas
    pub fn with_shared_context(mut self, shared: SharedContext) -> Self {
        self.context.shared = Some(shared);
        self
    }

    /// Embed in a toolkit widget
    pub fn with_parent(mut self, parent: ParentHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Keep above other windows
    pub fn with_always_on_top(mut self, always_on_top: bool) -> Self {
        self.always_on_top = always_on_top;
        self
    }

    /// Check every requested option against `capabilities`
    ///
    /// `live_canvases` is the number of canvases already open on the same
    /// application.
    pub fn validate(
        &self,
        backend: &str,
        capabilities: Capabilities,
        live_canvases: usize,
    ) -> Result<(), AppError> {
        let unsupported = |option: &str| {
            AppError::Configuration(format!(
                "Option '{option}' is not supported by the '{backend}' backend"
            ))
        };
        let requires = |requested: bool, flag: Capabilities, option: &str| {
            if requested && !capabilities.contains(flag) {
                Err(unsupported(option))
            } else {
                Ok(())
            }
        };

        requires(self.title != DEFAULT_TITLE, Capabilities::TITLE, "title")?;
        requires(self.size != DEFAULT_SIZE, Capabilities::SIZE, "size")?;
        requires(self.position.is_some(), Capabilities::POSITION, "position")?;
        requires(self.show, Capabilities::SHOW, "show")?;
        requires(self.vsync, Capabilities::VSYNC, "vsync")?;
        requires(self.fullscreen, Capabilities::FULLSCREEN, "fullscreen")?;
        requires(self.parent.is_some(), Capabilities::PARENT, "parent")?;
        requires(self.always_on_top, Capabilities::ALWAYS_ON_TOP, "always_on_top")?;

        // Disabling these is always possible, the toolkit may just ignore it
        if !self.resizable && !capabilities.contains(Capabilities::RESIZABLE) {
            debug!("Backend '{backend}' ignores resizable=false");
        }
        if !self.decorate && !capabilities.contains(Capabilities::DECORATE) {
            debug!("Backend '{backend}' ignores decorate=false");
        }

        let joins_existing_context = self
            .context
            .shared
            .as_ref()
            .is_some_and(|shared| shared.handle().is_some());
        requires(joins_existing_context, Capabilities::CONTEXT, "context")?;

        if live_canvases > 0 && !capabilities.contains(Capabilities::MULTI_WINDOW) {
            return Err(AppError::Configuration(format!(
                "The '{backend}' backend supports a single canvas, {live_canvases} already open"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeContextHandle;

    fn minimal() -> Capabilities {
        Capabilities::SIZE
    }

    #[test]
    fn test_defaults_are_valid_everywhere() {
        assert!(CanvasConfig::default().validate("bare", Capabilities::empty(), 0).is_ok());
    }

    #[test]
    fn test_disabling_resizable_and_decorate_always_succeeds() {
        let config = CanvasConfig::default().with_resizable(false).with_decorate(false);
        assert!(config.validate("bare", Capabilities::empty(), 0).is_ok());
    }

    #[test]
    fn test_unsupported_options_are_rejected() {
        let rejected = [
            CanvasConfig::new("Custom"),
            CanvasConfig::default().with_position(10, 10),
            CanvasConfig::default().with_show(true),
            CanvasConfig::default().with_vsync(true),
            CanvasConfig::default().with_fullscreen(true),
            CanvasConfig::default().with_parent(ParentHandle(1)),
            CanvasConfig::default().with_always_on_top(true),
        ];
        for config in rejected {
            let result = config.validate("bare", minimal(), 0);
            assert!(matches!(result, Err(AppError::Configuration(_))), "{config:?}");
        }
        assert!(CanvasConfig::default().with_size(10, 10).validate("bare", minimal(), 0).is_ok());
    }

    #[test]
    fn test_joining_owned_context_requires_capability() {
        let shared = SharedContext::new();
        let fresh = CanvasConfig::default().with_shared_context(shared.clone());
        assert!(fresh.validate("bare", minimal(), 0).is_ok());

        shared.add_ref("bare", || Ok(NativeContextHandle(1))).unwrap();
        let joining = CanvasConfig::default().with_shared_context(shared);
        assert!(joining.validate("bare", minimal(), 0).is_err());
        assert!(joining
            .validate("bare", minimal() | Capabilities::CONTEXT, 0)
            .is_ok());
    }

    #[test]
    fn test_second_canvas_requires_multi_window() {
        let config = CanvasConfig::default();
        assert!(config.validate("single", minimal(), 1).is_err());
        assert!(config.validate("multi", minimal() | Capabilities::MULTI_WINDOW, 1).is_ok());
    }

    #[test]
    fn test_ron_round_trip_keeps_requested_options() {
        let config = CanvasConfig::new("Scope").with_size(320, 200).with_vsync(true);
        let text = ron::ser::to_string(&config).unwrap();
        let parsed: CanvasConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed.title, "Scope");
        assert_eq!(parsed.size, (320, 200));
        assert!(parsed.vsync);
        assert!(parsed.context.shared.is_none());
    }
}
