//! Host capability flags.
//!
//! Which frame data a host can expose depends on its version. The flags are
//! resolved once at startup and handed to the frame source; the classifier and
//! resolver never look at them.

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::BacktraceError;

/// Environment variable naming a TOML file with capability overrides.
pub const CONFIG_ENV_VAR: &str = "BACKTRACIE_CONFIG";

static GLOBAL_CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// The host reports native (non-source) frames in its stack walk.
    pub native_frames: bool,
    /// The host exposes the refined type and declaring module of refinements.
    /// Without it refinement owners are reported as anonymous modules.
    pub refinement_metadata: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            native_frames: true,
            refinement_metadata: true,
        }
    }
}

impl Capabilities {
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, BacktraceError> {
        toml::from_str(contents).map_err(|err| BacktraceError::config_parse(origin, err))
    }

    pub fn from_path(path: &Path) -> Result<Self, BacktraceError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| BacktraceError::config_read(path, err))?;
        Self::from_toml_str(&contents, path)
    }

    /// Defaults, overridden by the file named in `BACKTRACIE_CONFIG` if set.
    pub fn load() -> Result<Self, BacktraceError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Process-wide capabilities, loaded on first use.
    ///
    /// A config file that cannot be loaded is reported once and the defaults
    /// are used instead.
    pub fn global() -> Capabilities {
        *GLOBAL_CAPABILITIES.get_or_init(|| {
            Self::load().unwrap_or_else(|err| {
                log::warn!("{err}; falling back to default capabilities");
                Capabilities::default()
            })
        })
    }

    /// Pin the process-wide capabilities. Returns false if they were already resolved.
    pub fn install_global(capabilities: Capabilities) -> bool {
        GLOBAL_CAPABILITIES.set(capabilities).is_ok()
    }
}
