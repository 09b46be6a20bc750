//! Resolved backtrace locations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BacktraceError;
use crate::frame::{CodeUnitKind, SelfKind, SourceLocation};

/// Path reported for frames with no backing source.
pub const NATIVE_CODE_MARKER: &str = "(in native code)";

/// Display form of a frame's source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    pub absolute_path: Option<String>,
    pub path: String,
    pub lineno: u32,
    pub path_is_synthetic: bool,
}

/// Turn an optional raw source position into its display form.
///
/// A missing location becomes the native-code marker at line 0. A location
/// reporting line 0 keeps its path but is flagged synthetic, so that
/// `lineno == 0` always coincides with `path_is_synthetic`.
pub fn normalize(location: Option<&SourceLocation>) -> NormalizedPath {
    match location {
        Some(location) if !location.path.is_empty() => NormalizedPath {
            absolute_path: location.absolute_path.clone(),
            path: location.path.clone(),
            lineno: location.line,
            path_is_synthetic: location.line == 0,
        },
        _ => NormalizedPath {
            absolute_path: Some(NATIVE_CODE_MARKER.to_string()),
            path: NATIVE_CODE_MARKER.to_string(),
            lineno: 0,
            path_is_synthetic: true,
        },
    }
}

/// Raw classification inputs kept alongside a location for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDebug {
    pub native: bool,
    pub self_kind: SelfKind,
    pub code_unit_kind: CodeUnitKind,
    pub nesting_depth: u32,
    pub naming_context: String,
}

/// A single resolved frame. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LocationFields")]
pub struct Location {
    absolute_path: Option<String>,
    path: String,
    lineno: u32,
    label: String,
    base_label: String,
    qualified_method_name: String,
    path_is_synthetic: bool,
    debug: FrameDebug,
}

/// Unchecked wire form of a `Location`.
#[derive(Deserialize)]
struct LocationFields {
    absolute_path: Option<String>,
    path: String,
    lineno: u32,
    label: String,
    base_label: String,
    qualified_method_name: String,
    path_is_synthetic: bool,
    debug: FrameDebug,
}

impl TryFrom<LocationFields> for Location {
    type Error = BacktraceError;

    fn try_from(fields: LocationFields) -> Result<Self, Self::Error> {
        if fields.path.is_empty() {
            return Err(BacktraceError::invalid_location("empty path"));
        }
        if (fields.lineno == 0) != fields.path_is_synthetic {
            return Err(BacktraceError::invalid_location(format!(
                "lineno {} with path_is_synthetic = {}",
                fields.lineno, fields.path_is_synthetic
            )));
        }
        Ok(Location {
            absolute_path: fields.absolute_path,
            path: fields.path,
            lineno: fields.lineno,
            label: fields.label,
            base_label: fields.base_label,
            qualified_method_name: fields.qualified_method_name,
            path_is_synthetic: fields.path_is_synthetic,
            debug: fields.debug,
        })
    }
}

impl Location {
    pub(crate) fn new(
        normalized: NormalizedPath,
        label: String,
        base_label: String,
        qualified_method_name: String,
        debug: FrameDebug,
    ) -> Self {
        Location {
            absolute_path: normalized.absolute_path,
            path: normalized.path,
            lineno: normalized.lineno,
            label,
            base_label,
            qualified_method_name,
            path_is_synthetic: normalized.path_is_synthetic,
            debug,
        }
    }

    pub fn absolute_path(&self) -> Option<&str> {
        self.absolute_path.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lineno(&self) -> u32 {
        self.lineno
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn base_label(&self) -> &str {
        &self.base_label
    }

    pub fn qualified_method_name(&self) -> &str {
        &self.qualified_method_name
    }

    pub fn path_is_synthetic(&self) -> bool {
        self.path_is_synthetic
    }

    pub fn debug(&self) -> &FrameDebug {
        &self.debug
    }

    /// `path:lineno:in `label'`, dropping the line when it is unknown.
    pub fn to_s(&self) -> String {
        self.render(&self.label)
    }

    /// Same as `to_s` but with the qualified method name in place of the label.
    pub fn fancy_to_s(&self) -> String {
        self.render(&self.qualified_method_name)
    }

    fn render(&self, name: &str) -> String {
        if self.lineno != 0 {
            format!("{}:{}:in `{}'", self.path, self.lineno, name)
        } else {
            format!("{}:in `{}'", self.path, name)
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_s())
    }
}
