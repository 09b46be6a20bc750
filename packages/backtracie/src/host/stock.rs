//! The host's own backtrace API: path, line and label only.

use std::fmt;

use super::context::{effective_locations, ExecutionContext};

/// A frame as the stock API reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLocation {
    path: Option<String>,
    absolute_path: Option<String>,
    lineno: u32,
    label: String,
    base_label: String,
}

impl StockLocation {
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn absolute_path(&self) -> Option<&str> {
        self.absolute_path.as_deref()
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
}

impl fmt::Display for StockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.as_deref().unwrap_or_default();
        if self.lineno != 0 {
            write!(f, "{}:{}:in `{}'", path, self.lineno, self.label)
        } else {
            write!(f, "{}:in `{}'", path, self.label)
        }
    }
}

/// Stock locations of `context`, leaf first, or `None` once it has terminated.
///
/// Native frames are always reported, whatever the capabilities say.
pub(crate) fn stock_locations(context: &ExecutionContext) -> Option<Vec<StockLocation>> {
    let state = context.lock_state();
    if !state.alive {
        return None;
    }

    let locations = effective_locations(&state.frames);
    let mut stack: Vec<StockLocation> = state
        .frames
        .iter()
        .zip(locations)
        .map(|(frame, location)| {
            let (path, absolute_path, lineno) = match location {
                Some(location) => (Some(location.path), location.absolute_path, location.line),
                None => (None, None, 0),
            };
            StockLocation {
                path,
                absolute_path,
                lineno,
                label: frame.label().to_string(),
                base_label: frame.base_label().to_string(),
            }
        })
        .collect();
    stack.reverse();
    Some(stack)
}
