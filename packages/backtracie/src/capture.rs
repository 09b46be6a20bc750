//! Backtrace capture.
//!
//! `Backtracer` drives a `FrameSource` through normalization, classification
//! and name resolution, one frame at a time and in order.

use std::ops::Index;
use std::slice;

use serde::{Deserialize, Serialize};

use crate::error::BacktraceError;
use crate::frame::RawFrame;
use crate::location::Location;
use crate::resolver::resolve_frame;

/// Leaf frames dropped by caller-relative capture: the capture primitive and
/// the convenience wrapper that called it.
pub const CALLER_SKIPPED_FRAMES: usize = 2;

/// Enumerates raw frames of a host's execution contexts.
///
/// Implementations must not mutate the target context and must return a
/// consistent snapshot: either every frame of one point in time, or `None`
/// when the context has already terminated.
pub trait FrameSource {
    /// Handle to an execution context (a thread, fiber, ...).
    type Context;
    /// Host value a caller may pass as the target of a capture.
    type Value: ?Sized;

    /// Execution context of the calling OS thread, if any.
    fn current_context(&self) -> Option<Self::Context>;

    /// The execution context `value` refers to. Subtypes of the host's
    /// execution-context type must be accepted like the base type.
    fn execution_context_of(&self, value: &Self::Value) -> Option<Self::Context>;

    /// Short printable description of a host value, for error messages.
    fn describe_value(&self, value: &Self::Value) -> String;

    /// Frames of `context`, leaf first, or `None` if it has terminated.
    fn enumerate_frames(&self, context: &Self::Context) -> Option<Vec<RawFrame>>;

    /// Frames of `context` with its `skipped` leaf-most frames removed.
    ///
    /// The skip counts frames of the full stack, before any frames the source
    /// hides are filtered out. Sources that hide frames must override this.
    fn enumerate_frames_below(
        &self,
        context: &Self::Context,
        skipped: usize,
    ) -> Option<Vec<RawFrame>> {
        self.enumerate_frames(context)
            .map(|frames| frames.into_iter().skip(skipped).collect())
    }

    /// Number of frames currently live on `context`; 0 once it has terminated.
    fn frame_count(&self, context: &Self::Context) -> usize {
        self.enumerate_frames(context).map_or(0, |frames| frames.len())
    }
}

/// Ordered, immutable sequence of locations, leaf first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Backtrace {
    locations: Vec<Location>,
}

impl Backtrace {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Location> {
        self.locations.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Location> {
        self.locations.iter()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn into_locations(self) -> Vec<Location> {
        self.locations
    }
}

impl Index<usize> for Backtrace {
    type Output = Location;

    fn index(&self, index: usize) -> &Location {
        &self.locations[index]
    }
}

impl<'a> IntoIterator for &'a Backtrace {
    type Item = &'a Location;
    type IntoIter = slice::Iter<'a, Location>;

    fn into_iter(self) -> Self::IntoIter {
        self.locations.iter()
    }
}

/// Snapshot of raw frames, resolvable later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawBacktrace {
    frames: Vec<RawFrame>,
}

impl RawBacktrace {
    pub fn new(frames: Vec<RawFrame>) -> Self {
        RawBacktrace { frames }
    }

    pub fn frames(&self) -> &[RawFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn resolve(&self) -> Backtrace {
        resolve_frames(&self.frames)
    }
}

/// Resolve an externally supplied frame sequence, preserving its order.
pub fn resolve_frames(frames: &[RawFrame]) -> Backtrace {
    Backtrace {
        locations: frames.iter().map(resolve_frame).collect(),
    }
}

/// Captures backtraces from a frame source.
#[derive(Debug, Clone)]
pub struct Backtracer<S> {
    source: S,
}

impl<S: FrameSource> Backtracer<S> {
    pub fn new(source: S) -> Self {
        Backtracer { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Backtrace of the calling context, starting at the frame that invoked the
    /// capture wrapper.
    ///
    /// Expects to be called from a capture primitive that was itself called by
    /// a wrapper: those two leaf frames (`CALLER_SKIPPED_FRAMES`) are dropped,
    /// whether or not the source reports them.
    pub fn caller_locations(&self) -> Result<Backtrace, BacktraceError> {
        let context = self
            .source
            .current_context()
            .ok_or(BacktraceError::NoCurrentContext)?;
        // The current context is running this very call, so it cannot be dead.
        let raw = self
            .capture_raw_from(&context, CALLER_SKIPPED_FRAMES)
            .unwrap_or_else(|| RawBacktrace::new(Vec::new()));
        Ok(raw.resolve())
    }

    /// Backtrace of the execution context `target` refers to.
    ///
    /// Returns `Ok(None)` when the context has already terminated, and an
    /// argument error when `target` is not an execution context at all.
    pub fn backtrace_locations(
        &self,
        target: &S::Value,
    ) -> Result<Option<Backtrace>, BacktraceError> {
        Ok(self.capture_raw(target)?.map(|raw| raw.resolve()))
    }

    /// Like `backtrace_locations`, but defers name resolution.
    pub fn capture_raw(&self, target: &S::Value) -> Result<Option<RawBacktrace>, BacktraceError> {
        let context = self.context_of(target)?;
        Ok(self.capture_raw_from(&context, 0))
    }

    /// Number of frames live on `target`'s context.
    pub fn frame_count(&self, target: &S::Value) -> Result<usize, BacktraceError> {
        let context = self.context_of(target)?;
        Ok(self.source.frame_count(&context))
    }

    fn context_of(&self, target: &S::Value) -> Result<S::Context, BacktraceError> {
        self.source.execution_context_of(target).ok_or_else(|| {
            BacktraceError::invalid_argument(self.source.describe_value(target))
        })
    }

    fn capture_raw_from(&self, context: &S::Context, skipped: usize) -> Option<RawBacktrace> {
        let Some(frames) = self.source.enumerate_frames_below(context, skipped) else {
            log::debug!("capture target has terminated; no backtrace");
            return None;
        };
        log::debug!(
            "captured {} frames ({} leaf frames skipped)",
            frames.len(),
            skipped
        );
        Some(RawBacktrace::new(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CodeUnitKind, OwnerRef, SelfKind, SourceLocation, TypeIdentity};

    /// Fixed stacks keyed by name; `dead` has terminated.
    struct FixedSource {
        frames: Vec<RawFrame>,
    }

    impl FrameSource for FixedSource {
        type Context = &'static str;
        type Value = str;

        fn current_context(&self) -> Option<&'static str> {
            Some("main")
        }

        fn execution_context_of(&self, value: &str) -> Option<&'static str> {
            match value {
                "main" => Some("main"),
                "dead" => Some("dead"),
                _ => None,
            }
        }

        fn describe_value(&self, value: &str) -> String {
            format!(":{value}")
        }

        fn enumerate_frames(&self, context: &&'static str) -> Option<Vec<RawFrame>> {
            match *context {
                "main" => Some(self.frames.clone()),
                _ => None,
            }
        }
    }

    fn frame(name: &str, line: u32) -> RawFrame {
        RawFrame::new(CodeUnitKind::OrdinaryMethod, SelfKind::RegularObject, name)
            .with_owner(OwnerRef::new(TypeIdentity::class("Demo")))
            .with_location(SourceLocation::new("demo.rb", None, line))
    }

    fn backtracer() -> Backtracer<FixedSource> {
        Backtracer::new(FixedSource {
            frames: vec![
                frame("primitive", 1),
                frame("wrapper", 2),
                frame("caller", 3),
                frame("root", 4),
            ],
        })
    }

    #[test]
    fn test_caller_locations_skips_capture_frames() {
        let backtrace = backtracer().caller_locations().unwrap();
        let names: Vec<&str> = backtrace.iter().map(|l| l.qualified_method_name()).collect();
        assert_eq!(names, vec!["Demo#caller", "Demo#root"]);
    }

    #[test]
    fn test_backtrace_locations_keeps_every_frame_in_order() {
        let backtrace = backtracer().backtrace_locations("main").unwrap().unwrap();
        assert_eq!(backtrace.len(), 4);
        let lines: Vec<u32> = backtrace.iter().map(|l| l.lineno()).collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_dead_context_is_none_not_empty() {
        assert!(backtracer().backtrace_locations("dead").unwrap().is_none());
        assert_eq!(backtracer().frame_count("dead").unwrap(), 0);
    }

    #[test]
    fn test_invalid_argument() {
        let err = backtracer().backtrace_locations("foo").unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains(":foo"));
    }

    #[test]
    fn test_raw_capture_resolves_later() {
        let raw = backtracer().capture_raw("main").unwrap().unwrap();
        assert_eq!(raw.len(), 4);
        assert_eq!(raw.resolve()[0].qualified_method_name(), "Demo#primitive");
    }

    #[test]
    fn test_backtrace_serializes_as_array() {
        let backtrace = backtracer().caller_locations().unwrap();
        let json = serde_json::to_value(&backtrace).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(2));
        assert_eq!(json[0]["qualified_method_name"], "Demo#caller");
    }
}
