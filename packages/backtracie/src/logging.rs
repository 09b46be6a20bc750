//! Compile-time gated per-frame tracing.

/// Trace per-frame resolution details only when the `frame_debug_logs` Cargo
/// feature is enabled.
///
/// Capture-level events go through `log::debug!` directly; this macro is for the
/// per-frame hot path, which compiles to a no-op by default while still
/// type-checking its format arguments.
#[macro_export]
macro_rules! frame_debug_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "frame_debug_logs")]
        {
            log::trace!($($arg)*);
        }
        #[cfg(not(feature = "frame_debug_logs"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}
