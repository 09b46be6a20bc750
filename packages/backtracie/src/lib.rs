//! Backtraces with qualified method names.
//!
//! A host's stock backtrace API reports a path, a line and a short label per
//! frame. This crate captures the same frames through a [`FrameSource`],
//! classifies the code unit each frame belongs to and synthesizes a qualified
//! name for it (`ModuleC.hello`, `Object$singleton#test_method`,
//! `Integer$refinement@TheRefinement#test_method{block}`, ...).
//!
//! ```
//! use backtracie::host::{MethodDef, Runtime};
//!
//! let runtime = Runtime::new();
//! let backtrace = runtime.run_main("app.rb", |cx| {
//!     let module_c = cx.runtime().define_module("ModuleC");
//!     let owner = cx.runtime().singleton_owner(module_c);
//!     let hello = MethodDef::new(owner, "hello", 3);
//!     cx.call(&hello, backtracie::host::Value::Module(module_c), |cx| {
//!         cx.backtracie_caller_locations()
//!     })
//! });
//! let backtrace = backtrace.unwrap();
//! assert_eq!(backtrace[0].qualified_method_name(), "ModuleC.hello");
//! assert_eq!(backtrace[1].qualified_method_name(), "<main>");
//! ```

pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod frame;
pub mod host;
pub mod ids;
pub mod location;
pub mod logging;
pub mod resolver;

pub use capture::{resolve_frames, Backtrace, Backtracer, FrameSource, RawBacktrace, CALLER_SKIPPED_FRAMES};
pub use classifier::{classify, NamingContext};
pub use config::Capabilities;
pub use error::BacktraceError;
pub use frame::{
    CodeUnitKind, FrameLabel, ModuleKind, OwnerRef, RawFrame, RefinementInfo, SelfKind,
    SourceLocation, TypeIdentity,
};
pub use location::{FrameDebug, Location, NATIVE_CODE_MARKER};
pub use resolver::{qualified_method_name, resolve_frame};
