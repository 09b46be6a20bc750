//! Execution contexts of the reference host and the scripting surface that
//! drives them.
//!
//! Every context owns a frame stack behind a mutex. The thread running the
//! context pushes and pops frames through a `Script`; other threads only ever
//! read the stack, holding the lock for the whole walk.

use std::cell::RefCell;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::capture::Backtrace;
use crate::config::Capabilities;
use crate::error::BacktraceError;
use crate::frame::{CodeUnitKind, ModuleKind, RawFrame, SourceLocation};
use crate::ids::{ModuleId, ObjectId};

use super::heap::Heap;
use super::stock::StockLocation;
use super::{Runtime, Value};

/// Path reported for code run through `eval`.
pub const EVAL_PATH: &str = "(eval)";

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<Arc<ExecutionContext>>> = const { RefCell::new(None) };
}

/// Context attached to the calling OS thread, if any.
pub(crate) fn current_context() -> Option<Arc<ExecutionContext>> {
    CURRENT_CONTEXT.with(|current| current.borrow().clone())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MethodEntry {
    owner: ModuleId,
    name: String,
}

/// One activation record on a host stack.
#[derive(Debug, Clone)]
pub(crate) struct HostFrame {
    kind: CodeUnitKind,
    entry: Option<MethodEntry>,
    self_value: Value,
    depth: u32,
    unit_name: String,
    native: bool,
    path: Option<String>,
    absolute_path: Option<String>,
    line: u32,
    label: String,
    base_label: String,
}

impl HostFrame {
    pub(crate) fn is_native(&self) -> bool {
        self.native
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn base_label(&self) -> &str {
        &self.base_label
    }

    /// Own source position; native frames have none.
    pub(crate) fn source_location(&self) -> Option<SourceLocation> {
        if self.native {
            return None;
        }
        self.path
            .as_ref()
            .map(|path| SourceLocation::new(path.clone(), self.absolute_path.clone(), self.line))
    }

    pub(crate) fn to_raw(
        &self,
        heap: &Heap,
        capabilities: Capabilities,
        location: Option<SourceLocation>,
    ) -> RawFrame {
        let self_kind = heap.self_kind(&self.self_value);
        let mut raw = RawFrame::new(self.kind, self_kind, self.unit_name.clone())
            .with_nesting_depth(self.depth)
            .with_label(self.label.clone(), self.base_label.clone());

        if let Value::Module(receiver) = &self.self_value {
            raw = raw.with_receiver(heap.identity(*receiver));
        }

        let owner = match (&self.entry, self.kind) {
            (Some(entry), _) => Some(entry.owner),
            (None, CodeUnitKind::Block | CodeUnitKind::EvalBody) => {
                Some(heap.class_of(&self.self_value))
            }
            (None, _) => None,
        };
        if let Some(owner) = owner {
            raw = raw.with_owner(heap.owner_ref(owner, capabilities));
        }

        if let Some(location) = location {
            raw = raw.with_location(location);
        }
        raw.is_native = self.native;
        raw
    }
}

/// Location each frame reports, oldest first.
///
/// Native frames report the position of the nearest older source frame, or
/// nothing when there is none.
pub(crate) fn effective_locations(frames: &[HostFrame]) -> Vec<Option<SourceLocation>> {
    let mut inherited: Option<SourceLocation> = None;
    frames
        .iter()
        .map(|frame| match frame.source_location() {
            Some(location) => {
                inherited = Some(location.clone());
                Some(location)
            }
            None => inherited.clone(),
        })
        .collect()
}

#[derive(Debug, Default)]
pub(crate) struct ContextState {
    /// Oldest frame first.
    pub(crate) frames: Vec<HostFrame>,
    pub(crate) alive: bool,
}

/// A host thread of execution.
#[derive(Debug)]
pub struct ExecutionContext {
    thread: ObjectId,
    state: Mutex<ContextState>,
}

impl ExecutionContext {
    pub(crate) fn new(thread: ObjectId) -> Self {
        ExecutionContext {
            thread,
            state: Mutex::new(ContextState {
                frames: Vec::new(),
                alive: true,
            }),
        }
    }

    /// Context of a thread object that was never started.
    pub(crate) fn unstarted(thread: ObjectId) -> Self {
        ExecutionContext {
            thread,
            state: Mutex::new(ContextState::default()),
        }
    }

    /// Id of the thread object this context belongs to.
    pub fn thread(&self) -> ObjectId {
        self.thread
    }

    pub fn is_alive(&self) -> bool {
        self.lock_state().alive
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().expect("execution context lock poisoned")
    }

    fn push(&self, frame: HostFrame) {
        self.lock_state().frames.push(frame);
    }

    fn pop(&self) {
        self.lock_state().frames.pop();
    }

    fn terminate(&self) {
        let mut state = self.lock_state();
        state.alive = false;
        state.frames.clear();
    }
}

struct PopOnDrop(Arc<ExecutionContext>);

impl Drop for PopOnDrop {
    fn drop(&mut self) {
        self.0.pop();
    }
}

/// Attaches a context to the calling OS thread; terminates it on drop.
struct Attached {
    previous: Option<Arc<ExecutionContext>>,
    context: Arc<ExecutionContext>,
}

impl Attached {
    fn new(context: Arc<ExecutionContext>) -> Self {
        let previous =
            CURRENT_CONTEXT.with(|current| current.borrow_mut().replace(context.clone()));
        Attached { previous, context }
    }
}

impl Drop for Attached {
    fn drop(&mut self) {
        self.context.terminate();
        log::debug!("thread {} terminated", self.context.thread().raw());
        let previous = self.previous.take();
        CURRENT_CONTEXT.with(|current| *current.borrow_mut() = previous);
    }
}

/// A method body as seen by the frame stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub owner: ModuleId,
    pub name: String,
    /// Defining file; the caller's file when unset.
    pub path: Option<String>,
    pub line: u32,
}

impl MethodDef {
    pub fn new(owner: ModuleId, name: impl Into<String>, line: u32) -> Self {
        MethodDef {
            owner,
            name: name.into(),
            path: None,
            line,
        }
    }

    pub fn in_file(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A block, closed over the frame it was created in.
#[derive(Debug, Clone)]
pub struct Proc {
    origin: HostFrame,
}

/// A method whose body is a block (`define_method`).
#[derive(Debug, Clone)]
pub struct DefinedMethod {
    pub owner: ModuleId,
    pub name: String,
    body: Proc,
}

/// A spawned host thread.
#[derive(Debug)]
pub struct HostThread<R> {
    value: Value,
    handle: JoinHandle<R>,
}

impl<R> HostThread<R> {
    pub(crate) fn new(value: Value, handle: JoinHandle<R>) -> Self {
        HostThread { value, handle }
    }

    /// The thread object.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Wait for the thread from outside any script.
    pub fn join(self) -> R {
        self.handle
            .join()
            .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
    }
}

fn block_label(depth: u32, base: &str) -> String {
    match depth {
        0 => base.to_string(),
        1 => format!("block in {base}"),
        levels => format!("block ({levels} levels) in {base}"),
    }
}

/// Handle through which code runs on an attached execution context.
pub struct Script {
    runtime: Runtime,
    context: Arc<ExecutionContext>,
}

impl Script {
    pub(crate) fn run_attached<R>(
        runtime: Runtime,
        context: Arc<ExecutionContext>,
        f: impl FnOnce(&Script) -> R,
    ) -> R {
        let _attached = Attached::new(context.clone());
        let script = Script { runtime, context };
        f(&script)
    }

    pub(crate) fn top_level_frame(path: &str, absolute_path: Option<String>) -> HostFrame {
        HostFrame {
            kind: CodeUnitKind::TopLevelBody,
            entry: None,
            self_value: Value::Main,
            depth: 0,
            unit_name: "<main>".to_string(),
            native: false,
            path: Some(path.to_string()),
            absolute_path,
            line: 1,
            label: "<main>".to_string(),
            base_label: "<main>".to_string(),
        }
    }

    pub(crate) fn native_frame(owner: ModuleId, name: &str, self_value: Value) -> HostFrame {
        HostFrame {
            kind: CodeUnitKind::NativeCallIn,
            entry: Some(MethodEntry {
                owner,
                name: name.to_string(),
            }),
            self_value,
            depth: 0,
            unit_name: name.to_string(),
            native: true,
            path: None,
            absolute_path: None,
            line: 0,
            label: name.to_string(),
            base_label: name.to_string(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Thread object of this context.
    pub fn current_thread(&self) -> Value {
        Value::Object(self.context.thread())
    }

    /// Receiver of the innermost frame.
    pub fn self_value(&self) -> Value {
        self.context
            .lock_state()
            .frames
            .last()
            .map_or(Value::Main, |frame| frame.self_value.clone())
    }

    /// Number of frames currently on this context's stack.
    pub fn depth(&self) -> usize {
        self.context.lock_state().frames.len()
    }

    /// Move the innermost source frame to line `line`.
    pub fn line(&self, line: u32) {
        let mut state = self.context.lock_state();
        if let Some(frame) = state.frames.iter_mut().rev().find(|frame| !frame.native) {
            frame.line = line;
        }
    }

    fn innermost_source_frame(&self) -> Option<HostFrame> {
        self.context
            .lock_state()
            .frames
            .iter()
            .rev()
            .find(|frame| !frame.native)
            .cloned()
    }

    fn with_frame<R>(&self, frame: HostFrame, f: impl FnOnce(&Script) -> R) -> R {
        self.context.push(frame);
        let _pop = PopOnDrop(self.context.clone());
        f(self)
    }

    /// Invoke an ordinary method.
    pub fn call<R>(&self, method: &MethodDef, receiver: Value, f: impl FnOnce(&Script) -> R) -> R {
        let caller = self.innermost_source_frame();
        let (path, absolute_path) = match &method.path {
            Some(path) => (Some(path.clone()), self.runtime.absolute_path(path)),
            None => caller
                .map(|frame| (frame.path, frame.absolute_path))
                .unwrap_or_default(),
        };
        let frame = HostFrame {
            kind: CodeUnitKind::OrdinaryMethod,
            entry: Some(MethodEntry {
                owner: method.owner,
                name: method.name.clone(),
            }),
            self_value: receiver,
            depth: 0,
            unit_name: method.name.clone(),
            native: false,
            path,
            absolute_path,
            line: method.line,
            label: method.name.clone(),
            base_label: method.name.clone(),
        };
        self.with_frame(frame, f)
    }

    /// Invoke a method implemented in native code.
    pub fn native<R>(
        &self,
        receiver: Value,
        owner: ModuleId,
        name: &str,
        f: impl FnOnce(&Script) -> R,
    ) -> R {
        self.with_frame(Self::native_frame(owner, name, receiver), f)
    }

    /// Capture a block at the current position.
    pub fn block(&self) -> Proc {
        // Under a native root there is no source frame to close over.
        let origin = self
            .innermost_source_frame()
            .unwrap_or_else(|| HostFrame {
                kind: CodeUnitKind::Block,
                entry: None,
                self_value: self.self_value(),
                depth: 0,
                unit_name: "block".to_string(),
                native: false,
                path: None,
                absolute_path: None,
                line: 0,
                label: "block".to_string(),
                base_label: "block".to_string(),
            });
        Proc { origin }
    }

    fn block_frame(&self, block: &Proc, rebound_self: Option<Value>) -> HostFrame {
        let origin = &block.origin;
        let mut frame = origin.clone();
        frame.depth = origin.depth + 1;
        frame.label = block_label(frame.depth, &origin.base_label);

        if let Some(receiver) = rebound_self {
            if origin.entry.is_none() && receiver != origin.self_value {
                frame.kind = match receiver {
                    Value::Module(_) => CodeUnitKind::ClassOrModuleBody,
                    Value::Main => CodeUnitKind::TopLevelBody,
                    _ => CodeUnitKind::Block,
                };
            }
            frame.self_value = receiver;
        }
        frame
    }

    /// Run a block directly, the way `yield` does.
    pub fn yield_block<R>(&self, block: &Proc, f: impl FnOnce(&Script) -> R) -> R {
        self.with_frame(self.block_frame(block, None), f)
    }

    /// Run a block with `receiver` as self (`instance_exec`, `class_exec`).
    pub fn instance_exec<R>(&self, receiver: Value, block: &Proc, f: impl FnOnce(&Script) -> R) -> R {
        let basic_object = self.runtime.well_known().basic_object;
        self.native(receiver.clone(), basic_object, "instance_exec", |cx| {
            cx.with_frame(cx.block_frame(block, Some(receiver)), f)
        })
    }

    /// Define a method whose body is a block created at the current position.
    pub fn define_method(&self, owner: ModuleId, name: impl Into<String>) -> DefinedMethod {
        DefinedMethod {
            owner,
            name: name.into(),
            body: self.block(),
        }
    }

    /// Invoke a method defined with `define_method`.
    ///
    /// The body keeps running as a block of the frame that defined it.
    pub fn call_defined<R>(
        &self,
        method: &DefinedMethod,
        receiver: Value,
        f: impl FnOnce(&Script) -> R,
    ) -> R {
        let mut frame = self.block_frame(&method.body, None);
        frame.kind = CodeUnitKind::OrdinaryMethod;
        frame.entry = Some(MethodEntry {
            owner: method.owner,
            name: method.name.clone(),
        });
        frame.unit_name = method.name.clone();
        frame.self_value = receiver;
        self.with_frame(frame, f)
    }

    /// Execute the body of a class or module definition.
    pub fn class_body<R>(&self, module: ModuleId, f: impl FnOnce(&Script) -> R) -> R {
        let caller = self.innermost_source_frame();
        let (keyword, name) = {
            let heap = self.runtime.heap();
            let keyword = match heap.kind(module) {
                ModuleKind::Class => "class",
                ModuleKind::Module => "module",
            };
            let name = match heap.name(module) {
                Some(name) => name.rsplit("::").next().unwrap_or(name).to_string(),
                None => heap.inspect(&Value::Module(module)),
            };
            (keyword, name)
        };
        let label = format!("<{keyword}:{name}>");
        let frame = HostFrame {
            kind: CodeUnitKind::ClassOrModuleBody,
            entry: None,
            self_value: Value::Module(module),
            depth: 0,
            unit_name: label.clone(),
            native: false,
            path: caller.as_ref().and_then(|frame| frame.path.clone()),
            absolute_path: caller.as_ref().and_then(|frame| frame.absolute_path.clone()),
            line: caller.as_ref().map_or(1, |frame| frame.line),
            label: label.clone(),
            base_label: label,
        };
        self.with_frame(frame, f)
    }

    /// Evaluate code in the binding of the innermost source frame.
    pub fn eval<R>(&self, f: impl FnOnce(&Script) -> R) -> R {
        let origin = self.innermost_source_frame();
        let kernel = self.runtime.well_known().kernel;
        self.native(self.self_value(), kernel, "eval", |cx| match origin {
            Some(origin) => {
                let mut frame = origin;
                frame.kind = match frame.kind {
                    CodeUnitKind::Block | CodeUnitKind::EvalBody => CodeUnitKind::EvalBody,
                    kind if frame.entry.is_none()
                        && !matches!(
                            kind,
                            CodeUnitKind::TopLevelBody | CodeUnitKind::ClassOrModuleBody
                        ) =>
                    {
                        CodeUnitKind::EvalBody
                    }
                    kind => kind,
                };
                frame.depth += 1;
                frame.path = Some(EVAL_PATH.to_string());
                frame.absolute_path = None;
                frame.line = 1;
                cx.with_frame(frame, f)
            }
            None => f(cx),
        })
    }

    /// Start a thread running a block created at the current position.
    ///
    /// `class` is the thread class to instantiate; `Thread` when unset.
    pub fn spawn_thread<R, F>(&self, class: Option<ModuleId>, f: F) -> HostThread<R>
    where
        R: Send + 'static,
        F: FnOnce(&Script) -> R + Send + 'static,
    {
        let root = self.block_frame(&self.block(), None);
        self.runtime.spawn_with_root(class, root, f)
    }

    /// Start a thread whose entry point is native code, with no source frame below it.
    pub fn spawn_native_thread<R, F>(&self, entry: &str, f: F) -> HostThread<R>
    where
        R: Send + 'static,
        F: FnOnce(&Script) -> R + Send + 'static,
    {
        self.runtime.spawn_native_thread(entry, f)
    }

    /// Wait for a thread, blocked inside `Thread#value`.
    pub fn join<R>(&self, thread: HostThread<R>) -> R {
        let owner = self.runtime.well_known().thread;
        let value = thread.value.clone();
        self.native(value, owner, "value", |_| thread.join())
    }

    /// `Backtracie.caller_locations`: a source wrapper around a native primitive.
    pub fn backtracie_caller_locations(&self) -> Result<Backtrace, BacktraceError> {
        let well_known = self.runtime.well_known();
        let wrapper_owner = self.runtime.singleton_owner(well_known.backtracie);
        let primitive_owner = self.runtime.singleton_owner(well_known.backtracie_primitive);
        let wrapper = MethodDef::new(wrapper_owner, "caller_locations", 31).in_file("lib/backtracie.rb");

        self.call(&wrapper, Value::Module(well_known.backtracie), |cx| {
            cx.native(
                Value::Module(well_known.backtracie_primitive),
                primitive_owner,
                "caller_locations",
                |cx| cx.runtime.backtracer().caller_locations(),
            )
        })
    }

    /// `Backtracie.backtrace_locations(target)`: a native entry point.
    pub fn backtracie_backtrace_locations(
        &self,
        target: &Value,
    ) -> Result<Option<Backtrace>, BacktraceError> {
        let backtracie = self.runtime.well_known().backtracie;
        let owner = self.runtime.singleton_owner(backtracie);
        self.native(
            Value::Module(backtracie),
            owner,
            "backtrace_locations",
            |cx| cx.runtime.backtracer().backtrace_locations(target),
        )
    }

    /// Stock `Kernel#caller_locations(start)`.
    ///
    /// With `start == 0` the first entry is the frame making the call.
    pub fn stock_caller_locations(&self, start: usize) -> Vec<StockLocation> {
        let kernel = self.runtime.well_known().kernel;
        self.native(self.self_value(), kernel, "caller_locations", |cx| {
            super::stock::stock_locations(&cx.context)
                .unwrap_or_default()
                .into_iter()
                .skip(1 + start)
                .collect()
        })
    }

    /// Stock `Thread#backtrace_locations`, called on `target`.
    pub fn stock_backtrace_locations(
        &self,
        target: &Value,
    ) -> Result<Option<Vec<StockLocation>>, BacktraceError> {
        let thread = self.runtime.well_known().thread;
        self.runtime.thread_context(target)?;
        self.native(target.clone(), thread, "backtrace_locations", |cx| {
            cx.runtime.stock_backtrace_locations(target)
        })
    }
}
