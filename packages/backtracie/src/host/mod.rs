//! In-process reference host runtime.
//!
//! Models the parts of a dynamic language runtime that frame naming depends
//! on: classes and modules (named, anonymous, singleton, refinement), a main
//! object, and thread objects whose stacks run on real OS threads. Call stacks
//! are scripted through [`Script`]; the host implements [`FrameSource`] and
//! also offers the stock path/line/label backtrace API for comparison.

mod context;
mod heap;
mod stock;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::capture::{Backtracer, FrameSource};
use crate::config::Capabilities;
use crate::error::BacktraceError;
use crate::frame::{ModuleKind, RawFrame, TypeIdentity};
use crate::ids::{ModuleId, ObjectId};

pub use context::{DefinedMethod, ExecutionContext, HostThread, MethodDef, Proc, Script, EVAL_PATH};
pub use heap::WellKnown;
pub use stock::StockLocation;

use context::{effective_locations, HostFrame};
use heap::Heap;

/// Directory relative source paths are resolved against.
pub const DEFAULT_ROOT: &str = "/srv/app";

/// A host value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    /// The top-level main object.
    Main,
    Symbol(String),
    Integer(i64),
    Object(ObjectId),
    /// A class or module object.
    Module(ModuleId),
}

#[derive(Debug)]
struct RuntimeInner {
    heap: RwLock<Heap>,
    contexts: Mutex<HashMap<ObjectId, Arc<ExecutionContext>>>,
    main_thread: Mutex<Option<ObjectId>>,
    capabilities: Capabilities,
    root: String,
}

/// Handle to a reference host. Cheap to clone; clones share state.
///
/// Contexts of finished threads stay registered for the life of the runtime,
/// so their thread objects keep answering with no backtrace. Terminating a
/// context drops its frames; only the empty context remains.
#[derive(Debug, Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// A host with the process-wide capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::global())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Runtime {
            inner: Arc::new(RuntimeInner {
                heap: RwLock::new(Heap::new()),
                contexts: Mutex::new(HashMap::new()),
                main_thread: Mutex::new(None),
                capabilities,
                root: DEFAULT_ROOT.to_string(),
            }),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    pub(crate) fn heap(&self) -> RwLockReadGuard<'_, Heap> {
        self.inner.heap.read().expect("heap lock poisoned")
    }

    fn heap_mut(&self) -> RwLockWriteGuard<'_, Heap> {
        self.inner.heap.write().expect("heap lock poisoned")
    }

    fn contexts(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectId, Arc<ExecutionContext>>> {
        self.inner.contexts.lock().expect("context registry lock poisoned")
    }

    pub fn well_known(&self) -> WellKnown {
        self.heap().well_known()
    }

    pub fn define_class(&self, name: &str, superclass: ModuleId) -> ModuleId {
        self.heap_mut()
            .define(ModuleKind::Class, Some(name), Some(superclass))
    }

    pub fn define_module(&self, name: &str) -> ModuleId {
        self.heap_mut().define(ModuleKind::Module, Some(name), None)
    }

    /// `Class.new(superclass)`.
    pub fn anonymous_class(&self, superclass: ModuleId) -> ModuleId {
        self.heap_mut()
            .define(ModuleKind::Class, None, Some(superclass))
    }

    /// `Module.new`.
    pub fn anonymous_module(&self) -> ModuleId {
        self.heap_mut().define(ModuleKind::Module, None, None)
    }

    /// `refine refined do ... end` inside `defined_at`; returns the refinement module.
    pub fn refine(&self, refined: ModuleId, defined_at: ModuleId) -> ModuleId {
        self.heap_mut().refine(refined, defined_at)
    }

    pub fn new_object(&self, class: ModuleId) -> Value {
        Value::Object(self.heap_mut().allocate(class))
    }

    /// Singleton class of `value`, materializing it if needed. `None` for immediates.
    pub fn singleton_class(&self, value: &Value) -> Option<ModuleId> {
        self.heap_mut().singleton_class(value)
    }

    /// Singleton class of a class or module object.
    pub fn singleton_owner(&self, module: ModuleId) -> ModuleId {
        let mut heap = self.heap_mut();
        match heap.singleton_class(&Value::Module(module)) {
            Some(singleton) => singleton,
            // Class and module objects always get one.
            None => module,
        }
    }

    pub fn class_of(&self, value: &Value) -> ModuleId {
        self.heap().class_of(value)
    }

    pub fn identity(&self, module: ModuleId) -> TypeIdentity {
        self.heap().identity(module)
    }

    pub fn inspect(&self, value: &Value) -> String {
        self.heap().inspect(value)
    }

    /// The thread object that ran `run_main`, if any.
    pub fn main_thread(&self) -> Option<Value> {
        self.inner
            .main_thread
            .lock()
            .expect("main thread lock poisoned")
            .map(Value::Object)
    }

    pub(crate) fn absolute_path(&self, path: &str) -> Option<String> {
        if path == EVAL_PATH {
            None
        } else if path.starts_with('/') {
            Some(path.to_string())
        } else {
            Some(format!("{}/{}", self.inner.root, path))
        }
    }

    pub fn backtracer(&self) -> Backtracer<Runtime> {
        Backtracer::new(self.clone())
    }

    fn register_thread(&self, class: ModuleId) -> (ObjectId, Arc<ExecutionContext>) {
        let thread = self.heap_mut().allocate(class);
        let context = Arc::new(ExecutionContext::new(thread));
        self.contexts().insert(thread, context.clone());
        log::debug!("registered thread {}", thread.raw());
        (thread, context)
    }

    /// Run top-level code of `path` as the main thread on the calling OS thread.
    pub fn run_main<R>(&self, path: &str, f: impl FnOnce(&Script) -> R) -> R {
        let thread_class = self.well_known().thread;
        let (thread, context) = self.register_thread(thread_class);
        *self
            .inner
            .main_thread
            .lock()
            .expect("main thread lock poisoned") = Some(thread);

        context
            .lock_state()
            .frames
            .push(Script::top_level_frame(path, self.absolute_path(path)));
        Script::run_attached(self.clone(), context, f)
    }

    pub(crate) fn spawn_with_root<R, F>(
        &self,
        class: Option<ModuleId>,
        root: HostFrame,
        f: F,
    ) -> HostThread<R>
    where
        R: Send + 'static,
        F: FnOnce(&Script) -> R + Send + 'static,
    {
        let class = class.unwrap_or_else(|| self.well_known().thread);
        let (thread, context) = self.register_thread(class);
        // The root frame is in place before the thread can be observed.
        context.lock_state().frames.push(root);

        let runtime = self.clone();
        let handle = std::thread::spawn(move || Script::run_attached(runtime, context, f));
        HostThread::new(Value::Object(thread), handle)
    }

    pub(crate) fn spawn_native_thread<R, F>(&self, entry: &str, f: F) -> HostThread<R>
    where
        R: Send + 'static,
        F: FnOnce(&Script) -> R + Send + 'static,
    {
        let class = self.well_known().thread;
        let (thread, context) = self.register_thread(class);
        context
            .lock_state()
            .frames
            .push(Script::native_frame(class, entry, Value::Object(thread)));

        let runtime = self.clone();
        let handle = std::thread::spawn(move || Script::run_attached(runtime, context, f));
        HostThread::new(Value::Object(thread), handle)
    }

    /// Context of a thread object (or an object of a `Thread` subclass).
    pub fn thread_context(&self, value: &Value) -> Result<Arc<ExecutionContext>, BacktraceError> {
        self.execution_context_of(value)
            .ok_or_else(|| BacktraceError::invalid_argument(self.inspect(value)))
    }

    /// Stock `Thread#backtrace_locations`, called from outside any script.
    pub fn stock_backtrace_locations(
        &self,
        target: &Value,
    ) -> Result<Option<Vec<StockLocation>>, BacktraceError> {
        let context = self.thread_context(target)?;
        Ok(stock::stock_locations(&context))
    }
}

impl Runtime {
    /// Raw frames of `context`, leaf first, without its `skipped` leaf-most
    /// frames. Skipping happens before native frames are hidden.
    fn walk(&self, context: &ExecutionContext, skipped: usize) -> Option<Vec<RawFrame>> {
        let capabilities = self.inner.capabilities;
        // The stack stays locked for the whole walk.
        let state = context.lock_state();
        if !state.alive {
            return None;
        }
        let heap = self.heap();

        let kept = state.frames.len().saturating_sub(skipped);
        let locations = effective_locations(&state.frames);
        let mut frames: Vec<RawFrame> = state
            .frames
            .iter()
            .zip(locations)
            .take(kept)
            .filter(|(frame, _)| capabilities.native_frames || !frame.is_native())
            .map(|(frame, location)| frame.to_raw(&heap, capabilities, location))
            .collect();
        frames.reverse();
        Some(frames)
    }
}

impl FrameSource for Runtime {
    type Context = Arc<ExecutionContext>;
    type Value = Value;

    fn current_context(&self) -> Option<Arc<ExecutionContext>> {
        context::current_context()
    }

    fn execution_context_of(&self, value: &Value) -> Option<Arc<ExecutionContext>> {
        let Value::Object(id) = value else {
            return None;
        };
        let is_thread = {
            let heap = self.heap();
            heap.inherits(heap.class_of(value), heap.well_known().thread)
        };
        if !is_thread {
            return None;
        }
        // A thread object that never ran has no stack, like a finished one.
        let context = self
            .contexts()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::new(ExecutionContext::unstarted(*id)));
        Some(context)
    }

    fn describe_value(&self, value: &Value) -> String {
        self.inspect(value)
    }

    fn enumerate_frames(&self, context: &Arc<ExecutionContext>) -> Option<Vec<RawFrame>> {
        self.walk(context, 0)
    }

    fn enumerate_frames_below(
        &self,
        context: &Arc<ExecutionContext>,
        skipped: usize,
    ) -> Option<Vec<RawFrame>> {
        self.walk(context, skipped)
    }

    fn frame_count(&self, context: &Arc<ExecutionContext>) -> usize {
        let capabilities = self.inner.capabilities;
        let state = context.lock_state();
        if !state.alive {
            return 0;
        }
        state
            .frames
            .iter()
            .filter(|frame| capabilities.native_frames || !frame.is_native())
            .count()
    }
}
