//! Type table and object heap of the reference host.

use std::collections::HashMap;

use crate::config::Capabilities;
use crate::frame::{ModuleKind, OwnerRef, SelfKind, TypeIdentity};
use crate::ids::{ModuleId, ObjectId};

use super::Value;

#[derive(Debug, Clone)]
struct ModuleRecord {
    kind: ModuleKind,
    name: Option<String>,
    superclass: Option<ModuleId>,
    /// Set for singleton classes. Looked up by id, never owned.
    attached: Option<Value>,
    /// Singleton class of this type, created on first request.
    singleton: Option<ModuleId>,
    refinement: Option<Refinement>,
}

#[derive(Debug, Clone, Copy)]
struct Refinement {
    refined: ModuleId,
    defined_at: ModuleId,
}

#[derive(Debug, Clone, Copy)]
struct ObjectRecord {
    class: ModuleId,
    singleton: Option<ModuleId>,
}

/// Types every host starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnown {
    pub basic_object: ModuleId,
    pub object: ModuleId,
    pub module: ModuleId,
    pub class: ModuleId,
    pub kernel: ModuleId,
    pub nil_class: ModuleId,
    pub symbol: ModuleId,
    pub integer: ModuleId,
    pub array: ModuleId,
    pub proc_class: ModuleId,
    pub thread: ModuleId,
    pub backtracie: ModuleId,
    pub backtracie_primitive: ModuleId,
}

impl WellKnown {
    fn placeholder() -> Self {
        let id = ModuleId(0);
        WellKnown {
            basic_object: id,
            object: id,
            module: id,
            class: id,
            kernel: id,
            nil_class: id,
            symbol: id,
            integer: id,
            array: id,
            proc_class: id,
            thread: id,
            backtracie: id,
            backtracie_primitive: id,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Heap {
    modules: Vec<ModuleRecord>,
    objects: HashMap<ObjectId, ObjectRecord>,
    main_singleton: Option<ModuleId>,
    well_known: WellKnown,
}

impl Heap {
    pub(crate) fn new() -> Self {
        let mut heap = Heap {
            modules: Vec::new(),
            objects: HashMap::new(),
            main_singleton: None,
            well_known: WellKnown::placeholder(),
        };

        let basic_object = heap.define(ModuleKind::Class, Some("BasicObject"), None);
        let object = heap.define(ModuleKind::Class, Some("Object"), Some(basic_object));
        let module = heap.define(ModuleKind::Class, Some("Module"), Some(object));
        let class = heap.define(ModuleKind::Class, Some("Class"), Some(module));
        let kernel = heap.define(ModuleKind::Module, Some("Kernel"), None);
        let nil_class = heap.define(ModuleKind::Class, Some("NilClass"), Some(object));
        let symbol = heap.define(ModuleKind::Class, Some("Symbol"), Some(object));
        let integer = heap.define(ModuleKind::Class, Some("Integer"), Some(object));
        let array = heap.define(ModuleKind::Class, Some("Array"), Some(object));
        let proc_class = heap.define(ModuleKind::Class, Some("Proc"), Some(object));
        let thread = heap.define(ModuleKind::Class, Some("Thread"), Some(object));
        let backtracie = heap.define(ModuleKind::Module, Some("Backtracie"), None);
        let backtracie_primitive =
            heap.define(ModuleKind::Module, Some("Backtracie::Primitive"), None);

        heap.well_known = WellKnown {
            basic_object,
            object,
            module,
            class,
            kernel,
            nil_class,
            symbol,
            integer,
            array,
            proc_class,
            thread,
            backtracie,
            backtracie_primitive,
        };
        heap
    }

    pub(crate) fn well_known(&self) -> WellKnown {
        self.well_known
    }

    pub(crate) fn define(
        &mut self,
        kind: ModuleKind,
        name: Option<&str>,
        superclass: Option<ModuleId>,
    ) -> ModuleId {
        let id = ModuleId::from_index(self.modules.len());
        self.modules.push(ModuleRecord {
            kind,
            name: name.map(str::to_string),
            superclass: match kind {
                ModuleKind::Class => superclass,
                ModuleKind::Module => None,
            },
            attached: None,
            singleton: None,
            refinement: None,
        });
        id
    }

    /// Anonymous module holding the methods of `refined` as refined inside `defined_at`.
    pub(crate) fn refine(&mut self, refined: ModuleId, defined_at: ModuleId) -> ModuleId {
        let id = self.define(ModuleKind::Module, None, None);
        self.modules[id.index()].refinement = Some(Refinement {
            refined,
            defined_at,
        });
        id
    }

    pub(crate) fn allocate(&mut self, class: ModuleId) -> ObjectId {
        let id = ObjectId::fresh();
        self.objects.insert(
            id,
            ObjectRecord {
                class,
                singleton: None,
            },
        );
        id
    }

    fn record(&self, id: ModuleId) -> &ModuleRecord {
        &self.modules[id.index()]
    }

    pub(crate) fn kind(&self, id: ModuleId) -> ModuleKind {
        self.record(id).kind
    }

    pub(crate) fn name(&self, id: ModuleId) -> Option<&str> {
        self.record(id).name.as_deref()
    }

    /// Class of a value, skipping any singleton class it may have.
    pub(crate) fn class_of(&self, value: &Value) -> ModuleId {
        match value {
            Value::Nil => self.well_known.nil_class,
            Value::Main => self.well_known.object,
            Value::Symbol(_) => self.well_known.symbol,
            Value::Integer(_) => self.well_known.integer,
            Value::Object(id) => self
                .objects
                .get(id)
                .map_or(self.well_known.object, |object| object.class),
            Value::Module(id) => match self.kind(*id) {
                ModuleKind::Class => self.well_known.class,
                ModuleKind::Module => self.well_known.module,
            },
        }
    }

    /// Whether `class` is `ancestor` or inherits from it.
    pub(crate) fn inherits(&self, class: ModuleId, ancestor: ModuleId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.record(id).superclass;
        }
        false
    }

    /// Singleton class of a value, materialized on first request.
    ///
    /// Immediates have none.
    pub(crate) fn singleton_class(&mut self, value: &Value) -> Option<ModuleId> {
        let existing = match value {
            Value::Nil | Value::Symbol(_) | Value::Integer(_) => return None,
            Value::Main => self.main_singleton,
            Value::Object(id) => self.objects.get(id)?.singleton,
            Value::Module(id) => self.record(*id).singleton,
        };
        if existing.is_some() {
            return existing;
        }

        let parent = match value {
            Value::Module(id) => self.record(*id).superclass,
            _ => None,
        };
        let superclass = match parent {
            Some(parent) => self.singleton_class(&Value::Module(parent)),
            None => Some(self.class_of(value)),
        };
        let singleton = self.define(ModuleKind::Class, None, superclass);
        self.modules[singleton.index()].attached = Some(value.clone());

        match value {
            Value::Main => self.main_singleton = Some(singleton),
            Value::Object(id) => {
                if let Some(object) = self.objects.get_mut(id) {
                    object.singleton = Some(singleton);
                }
            }
            Value::Module(id) => self.modules[id.index()].singleton = Some(singleton),
            Value::Nil | Value::Symbol(_) | Value::Integer(_) => {}
        }
        Some(singleton)
    }

    pub(crate) fn self_kind(&self, value: &Value) -> SelfKind {
        match value {
            Value::Main => SelfKind::MainObject,
            Value::Module(_) => SelfKind::ClassOrModuleObject,
            _ => SelfKind::RegularObject,
        }
    }

    /// Printable identity snapshot of a type.
    pub(crate) fn identity(&self, id: ModuleId) -> TypeIdentity {
        let record = self.record(id);
        if let Some(attached) = &record.attached {
            let host = match attached {
                Value::Module(host) => self.identity(*host),
                other => self.identity(self.class_of(other)),
            };
            return TypeIdentity::singleton(host);
        }

        match &record.name {
            Some(name) => TypeIdentity::named(record.kind, name.clone()),
            None => TypeIdentity::anonymous(record.kind, self.anonymous_base(id)),
        }
    }

    /// Nearest named type an anonymous type is reported by.
    fn anonymous_base(&self, id: ModuleId) -> Option<String> {
        if self.kind(id) == ModuleKind::Module {
            return Some("Module".to_string());
        }
        let mut current = self.record(id).superclass;
        while let Some(parent) = current {
            let record = self.record(parent);
            if record.attached.is_none() {
                if let Some(name) = &record.name {
                    return Some(name.clone());
                }
            }
            current = record.superclass;
        }
        None
    }

    pub(crate) fn owner_ref(&self, id: ModuleId, capabilities: Capabilities) -> OwnerRef {
        let identity = self.identity(id);
        match self.record(id).refinement {
            Some(refinement) if capabilities.refinement_metadata => OwnerRef::refinement(
                identity,
                self.identity(refinement.refined),
                self.identity(refinement.defined_at),
            ),
            _ => OwnerRef::new(identity),
        }
    }

    /// Short printable form of a value, as the host's `inspect` would show it.
    pub(crate) fn inspect(&self, value: &Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Main => "main".to_string(),
            Value::Symbol(name) => format!(":{name}"),
            Value::Integer(number) => number.to_string(),
            Value::Object(id) => {
                let class = self.identity(self.class_of(value));
                format!(
                    "#<{}:{:#x}>",
                    crate::classifier::type_display_name(&class),
                    id.raw()
                )
            }
            Value::Module(id) => crate::classifier::type_display_name(&self.identity(*id)),
        }
    }
}
