//! Raw frame descriptors handed over by a frame source.
//!
//! A `RawFrame` is a point-in-time description of one activation record. It owns
//! every piece of naming data the classifier needs, so it can be resolved long
//! after the host has moved on (see `RawBacktrace`).

use serde::{Deserialize, Serialize};

/// The unit of code a frame belongs to.
///
/// Blocks nested inside a method report the method's kind together with a
/// non-zero `nesting_depth`. `Block` and `EvalBody` are reserved for blocks and
/// eval bodies that have no enclosing method entry and whose receiver is neither
/// a type nor the main object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeUnitKind {
    OrdinaryMethod,
    Block,
    EvalBody,
    ClassOrModuleBody,
    TopLevelBody,
    NativeCallIn,
}

impl CodeUnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeUnitKind::OrdinaryMethod => "ordinary_method",
            CodeUnitKind::Block => "block",
            CodeUnitKind::EvalBody => "eval_body",
            CodeUnitKind::ClassOrModuleBody => "class_or_module_body",
            CodeUnitKind::TopLevelBody => "top_level_body",
            CodeUnitKind::NativeCallIn => "native_call_in",
        }
    }
}

/// What the frame's receiver is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfKind {
    RegularObject,
    ClassOrModuleObject,
    MainObject,
}

impl SelfKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SelfKind::RegularObject => "regular_object",
            SelfKind::ClassOrModuleObject => "class_or_module_object",
            SelfKind::MainObject => "main_object",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Class,
    Module,
}

/// Snapshot of a class or module's printable identity.
///
/// For singleton containers `singleton_of` holds the identity of the host the
/// container is attached to: the attached type itself for singleton classes of
/// classes and modules, or the object's real class otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeIdentity {
    pub kind: ModuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
    /// Nearest named type to report an anonymous type by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singleton_of: Option<Box<TypeIdentity>>,
}

impl TypeIdentity {
    pub fn named(kind: ModuleKind, name: impl Into<String>) -> Self {
        TypeIdentity {
            kind,
            name: Some(name.into()),
            anonymous: false,
            base_name: None,
            singleton_of: None,
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::named(ModuleKind::Class, name)
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self::named(ModuleKind::Module, name)
    }

    pub fn anonymous(kind: ModuleKind, base_name: Option<String>) -> Self {
        TypeIdentity {
            kind,
            name: None,
            anonymous: true,
            base_name,
            singleton_of: None,
        }
    }

    pub fn singleton(host: TypeIdentity) -> Self {
        TypeIdentity {
            kind: ModuleKind::Class,
            name: None,
            anonymous: false,
            base_name: None,
            singleton_of: Some(Box::new(host)),
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton_of.is_some()
    }

    pub fn is_anonymous(&self) -> bool {
        !self.is_singleton() && (self.anonymous || self.name.is_none())
    }
}

/// Refinement metadata for an owner that is a refinement namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementInfo {
    pub refined: TypeIdentity,
    pub declared_in: TypeIdentity,
}

/// The class or module owning a frame's code unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub identity: TypeIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementInfo>,
}

impl OwnerRef {
    pub fn new(identity: TypeIdentity) -> Self {
        OwnerRef {
            identity,
            refinement: None,
        }
    }

    pub fn refinement(identity: TypeIdentity, refined: TypeIdentity, declared_in: TypeIdentity) -> Self {
        OwnerRef {
            identity,
            refinement: Some(RefinementInfo {
                refined,
                declared_in,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_path: Option<String>,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>, absolute_path: Option<String>, line: u32) -> Self {
        SourceLocation {
            path: path.into(),
            absolute_path,
            line,
        }
    }
}

/// Label pair as reported by the host's own backtrace API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLabel {
    pub label: String,
    pub base_label: String,
}

/// One frame as enumerated by a `FrameSource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    pub code_unit_kind: CodeUnitKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    pub self_kind: SelfKind,
    /// Receiver identity, present when `self_kind` is `ClassOrModuleObject`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<TypeIdentity>,
    #[serde(default)]
    pub nesting_depth: u32,
    pub method_or_unit_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<FrameLabel>,
    #[serde(default)]
    pub is_native: bool,
}

impl RawFrame {
    pub fn new(code_unit_kind: CodeUnitKind, self_kind: SelfKind, name: impl Into<String>) -> Self {
        RawFrame {
            code_unit_kind,
            owner: None,
            self_kind,
            receiver: None,
            nesting_depth: 0,
            method_or_unit_name: name.into(),
            location: None,
            label: None,
            is_native: code_unit_kind == CodeUnitKind::NativeCallIn,
        }
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_receiver(mut self, receiver: TypeIdentity) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn with_nesting_depth(mut self, depth: u32) -> Self {
        self.nesting_depth = depth;
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>, base_label: impl Into<String>) -> Self {
        self.label = Some(FrameLabel {
            label: label.into(),
            base_label: base_label.into(),
        });
        self
    }

    pub fn owner_is_singleton(&self) -> bool {
        self.owner
            .as_ref()
            .map_or(false, |owner| owner.identity.is_singleton())
    }

    pub fn owner_is_refinement(&self) -> bool {
        self.owner
            .as_ref()
            .map_or(false, |owner| owner.refinement.is_some())
    }

    pub fn owner_is_anonymous(&self) -> bool {
        self.owner
            .as_ref()
            .map_or(false, |owner| owner.identity.is_anonymous())
    }

    /// Whether the frame gets the `{block}` suffix.
    pub fn is_nested(&self) -> bool {
        self.nesting_depth >= 1
            || matches!(
                self.code_unit_kind,
                CodeUnitKind::Block | CodeUnitKind::EvalBody
            )
    }
}
