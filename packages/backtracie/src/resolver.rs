//! Qualified-name and label synthesis.
//!
//! ```text
//! qualified_method_name := owner_part? divider? unit_part block_suffix?
//! ```
//!
//! `unit_part` is the method name, `{class exec}` / `{module exec}` for type
//! bodies, or nothing for free blocks and evals. `{block}` is appended once for
//! any nested frame, however deep.

use crate::classifier::{classify, NamingContext};
use crate::frame::{CodeUnitKind, ModuleKind, RawFrame};
use crate::frame_debug_log;
use crate::location::{normalize, FrameDebug, Location};

pub const BLOCK_SUFFIX: &str = "{block}";
pub const CLASS_EXEC: &str = "{class exec}";
pub const MODULE_EXEC: &str = "{module exec}";
pub const MAIN_UNIT: &str = "<main>";
/// Fixed name of blocks and evals nested directly in top-level code.
pub const MAIN_BLOCK: &str = "Object$<main>#{block}";

/// Qualified name of a frame.
pub fn qualified_method_name(frame: &RawFrame) -> String {
    qualified_name_in(frame, &classify(frame))
}

/// Qualified name of a frame already classified as `context`.
pub fn qualified_name_in(frame: &RawFrame, context: &NamingContext) -> String {
    let Some(owner) = context.owner_display() else {
        return main_object_name(frame);
    };

    let mut name = owner;
    name.push_str(context.divider());
    name.push_str(&unit_part(frame));
    if frame.is_nested() {
        name.push_str(BLOCK_SUFFIX);
    }
    name
}

fn main_object_name(frame: &RawFrame) -> String {
    if frame.is_nested() {
        return MAIN_BLOCK.to_string();
    }
    match frame.code_unit_kind {
        CodeUnitKind::TopLevelBody => MAIN_UNIT.to_string(),
        _ => format!("Object$<main>#{}", frame.method_or_unit_name),
    }
}

fn unit_part(frame: &RawFrame) -> String {
    match frame.code_unit_kind {
        CodeUnitKind::OrdinaryMethod | CodeUnitKind::NativeCallIn | CodeUnitKind::TopLevelBody => {
            frame.method_or_unit_name.clone()
        }
        CodeUnitKind::ClassOrModuleBody => match body_kind(frame) {
            ModuleKind::Class => CLASS_EXEC.to_string(),
            ModuleKind::Module => MODULE_EXEC.to_string(),
        },
        CodeUnitKind::Block | CodeUnitKind::EvalBody => String::new(),
    }
}

/// Kind of the type whose body is executing: the receiver when known, else the owner.
fn body_kind(frame: &RawFrame) -> ModuleKind {
    frame
        .receiver
        .as_ref()
        .or_else(|| frame.owner.as_ref().map(|owner| &owner.identity))
        .map_or(ModuleKind::Module, |identity| identity.kind)
}

/// `(label, base_label)` of a frame, preferring what the host reported.
pub fn labels(frame: &RawFrame) -> (String, String) {
    if let Some(label) = &frame.label {
        return (label.label.clone(), label.base_label.clone());
    }

    let base = frame.method_or_unit_name.clone();
    let label = match frame.nesting_depth {
        0 => base.clone(),
        1 => format!("block in {base}"),
        levels => format!("block ({levels} levels) in {base}"),
    };
    (label, base)
}

/// Resolve one raw frame into a `Location`.
pub fn resolve_frame(frame: &RawFrame) -> Location {
    let context = classify(frame);
    let qualified_method_name = qualified_name_in(frame, &context);
    let (label, base_label) = labels(frame);
    frame_debug_log!(
        "resolved {} frame `{}` as {} -> {}",
        frame.code_unit_kind.as_str(),
        frame.method_or_unit_name,
        context.tag(),
        qualified_method_name
    );

    Location::new(
        normalize(frame.location.as_ref()),
        label,
        base_label,
        qualified_method_name,
        FrameDebug {
            native: frame.is_native,
            self_kind: frame.self_kind,
            code_unit_kind: frame.code_unit_kind,
            nesting_depth: frame.nesting_depth,
            naming_context: context.tag().to_string(),
        },
    )
}
