//! Frame classification.
//!
//! Every frame is put into exactly one `NamingContext`. The rules are checked
//! in a fixed order and the first match wins:
//!
//! 1. main object: no owner and the receiver is the top-level main object
//! 2. refinement: the owner is a refinement namespace
//! 3. type level: the receiver is a class or module object
//! 4. singleton: the owner is a singleton container of a regular object
//! 5. instance: everything else
//!
//! Owners without a printable name are rendered through the anonymous
//! placeholder (`<base>$anonymous`) in whichever context they end up.

use crate::frame::{RawFrame, SelfKind, TypeIdentity};

pub const ANONYMOUS_SUFFIX: &str = "$anonymous";
pub const SINGLETON_SUFFIX: &str = "$singleton";
pub const REFINEMENT_SEPARATOR: &str = "$refinement@";

/// How a frame's owner is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingContext {
    /// Top-level code running against the main object.
    MainObject,
    /// Method defined inside a refinement of `refined`, declared in `declared_in`.
    Refinement { refined: String, declared_in: String },
    /// Code whose receiver is the class or module object itself.
    TypeLevel { receiver: String },
    /// Method living in the singleton container of a regular object.
    Singleton { host: String },
    /// Ordinary instance-style dispatch.
    Instance { owner: String },
}

impl NamingContext {
    pub fn tag(&self) -> &'static str {
        match self {
            NamingContext::MainObject => "main_object",
            NamingContext::Refinement { .. } => "refinement",
            NamingContext::TypeLevel { .. } => "type_level",
            NamingContext::Singleton { .. } => "singleton",
            NamingContext::Instance { .. } => "instance",
        }
    }

    /// Divider placed between the owner part and the unit name.
    pub fn divider(&self) -> &'static str {
        match self {
            NamingContext::TypeLevel { .. } => ".",
            _ => "#",
        }
    }

    /// Owner part of the qualified name; `None` for the main object.
    pub fn owner_display(&self) -> Option<String> {
        match self {
            NamingContext::MainObject => None,
            NamingContext::Refinement {
                refined,
                declared_in,
            } => Some(format!("{refined}{REFINEMENT_SEPARATOR}{declared_in}")),
            NamingContext::TypeLevel { receiver } => Some(receiver.clone()),
            NamingContext::Singleton { host } => Some(format!("{host}{SINGLETON_SUFFIX}")),
            NamingContext::Instance { owner } => Some(owner.clone()),
        }
    }
}

/// Decide the naming context of a frame.
pub fn classify(frame: &RawFrame) -> NamingContext {
    let owner = frame.owner.as_ref();

    if owner.is_none() && frame.self_kind == SelfKind::MainObject {
        return NamingContext::MainObject;
    }

    if let Some(refinement) = owner.and_then(|owner| owner.refinement.as_ref()) {
        return NamingContext::Refinement {
            refined: type_display_name(&refinement.refined),
            declared_in: type_display_name(&refinement.declared_in),
        };
    }

    if frame.self_kind == SelfKind::ClassOrModuleObject {
        // A singleton owner with a type receiver is a method defined on the type
        // object (def self.x, module_function): name it by the receiver.
        let receiver = frame
            .receiver
            .as_ref()
            .or_else(|| owner.map(|owner| &owner.identity));
        return NamingContext::TypeLevel {
            receiver: receiver.map_or_else(anonymous_placeholder, type_display_name),
        };
    }

    if let Some(owner) = owner {
        if let Some(host) = owner.identity.singleton_of.as_deref() {
            return NamingContext::Singleton {
                host: type_display_name(host),
            };
        }
        return NamingContext::Instance {
            owner: type_display_name(&owner.identity),
        };
    }

    // No owner and a non-main receiver: nothing to name it by.
    log::warn!(
        "frame `{}` has no owner and a {} receiver; using the anonymous placeholder",
        frame.method_or_unit_name,
        frame.self_kind.as_str()
    );
    NamingContext::Instance {
        owner: anonymous_placeholder(),
    }
}

/// Printable name of a class or module identity.
pub fn type_display_name(identity: &TypeIdentity) -> String {
    if let Some(host) = identity.singleton_of.as_deref() {
        return format!("{}{SINGLETON_SUFFIX}", type_display_name(host));
    }

    match identity.name.as_deref() {
        Some(name) if !identity.anonymous && !name.is_empty() => name.to_string(),
        _ => {
            if !identity.anonymous {
                log::warn!("type identity without a name is not flagged anonymous");
            }
            format!(
                "{}{ANONYMOUS_SUFFIX}",
                identity.base_name.as_deref().unwrap_or_default()
            )
        }
    }
}

fn anonymous_placeholder() -> String {
    ANONYMOUS_SUFFIX.to_string()
}
