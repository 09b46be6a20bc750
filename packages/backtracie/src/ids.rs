//! Identifier types for the reference host.
//!
//! All IDs are lightweight Copy newtypes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a heap object (including thread objects).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ObjectId(pub u64);

/// Index of a class or module in the host's type table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ModuleId(pub u32);

static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    /// Create a fresh unique ObjectId.
    pub fn fresh() -> Self {
        ObjectId(OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl ModuleId {
    pub fn from_index(index: usize) -> Self {
        ModuleId(u32::try_from(index).expect("type table overflow"))
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}
