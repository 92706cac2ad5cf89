//! Entity identifiers.
//!
//! Every identifier carries the [`EngineId`] of the engine that created it,
//! so mixing entities across engine instances is detected instead of
//! silently indexing the wrong tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ENGINE: AtomicU64 = AtomicU64::new(1);

/// Identity of one engine instance. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineId(u64);

impl EngineId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ENGINE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name {
            engine: EngineId,
            index: u32,
        }

        impl $name {
            pub(crate) fn new(engine: EngineId, index: u32) -> Self {
                Self { engine, index }
            }

            /// Engine that created this entity.
            pub fn engine(&self) -> EngineId {
                self.engine
            }

            /// Per-engine index, allocated monotonically.
            pub fn index(&self) -> u32 {
                self.index
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}@{}"), self.index, self.engine.0)
            }
        }
    };
}

entity_id!(
    /// Handle to a [`Body`](crate::Body).
    BodyId,
    "body"
);
entity_id!(
    /// Handle to a [`Joint`](crate::Joint).
    JointId,
    "joint"
);
entity_id!(
    /// Handle to a [`Shape`](crate::Shape).
    ShapeId,
    "shape"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_ids_are_unique() {
        let a = EngineId::next();
        let b = EngineId::next();
        assert_ne!(a, b);
        assert_ne!(BodyId::new(a, 0), BodyId::new(b, 0));
    }

    #[test]
    fn test_display() {
        let e = EngineId(7);
        assert_eq!(JointId::new(e, 3).to_string(), "joint#3@7");
    }
}
