//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Emitters, receivers and the actors that own receivers each get their own
//! ID type so a receiver handle can never be passed where an emitter is
//! expected. Level data assigns stable IDs so a reloaded emitter finds its
//! saved record again; `new()` exists for runtime spawning and tests.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            TS,
        )]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a pulse emitter (source node).
    EmitterId
}

define_id! {
    /// Unique identifier for a pulse receiver (sink node).
    ReceiverId
}

define_id! {
    /// Unique identifier for an actor: the owner of a receiver, or the
    /// party engaging an emitter.
    ActorId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = EmitterId::new();
        let b = EmitterId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_roundtrips_through_uuid() {
        let uuid = Uuid::now_v7();
        let id = ActorId::from(uuid);
        let back: Uuid = id.into();
        assert_eq!(uuid, back);
        assert_eq!(id.to_string(), uuid.to_string());
    }
}
