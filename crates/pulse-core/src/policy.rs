//! Engage policies: who may engage an emitter.
//!
//! Every emitter carries one policy. The mode decides *whether* the emitter
//! is engageable right now; the policy decides whether *this actor* may do
//! it. Both must agree for an engagement to go through.

use std::collections::BTreeSet;

use pulse_types::{ActorId, EmitterId};

/// Capability check consulted by `try_engage` after the mode guard passes.
pub trait EngagePolicy: core::fmt::Debug {
    /// Whether `actor` may engage `emitter`.
    fn can_be_engaged_by(&self, emitter: EmitterId, actor: ActorId) -> bool;
}

/// Lets anyone engage. The default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl EngagePolicy for AllowAll {
    fn can_be_engaged_by(&self, _emitter: EmitterId, _actor: ActorId) -> bool {
        true
    }
}

/// Restricts engagement to a fixed set of actors.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    actors: BTreeSet<ActorId>,
}

impl AllowList {
    /// Create a policy allowing exactly `actors`.
    pub fn new(actors: impl IntoIterator<Item = ActorId>) -> Self {
        Self {
            actors: actors.into_iter().collect(),
        }
    }
}

impl EngagePolicy for AllowList {
    fn can_be_engaged_by(&self, _emitter: EmitterId, actor: ActorId) -> bool {
        self.actors.contains(&actor)
    }
}
