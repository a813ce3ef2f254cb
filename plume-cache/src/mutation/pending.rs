use plume_core::{MutationId, Post, Timestamp};
use serde::Serialize;

use super::MutationKind;
use crate::query::QueryIdentity;
use crate::value::CacheValue;

/// How a mutation settled. While in flight it is a [`PendingMutation`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Succeeded,
    Failed,
}

/// A non-target identity that received a propagated item patch, with the item
/// as it stood before.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PropagatedItem {
    pub(crate) identity: QueryIdentity,
    pub(crate) before: Post,
}

/// A mutation between `execute` and the end of its settlement. It leaves the
/// registry as soon as it settles.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: MutationId,
    pub kind: MutationKind,
    pub targets: Vec<QueryIdentity>,
    /// Per target, the value when the mutation started.
    pub snapshots: Vec<Option<CacheValue>>,
    /// Per target, the provisional value written (`None` if nothing was written).
    pub optimistic: Vec<Option<CacheValue>>,
    pub started_at: Timestamp,
    pub(crate) propagated: Vec<PropagatedItem>,
}

impl PendingMutation {
    /// Snapshot taken for `identity`, if it is a target.
    pub fn snapshot_for(&self, identity: &QueryIdentity) -> Option<&CacheValue> {
        let index = self.targets.iter().position(|t| t == identity)?;
        self.snapshots.get(index)?.as_ref()
    }

    /// Identities outside the targets that had the item patched.
    pub fn propagated_to(&self) -> impl Iterator<Item = &QueryIdentity> {
        self.propagated.iter().map(|item| &item.identity)
    }
}
