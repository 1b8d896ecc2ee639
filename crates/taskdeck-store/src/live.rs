use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use taskdeck_core::{
    QueryEvent, SubscriptionErrorInfo, SubscriptionGuard, SubscriptionId, TaskError,
    TaskSubscription, UserId,
};

use crate::database::Database;
use crate::error::StoreError;
use crate::tasks::TaskRepo;

/// Registry of live task queries.
///
/// Each subscription is keyed by id and scoped to one owner. After
/// every committed mutation the hub re-runs the owner's query and
/// pushes the full result set — snapshots fully supersede each other,
/// so subscribers never merge. Dropping a subscription's guard
/// deregisters it.
pub struct LiveQueryHub {
    repo: TaskRepo,
    subs: DashMap<SubscriptionId, OwnerQuery>,
}

struct OwnerQuery {
    owner: UserId,
    tx: mpsc::UnboundedSender<QueryEvent>,
}

impl LiveQueryHub {
    pub fn new(db: Database) -> Self {
        Self {
            repo: TaskRepo::new(db),
            subs: DashMap::new(),
        }
    }

    /// Register a live query for an owner. The initial snapshot is
    /// delivered before this returns; subsequent snapshots follow each
    /// committed change.
    pub fn register(self: &Arc<Self>, owner: &UserId) -> Result<TaskSubscription, StoreError> {
        let initial = self.repo.list_for_owner(owner)?;

        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive here, this cannot fail.
        let _ = tx.send(QueryEvent::Snapshot { tasks: initial });

        self.subs.insert(
            id.clone(),
            OwnerQuery {
                owner: owner.clone(),
                tx,
            },
        );
        debug!(subscription_id = %id, user_id = %owner, "live query registered");

        let hub = Arc::clone(self);
        let guard_id = id.clone();
        let guard = SubscriptionGuard::new(move || hub.release(&guard_id));

        Ok(TaskSubscription::new(rx, guard))
    }

    /// Re-run and deliver the query for every subscription scoped to
    /// this owner. A failed re-query terminates the affected
    /// subscriptions with an in-stream error.
    pub fn notify_owner(&self, owner: &UserId) {
        let mut stale: Vec<SubscriptionId> = Vec::new();

        for entry in self.subs.iter() {
            if &entry.value().owner != owner {
                continue;
            }

            let event = match self.repo.list_for_owner(owner) {
                Ok(tasks) => QueryEvent::Snapshot { tasks },
                Err(e) => {
                    warn!(user_id = %owner, error = %e, "live query re-run failed");
                    let err = TaskError::Subscription(e.to_string());
                    QueryEvent::Error {
                        error: SubscriptionErrorInfo::from(&err),
                    }
                }
            };
            let terminal = event.is_terminal();

            if entry.value().tx.send(event).is_err() || terminal {
                stale.push(entry.key().clone());
            }
        }

        for id in stale {
            self.release(&id);
        }
    }

    fn release(&self, id: &SubscriptionId) {
        if self.subs.remove(id).is_some() {
            debug!(subscription_id = %id, "live query released");
        }
    }

    /// Number of registered live queries.
    pub fn active(&self) -> usize {
        self.subs.len()
    }
}
