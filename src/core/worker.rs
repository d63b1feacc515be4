//! Per-firewall reconciliation loop
//!
//! A [`ReconciliationWorker`] wakes up every poll interval and looks at its
//! firewall's entry in the [`RuleStore`]:
//!
//! - gone (or re-tracked under a new generation): stop
//! - clean: go back to sleep
//! - dirty: clear the flag, snapshot the rules, push the snapshot
//!
//! A failed push raises the dirty flag again so the next tick retries. The
//! loop only ends when the firewall is untracked.

use crate::audit::{self, AuditLog};
use crate::core::firewall::{FirewallId, Generation};
use crate::core::gateway::FirewallProvider;
use crate::core::store::{DirtyCheck, RuleStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default delay between two looks at the dirty flag
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Pushing,
    Stopped,
}

pub struct ReconciliationWorker {
    id: FirewallId,
    generation: Generation,
    store: Arc<RuleStore>,
    provider: Arc<dyn FirewallProvider>,
    poll_interval: Duration,
    audit: Option<Arc<AuditLog>>,
    state: WorkerState,
}

impl ReconciliationWorker {
    pub fn new(
        id: FirewallId,
        generation: Generation,
        store: Arc<RuleStore>,
        provider: Arc<dyn FirewallProvider>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            generation,
            store,
            provider,
            poll_interval,
            audit: None,
            state: WorkerState::Idle,
        }
    }

    pub fn with_audit(mut self, audit: Option<Arc<AuditLog>>) -> Self {
        self.audit = audit;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn id(&self) -> FirewallId {
        self.id
    }

    /// One pass of the loop body, without the sleep.
    pub async fn tick(&mut self) -> WorkerState {
        if self.state == WorkerState::Stopped {
            return self.state;
        }

        match self.store.take_dirty(self.id, self.generation) {
            DirtyCheck::Untracked => {
                self.state = WorkerState::Stopped;
            }
            DirtyCheck::Clean => {
                self.state = WorkerState::Idle;
            }
            DirtyCheck::Dirty(snapshot) => {
                self.state = WorkerState::Pushing;
                debug!(firewall = self.id, "Pushing local changes");

                let result = self.provider.push(self.id, &snapshot).await;
                let error = match result {
                    Ok(()) => None,
                    Err(e) => {
                        // Untracked mid-push: nothing to retry
                        let retry = self.store.mark_dirty(self.id, self.generation);
                        warn!(
                            firewall = self.id,
                            error = %e,
                            transient = e.is_transient(),
                            retry,
                            "Push failed"
                        );
                        Some(e.to_string())
                    }
                };
                audit::log_push(self.audit.as_deref(), self.id, snapshot.len(), error).await;

                self.state = WorkerState::Idle;
            }
        }

        self.state
    }

    /// Runs until the firewall is untracked.
    ///
    /// The first look happens one interval after start. Ticks that fall
    /// behind (slow push) are delayed rather than bunched.
    pub async fn run(mut self) {
        info!(firewall = self.id, generation = self.generation, "Worker started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.tick().await == WorkerState::Stopped {
                break;
            }
        }

        info!(firewall = self.id, "Worker stopped");
    }
}
