// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! All running accounts, and job routing across them.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use drover_config::DroverConfig;
use drover_core::{DroverError, HealthStatus, Job, JobId, SubmitFn};
use drover_scheduler::{CHANNEL_REMOVED, PoolSnapshot};
use futures::future::join_all;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::instance::{AccountInstance, InstanceDeps};

/// Where a submitted job landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub account_id: String,
    pub channel_id: String,
}

/// What a [`InstanceRegistry::refresh`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub restarted: Vec<String>,
    pub updated: Vec<String>,
}

impl RefreshSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.restarted.is_empty()
            && self.updated.is_empty()
    }
}

pub struct InstanceRegistry {
    deps: InstanceDeps,
    instances: DashMap<String, Arc<AccountInstance>>,
}

impl std::fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("accounts", &self.account_ids())
            .finish()
    }
}

impl InstanceRegistry {
    pub fn new(deps: InstanceDeps) -> Self {
        Self {
            deps,
            instances: DashMap::new(),
        }
    }

    /// Reconcile running instances with `config`.
    ///
    /// Removed or disabled-in-config accounts are stopped and their jobs
    /// fail with "channel removed". A changed token or gateway section
    /// restarts the instance; other changes are applied in place. Accounts
    /// the session disabled stay down until their token changes.
    pub async fn refresh(&self, config: &DroverConfig) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let wanted: BTreeMap<&str, _> = config
            .accounts
            .iter()
            .filter(|a| a.enabled)
            .map(|a| (a.id.as_str(), a))
            .collect();

        let stale: Vec<String> = self
            .instances
            .iter()
            .filter(|entry| !wanted.contains_key(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();
        for id in stale {
            if let Some((_, instance)) = self.instances.remove(&id) {
                instance.shutdown(CHANNEL_REMOVED).await;
                summary.removed.push(id);
            }
        }

        for (id, account) in wanted {
            let existing = self.get(id);
            match existing {
                None => {
                    let instance = AccountInstance::start(
                        account.clone(),
                        &config.scheduler,
                        &config.gateway,
                        &self.deps,
                    );
                    self.instances.insert(id.to_string(), instance);
                    summary.added.push(id.to_string());
                }
                Some(instance) if instance.needs_restart(account, &config.gateway) => {
                    instance.shutdown(CHANNEL_REMOVED).await;
                    let instance = AccountInstance::start(
                        account.clone(),
                        &config.scheduler,
                        &config.gateway,
                        &self.deps,
                    );
                    self.instances.insert(id.to_string(), instance);
                    summary.restarted.push(id.to_string());
                }
                Some(instance) if instance.is_disabled() => {
                    debug!(account = %id, "account stays disabled until its token changes");
                }
                Some(instance) => {
                    instance.refresh(account.clone());
                    summary.updated.push(id.to_string());
                }
            }
        }

        if !summary.added.is_empty() || !summary.removed.is_empty() || !summary.restarted.is_empty()
        {
            info!(
                added = ?summary.added,
                removed = ?summary.removed,
                restarted = ?summary.restarted,
                "account instances reconciled"
            );
        }
        summary
    }

    /// Route a job.
    ///
    /// An explicit account wins; otherwise the channel owner when a
    /// preferred channel is given; otherwise a weighted pick among
    /// available accounts, then among any account that is not disabled.
    pub fn submit(
        &self,
        job: Arc<Job>,
        submit: SubmitFn,
        preferred_account: Option<&str>,
        preferred_channel: Option<&str>,
    ) -> Result<Placement, DroverError> {
        let instance = match preferred_account {
            Some(id) => self.get(id).ok_or_else(|| DroverError::AccountUnavailable {
                account_id: id.to_string(),
                reason: "unknown account".to_string(),
            })?,
            None => match preferred_channel.and_then(|channel| self.channel_owner(channel)) {
                Some(owner) => owner,
                None => self.pick()?,
            },
        };

        let channel_id = instance.submit(job, submit, preferred_channel)?;
        Ok(Placement {
            account_id: instance.account_id().to_string(),
            channel_id,
        })
    }

    fn channel_owner(&self, channel_id: &str) -> Option<Arc<AccountInstance>> {
        self.instances()
            .into_iter()
            .find(|i| !i.is_disabled() && i.pool().channel(channel_id).is_some())
    }

    fn pick(&self) -> Result<Arc<AccountInstance>, DroverError> {
        let all = self.instances();
        let mut candidates: Vec<_> = all.iter().filter(|i| i.is_available()).cloned().collect();
        if candidates.is_empty() {
            candidates = all.into_iter().filter(|i| !i.is_disabled()).collect();
        }
        if candidates.is_empty() {
            return Err(DroverError::AccountUnavailable {
                account_id: "any".to_string(),
                reason: "no enabled account".to_string(),
            });
        }

        let mut rng = rand::thread_rng();
        let chosen = candidates
            .choose_weighted(&mut rng, |i| i.weight())
            .unwrap_or(&candidates[0]);
        Ok(Arc::clone(chosen))
    }

    pub fn get(&self, account_id: &str) -> Option<Arc<AccountInstance>> {
        self.instances.get(account_id).map(|e| Arc::clone(e.value()))
    }

    /// Instances ordered by account id.
    pub fn instances(&self) -> Vec<Arc<AccountInstance>> {
        let mut all: Vec<_> = self.instances.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.account_id().cmp(b.account_id()));
        all
    }

    pub fn account_ids(&self) -> Vec<String> {
        self.instances()
            .iter()
            .map(|i| i.account_id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Find a job on any account: `(account_id, channel_id, job)`.
    pub fn find_job(&self, id: &JobId) -> Option<(String, String, Arc<Job>)> {
        self.instances().into_iter().find_map(|i| {
            i.find_job(id)
                .map(|(channel, job)| (i.account_id().to_string(), channel, job))
        })
    }

    pub fn cancel_job(&self, id: &JobId, reason: &str) -> bool {
        self.instances().iter().any(|i| i.cancel_job(id, reason))
    }

    pub fn health(&self) -> Vec<(String, HealthStatus)> {
        self.instances()
            .iter()
            .map(|i| (i.account_id().to_string(), i.health()))
            .collect()
    }

    pub fn snapshots(&self) -> Vec<PoolSnapshot> {
        self.instances().iter().map(|i| i.snapshot()).collect()
    }

    /// Stop every instance concurrently.
    pub async fn shutdown(&self, reason: &str) {
        let instances = self.instances();
        self.instances.clear();
        join_all(instances.iter().map(|i| i.shutdown(reason))).await;
        info!(accounts = instances.len(), reason, "all account instances stopped");
    }
}
