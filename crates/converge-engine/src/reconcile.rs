//! Keyed-collection reconciliation
//!
//! Computes the minimal create/update/delete plan that turns an observed
//! keyed collection (pool members, health check policies, tags, ...) into the
//! desired one, and applies it in a fixed order.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Display;
use std::hash::Hash;

/// Type of action to perform on one member of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new member
    Create,
    /// Update an existing member in place
    Update,
    /// Delete a member
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// An observed member that must change to match the desired one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<K, T> {
    pub key: K,
    pub observed: T,
    pub desired: T,
}

/// An observed member that has no desired counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deletion<K, T> {
    pub key: K,
    pub observed: T,
}

/// The plan computed by one reconciliation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePlan<K, T> {
    /// Desired members with no observed counterpart, in desired order
    pub to_create: Vec<T>,

    /// Members present on both sides that differ, in desired order
    pub to_update: Vec<Update<K, T>>,

    /// Observed members with no desired counterpart, in observed order
    pub to_delete: Vec<Deletion<K, T>>,

    /// Number of members present on both sides and already equal
    pub unchanged: usize,
}

impl<K, T> ReconcilePlan<K, T> {
    pub fn empty() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            unchanged: 0,
        }
    }

    pub fn has_changes(&self) -> bool {
        !(self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty())
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.to_create.len(),
            update: self.to_update.len(),
            delete: self.to_delete.len(),
            no_change: self.unchanged,
        }
    }

    /// Keys scheduled for deletion
    pub fn delete_keys(&self) -> Vec<&K> {
        self.to_delete.iter().map(|d| &d.key).collect()
    }

    /// Execute the plan: deletes, then updates, then creates.
    ///
    /// Stops at the first failing call. A delete whose target is already gone
    /// counts as done.
    pub async fn apply<E>(&self, executor: &E) -> Result<PlanSummary>
    where
        E: PlanExecutor<K, T> + ?Sized,
        K: Display + Sync,
        T: Sync,
    {
        for deletion in &self.to_delete {
            tracing::info!("Deleting {}", deletion.key);
            match executor.delete(&deletion.key, &deletion.observed).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!("{} already gone", deletion.key);
                }
                Err(e) => return Err(e),
            }
        }

        for update in &self.to_update {
            tracing::info!("Updating {}", update.key);
            executor.update(&update.observed, &update.desired).await?;
        }

        for item in &self.to_create {
            tracing::info!("Creating member");
            executor.create(item).await?;
        }

        Ok(self.summary())
    }
}

/// The calls a plan is applied through
#[async_trait]
pub trait PlanExecutor<K, T>: Send + Sync {
    async fn create(&self, desired: &T) -> Result<()>;

    async fn update(&self, observed: &T, desired: &T) -> Result<()>;

    async fn delete(&self, key: &K, observed: &T) -> Result<()>;
}

/// Summary of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl PlanSummary {
    pub fn count(&self, action_type: ActionType) -> usize {
        match action_type {
            ActionType::Create => self.create,
            ActionType::Update => self.update,
            ActionType::Delete => self.delete,
            ActionType::NoOp => self.no_change,
        }
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

/// Reject a desired collection in which two members share a key
pub fn validate_unique<K, T>(desired: &[T], key_of: impl Fn(&T) -> K) -> Result<()>
where
    K: Eq + Hash + Display,
{
    let mut seen = HashMap::with_capacity(desired.len());
    for (index, item) in desired.iter().enumerate() {
        let key = key_of(item);
        if let Some(first) = seen.get(&key) {
            return Err(EngineError::validation(
                key.to_string(),
                format!("duplicate key (members {} and {})", first, index),
            ));
        }
        seen.insert(key, index);
    }
    Ok(())
}

/// Compute the plan that turns `observed` into `desired`.
///
/// `equal(observed, desired)` decides whether a member present on both sides
/// needs an update.
pub fn reconcile<K, T>(
    desired: &[T],
    observed: &[T],
    key_of: impl Fn(&T) -> K,
    equal: impl Fn(&T, &T) -> bool,
) -> Result<ReconcilePlan<K, T>>
where
    K: Eq + Hash + Clone + Display,
    T: Clone,
{
    validate_unique(desired, &key_of)?;

    let mut observed_by_key: HashMap<K, &T> = HashMap::with_capacity(observed.len());
    let mut surplus = Vec::new();
    for item in observed {
        match observed_by_key.entry(key_of(item)) {
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
            Entry::Occupied(slot) => {
                tracing::warn!("Observed duplicate member for key {}", slot.key());
                surplus.push(Deletion {
                    key: slot.key().clone(),
                    observed: item.clone(),
                });
            }
        }
    }

    let mut plan = ReconcilePlan::empty();
    let mut desired_keys = Vec::with_capacity(desired.len());

    for item in desired {
        let key = key_of(item);
        match observed_by_key.get(&key).copied() {
            None => plan.to_create.push(item.clone()),
            Some(existing) if equal(existing, item) => plan.unchanged += 1,
            Some(existing) => plan.to_update.push(Update {
                key: key.clone(),
                observed: existing.clone(),
                desired: item.clone(),
            }),
        }
        desired_keys.push(key);
    }

    let desired_keys: std::collections::HashSet<K> = desired_keys.into_iter().collect();
    let mut emitted = std::collections::HashSet::new();
    for item in observed {
        let key = key_of(item);
        if !desired_keys.contains(&key) && emitted.insert(key.clone()) {
            plan.to_delete.push(Deletion {
                key,
                observed: item.clone(),
            });
        }
    }
    plan.to_delete.extend(surplus);

    tracing::debug!("Reconcile plan: {}", plan.summary());
    Ok(plan)
}
