//! Per-resource-type host surface
//!
//! A resource type is described by a [`ResourceDescriptor`] (field bindings,
//! id and status extractors, convergence policies) and each keyed
//! sub-collection by a [`CollectionDescriptor`] (key extractor, equality).
//! [`ResourceEngine`] drives the mapper, limiter, waiter, paginator and
//! reconciler from those tables.

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result, ignore_not_found};
use crate::limiter::ConcurrencyLimiter;
use crate::mapper::SparseMapper;
use crate::paginate;
use crate::provider::ResourceApi;
use crate::reconcile::{self, PlanExecutor, PlanSummary, ReconcilePlan};
use crate::waiter::{ConvergencePolicy, ConvergenceWaiter, WaitResult};
use async_trait::async_trait;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

/// Status reported for a resource whose read returned NotFound
pub const DELETED_STATUS: &str = "deleted";

/// Declarative description of one resource type
pub struct ResourceDescriptor<C, M> {
    /// Human readable type name used in errors and logs (e.g. "load balancer")
    pub kind: &'static str,

    pub mapper: SparseMapper<C, M>,

    pub id_of: fn(&M) -> String,

    pub status_of: fn(&M) -> String,

    /// Wait applied after create
    pub create_policy: ConvergencePolicy,

    /// Wait applied after update; `None` trusts the update response
    pub update_policy: Option<ConvergencePolicy>,

    /// Wait applied after delete; target should include [`DELETED_STATUS`]
    pub delete_policy: Option<ConvergencePolicy>,

    /// Whether create calls need a concurrency limiter slot
    pub rate_limited: bool,
}

/// Declarative description of a keyed sub-collection
pub struct CollectionDescriptor<K, M> {
    pub kind: &'static str,

    pub key_of: fn(&M) -> K,

    /// Whether an observed member already matches the desired one
    pub equal: fn(&M, &M) -> bool,

    /// Provider id of an observed member
    pub id_of: fn(&M) -> String,
}

impl<K, M> CollectionDescriptor<K, M>
where
    K: Eq + Hash + Clone + Display + Send + Sync,
    M: Clone + Send + Sync,
{
    /// Compute the plan for `desired` against `observed`
    pub fn plan(&self, desired: &[M], observed: &[M]) -> Result<ReconcilePlan<K, M>> {
        reconcile::reconcile(desired, observed, self.key_of, self.equal)
    }

    /// List the observed members, reconcile and apply the plan.
    ///
    /// Duplicate desired keys are rejected before any API call.
    pub async fn sync<A>(&self, api: &A, args: &A::ListArgs, desired: &[M]) -> Result<PlanSummary>
    where
        A: ResourceApi<Model = M>,
    {
        reconcile::validate_unique(desired, self.key_of)?;

        let kind = self.kind;
        let scope = api.list_scope(args);
        let observed = paginate::collect(&format!("list {}", kind), |marker| {
            let scope = scope.clone();
            async move {
                api.list(args, &marker)
                    .await
                    .map_err(|e| EngineError::from_api(kind, "list", scope, e))
            }
        })
        .await?;

        let plan = self.plan(desired, &observed)?;
        if !plan.has_changes() {
            tracing::debug!("{} already in sync", self.kind);
            return Ok(plan.summary());
        }

        tracing::info!("Syncing {}: {}", self.kind, plan.summary());
        plan.apply(&ApiExecutor {
            api,
            descriptor: self,
        })
        .await
    }
}

struct ApiExecutor<'a, A: ResourceApi, K> {
    api: &'a A,
    descriptor: &'a CollectionDescriptor<K, A::Model>,
}

#[async_trait]
impl<'a, A, K> PlanExecutor<K, A::Model> for ApiExecutor<'a, A, K>
where
    A: ResourceApi,
    K: Display + Send + Sync,
{
    async fn create(&self, desired: &A::Model) -> Result<()> {
        self.api
            .create(desired)
            .await
            .map_err(|e| EngineError::from_api(self.descriptor.kind, "create", "(new)", e))?;
        Ok(())
    }

    async fn update(&self, observed: &A::Model, desired: &A::Model) -> Result<()> {
        let id = (self.descriptor.id_of)(observed);
        self.api
            .update(&id, desired)
            .await
            .map_err(|e| EngineError::from_api(self.descriptor.kind, "update", &id, e))?;
        Ok(())
    }

    async fn delete(&self, _key: &K, observed: &A::Model) -> Result<()> {
        let id = (self.descriptor.id_of)(observed);
        self.api
            .delete(&id)
            .await
            .map_err(|e| EngineError::from_api(self.descriptor.kind, "delete", &id, e))
    }
}

/// Host-facing operations for one resource type against one API client
pub struct ResourceEngine<A: ResourceApi, C> {
    api: Arc<A>,
    descriptor: Arc<ResourceDescriptor<C, A::Model>>,
    limiter: Option<ConcurrencyLimiter>,
    cancel: Option<CancelToken>,
}

impl<A, C> ResourceEngine<A, C>
where
    A: ResourceApi,
    A::Model: Default + 'static,
    C: Clone + Default + 'static,
{
    pub fn new(api: Arc<A>, descriptor: Arc<ResourceDescriptor<C, A::Model>>) -> Self {
        Self {
            api,
            descriptor,
            limiter: None,
            cancel: None,
        }
    }

    pub fn with_limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn descriptor(&self) -> &ResourceDescriptor<C, A::Model> {
        &self.descriptor
    }

    fn operation(&self, verb: &str) -> String {
        format!("{} {}", verb, self.descriptor.kind)
    }

    fn waiter<'p>(&self, policy: &'p ConvergencePolicy) -> ConvergenceWaiter<'p> {
        let waiter = ConvergenceWaiter::new(policy);
        match &self.cancel {
            Some(token) => waiter.with_cancel(token.clone()),
            None => waiter,
        }
    }

    /// Translate a config into a create request; fails before any API call
    pub fn build_create_request(&self, config: &C) -> Result<A::Model> {
        self.descriptor.mapper.build(config)
    }

    /// Overlay a response onto the previously known config
    pub fn apply_read(&self, config: C, response: &A::Model) -> C {
        self.descriptor.mapper.apply_read(config, response)
    }

    /// Fetch the resource; `None` when it does not exist
    pub async fn read(&self, id: &str) -> Result<Option<A::Model>> {
        let result = self
            .api
            .get(id)
            .await
            .map_err(|e| EngineError::from_api(self.descriptor.kind, "read", id, e));
        ignore_not_found(result)
    }

    /// Fetch the resource and overlay it onto `prior`
    pub async fn read_config(&self, id: &str, prior: C) -> Result<Option<C>> {
        Ok(self
            .read(id)
            .await?
            .map(|model| self.apply_read(prior, &model)))
    }

    /// Poll the resource until it reaches one of `policy`'s target statuses
    pub async fn wait_until_converged(
        &self,
        id: &str,
        policy: &ConvergencePolicy,
    ) -> Result<WaitResult<A::Model>> {
        let api = &*self.api;
        let kind = self.descriptor.kind;
        let status_of = self.descriptor.status_of;
        self.waiter(policy)
            .wait(id, || async move {
                let model = api
                    .get(id)
                    .await
                    .map_err(|e| EngineError::from_api(kind, "refresh", id, e))?;
                let status = status_of(&model);
                Ok((model, status))
            })
            .await
    }

    /// Build, create, wait for the create policy's target and convert back.
    ///
    /// Returns the new resource id and the config overlaid with the final
    /// observed state.
    pub async fn create(&self, config: &C) -> Result<(String, C)> {
        let request = self.build_create_request(config)?;

        let permit = match (&self.limiter, self.descriptor.rate_limited) {
            (Some(limiter), true) => Some(match &self.cancel {
                Some(token) => limiter.acquire_with_cancel(token).await?,
                None => limiter.acquire().await?,
            }),
            _ => None,
        };
        let created = self
            .api
            .create(&request)
            .await
            .map_err(|e| EngineError::from_api(self.descriptor.kind, "create", "(new)", e));
        drop(permit);
        let created = created?;

        let id = (self.descriptor.id_of)(&created);
        tracing::info!("Created {} {}", self.descriptor.kind, id);

        // The resource exists from here on; a failed wait must still name it
        let converged = match self
            .wait_until_converged(&id, &self.descriptor.create_policy)
            .await
        {
            Ok(converged) => converged,
            Err(e) => {
                tracing::warn!(
                    "{} {} was created but did not converge: {}",
                    self.descriptor.kind,
                    id,
                    e
                );
                return Err(e);
            }
        };
        Ok((id, self.apply_read(config.clone(), &converged.state)))
    }

    /// Send only the fields that changed between `previous` and `desired`
    pub async fn update(&self, id: &str, previous: &C, desired: &C) -> Result<C> {
        let Some(request) = self.descriptor.mapper.build_changes(previous, desired)? else {
            tracing::debug!("{} {} unchanged", self.descriptor.kind, id);
            return Ok(desired.clone());
        };

        let response = self
            .api
            .update(id, &request)
            .await
            .map_err(|e| EngineError::from_api(self.descriptor.kind, "update", id, e))?;
        tracing::info!("Updated {} {}", self.descriptor.kind, id);

        let model = match &self.descriptor.update_policy {
            Some(policy) => self.wait_until_converged(id, policy).await?.state,
            None => response,
        };
        Ok(self.apply_read(desired.clone(), &model))
    }

    /// Delete the resource. Deleting one that is already gone succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = self
            .api
            .delete(id)
            .await
            .map_err(|e| EngineError::from_api(self.descriptor.kind, "delete", id, e));
        if ignore_not_found(result)?.is_none() {
            tracing::debug!("{} {} already deleted", self.descriptor.kind, id);
            return Ok(());
        }
        tracing::info!("Deleting {} {}", self.descriptor.kind, id);

        let Some(policy) = &self.descriptor.delete_policy else {
            return Ok(());
        };
        let api = &*self.api;
        let kind = self.descriptor.kind;
        let status_of = self.descriptor.status_of;
        self.waiter(policy)
            .wait(id, || async move {
                let result = api
                    .get(id)
                    .await
                    .map_err(|e| EngineError::from_api(kind, "refresh", id, e));
                Ok(match ignore_not_found(result)? {
                    Some(model) => {
                        let status = status_of(&model);
                        (Some(model), status)
                    }
                    None => (None, DELETED_STATUS.to_string()),
                })
            })
            .await?;
        Ok(())
    }

    /// Plan a keyed sub-collection of this resource (e.g. members of a pool)
    pub fn apply_plan<K, M>(
        &self,
        collection: &CollectionDescriptor<K, M>,
        desired: &[M],
        observed: &[M],
    ) -> Result<ReconcilePlan<K, M>>
    where
        K: Eq + Hash + Clone + Display + Send + Sync,
        M: Clone + Send + Sync,
    {
        collection.plan(desired, observed)
    }

    /// List, reconcile and apply a keyed sub-collection through `api`
    pub async fn sync_collection<K, B>(
        &self,
        api: &B,
        collection: &CollectionDescriptor<K, B::Model>,
        args: &B::ListArgs,
        desired: &[B::Model],
    ) -> Result<PlanSummary>
    where
        K: Eq + Hash + Clone + Display + Send + Sync,
        B: ResourceApi,
        B::Model: Clone,
    {
        tracing::debug!(
            "Syncing {} of {} ({} desired)",
            collection.kind,
            self.descriptor.kind,
            desired.len()
        );
        collection.sync(api, args, desired).await
    }

    /// Drain every page of the listing
    pub async fn list_all(&self, args: &A::ListArgs) -> Result<Vec<A::Model>> {
        let api = &*self.api;
        let kind = self.descriptor.kind;
        let scope = api.list_scope(args);
        paginate::collect(&self.operation("list"), |marker| {
            let scope = scope.clone();
            async move {
                api.list(args, &marker)
                    .await
                    .map_err(|e| EngineError::from_api(kind, "list", scope, e))
            }
        })
        .await
    }
}
