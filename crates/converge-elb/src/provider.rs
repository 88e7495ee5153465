//! Load balancer provider

use crate::client::{ElbClient, HealthPolicies, LoadBalancerFilter, LoadBalancers, Members};
use crate::config::{HealthPolicyConfig, LoadBalancerConfig, MemberConfig};
use crate::descriptor::{
    MemberKey, desired_health_policies, desired_members, health_policy_collection,
    load_balancer_descriptor, member_collection,
};
use crate::error::Result;
use crate::model::{HealthPolicyModel, LoadBalancerModel, MemberModel};
use converge_config::EngineSettings;
use converge_engine::{
    CancelToken, ClientPool, CollectionDescriptor, ConcurrencyLimiter, PlanSummary,
    ReconcilePlan, ResourceDescriptor, ResourceEngine,
};
use std::sync::Arc;

/// Compute the member plan for a pool without calling the API
pub fn plan_members(
    desired: &[MemberConfig],
    observed: &[MemberModel],
) -> Result<ReconcilePlan<MemberKey, MemberModel>> {
    let desired = desired_members(desired)?;
    Ok(member_collection().plan(&desired, observed)?)
}

/// Compute the health check policy plan for a pool without calling the API
pub fn plan_health_policies(
    desired: &[HealthPolicyConfig],
    observed: &[HealthPolicyModel],
) -> Result<ReconcilePlan<String, HealthPolicyModel>> {
    let desired = desired_health_policies(desired)?;
    Ok(health_policy_collection().plan(&desired, observed)?)
}

/// Load balancer provider.
///
/// Owns one API client per region (built on first use), the limiter shared
/// by every load balancer purchase, and the descriptor tables.
pub struct ElbProvider<Cl> {
    clients: ClientPool<String, Cl>,
    limiter: ConcurrencyLimiter,
    descriptor: Arc<ResourceDescriptor<LoadBalancerConfig, LoadBalancerModel>>,
    members: CollectionDescriptor<MemberKey, MemberModel>,
    policies: CollectionDescriptor<String, HealthPolicyModel>,
    cancel: Option<CancelToken>,
}

impl<Cl: ElbClient + 'static> ElbProvider<Cl> {
    /// `connect` builds the client for a region
    pub fn new(
        settings: &EngineSettings,
        connect: impl Fn(&String) -> converge_engine::Result<Cl> + Send + Sync + 'static,
    ) -> Self {
        Self {
            clients: ClientPool::new(connect),
            limiter: ConcurrencyLimiter::new(settings.limiter.to_limiter_settings()),
            descriptor: Arc::new(load_balancer_descriptor(settings)),
            members: member_collection(),
            policies: health_policy_collection(),
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Regions with a constructed client
    pub fn connected_regions(&self) -> usize {
        self.clients.len()
    }

    fn client(&self, region: &str) -> Result<Arc<Cl>> {
        Ok(self.clients.get(&region.to_string())?)
    }

    /// Engine for load balancers of `region`
    pub fn load_balancers(
        &self,
        region: &str,
    ) -> Result<ResourceEngine<LoadBalancers<Cl>, LoadBalancerConfig>> {
        let api = Arc::new(LoadBalancers::new(self.client(region)?, region));
        let engine = ResourceEngine::new(api, Arc::clone(&self.descriptor))
            .with_limiter(self.limiter.clone());
        Ok(match &self.cancel {
            Some(token) => engine.with_cancel(token.clone()),
            None => engine,
        })
    }

    /// Create a load balancer and wait until it is active
    pub async fn create_load_balancer(
        &self,
        region: &str,
        config: &LoadBalancerConfig,
    ) -> Result<(String, LoadBalancerConfig)> {
        Ok(self.load_balancers(region)?.create(config).await?)
    }

    /// Current state overlaid onto `prior`; `None` when it no longer exists
    pub async fn read_load_balancer(
        &self,
        region: &str,
        id: &str,
        prior: LoadBalancerConfig,
    ) -> Result<Option<LoadBalancerConfig>> {
        Ok(self.load_balancers(region)?.read_config(id, prior).await?)
    }

    pub async fn update_load_balancer(
        &self,
        region: &str,
        id: &str,
        previous: &LoadBalancerConfig,
        desired: &LoadBalancerConfig,
    ) -> Result<LoadBalancerConfig> {
        Ok(self
            .load_balancers(region)?
            .update(id, previous, desired)
            .await?)
    }

    pub async fn delete_load_balancer(&self, region: &str, id: &str) -> Result<()> {
        Ok(self.load_balancers(region)?.delete(id).await?)
    }

    pub async fn list_load_balancers(
        &self,
        region: &str,
        filter: &LoadBalancerFilter,
    ) -> Result<Vec<LoadBalancerModel>> {
        Ok(self.load_balancers(region)?.list_all(filter).await?)
    }

    /// Make the pool's members match `desired`
    pub async fn sync_members(
        &self,
        region: &str,
        pool_id: &str,
        desired: &[MemberConfig],
    ) -> Result<PlanSummary> {
        tracing::info!(
            "Syncing {} members of pool {} in {}",
            desired.len(),
            pool_id,
            region
        );
        let desired = desired_members(desired)?;
        let api = Members::new(self.client(region)?, pool_id);
        Ok(self
            .load_balancers(region)?
            .sync_collection(&api, &self.members, &(), &desired)
            .await?)
    }

    /// Make the pool's health check policies match `desired`
    pub async fn sync_health_policies(
        &self,
        region: &str,
        pool_id: &str,
        desired: &[HealthPolicyConfig],
    ) -> Result<PlanSummary> {
        tracing::info!(
            "Syncing {} health check policies of pool {} in {}",
            desired.len(),
            pool_id,
            region
        );
        let desired = desired_health_policies(desired)?;
        let api = HealthPolicies::new(self.client(region)?, pool_id);
        Ok(self
            .load_balancers(region)?
            .sync_collection(&api, &self.policies, &(), &desired)
            .await?)
    }
}
