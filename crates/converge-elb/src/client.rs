//! Load balancer API client boundary
//!
//! [`ElbClient`] is what a real SDK wrapper implements. The adapters in this
//! module expose its calls as one [`ResourceApi`] per resource type so the
//! engine can drive them.

use crate::model::{HealthPolicyModel, LoadBalancerModel, MemberModel};
use async_trait::async_trait;
use converge_engine::{ApiError, Page, ResourceApi};
use std::sync::Arc;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Filter for listing load balancers
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerFilter {
    pub vpc_id: Option<String>,
}

#[async_trait]
pub trait ElbClient: Send + Sync {
    async fn create_load_balancer(&self, request: &LoadBalancerModel)
    -> ApiResult<LoadBalancerModel>;

    async fn modify_load_balancer(
        &self,
        id: &str,
        request: &LoadBalancerModel,
    ) -> ApiResult<LoadBalancerModel>;

    async fn delete_load_balancer(&self, id: &str) -> ApiResult<()>;

    async fn describe_load_balancer(&self, id: &str) -> ApiResult<LoadBalancerModel>;

    async fn list_load_balancers(
        &self,
        filter: &LoadBalancerFilter,
        marker: &str,
    ) -> ApiResult<Page<LoadBalancerModel>>;

    async fn add_member(&self, pool_id: &str, member: &MemberModel) -> ApiResult<MemberModel>;

    async fn modify_member(&self, member_id: &str, member: &MemberModel)
    -> ApiResult<MemberModel>;

    async fn remove_member(&self, member_id: &str) -> ApiResult<()>;

    async fn describe_member(&self, member_id: &str) -> ApiResult<MemberModel>;

    async fn list_members(&self, pool_id: &str, marker: &str) -> ApiResult<Page<MemberModel>>;

    async fn create_health_policy(
        &self,
        pool_id: &str,
        policy: &HealthPolicyModel,
    ) -> ApiResult<HealthPolicyModel>;

    async fn modify_health_policy(
        &self,
        policy_id: &str,
        policy: &HealthPolicyModel,
    ) -> ApiResult<HealthPolicyModel>;

    async fn delete_health_policy(&self, policy_id: &str) -> ApiResult<()>;

    async fn describe_health_policy(&self, policy_id: &str) -> ApiResult<HealthPolicyModel>;

    async fn list_health_policies(
        &self,
        pool_id: &str,
        marker: &str,
    ) -> ApiResult<Page<HealthPolicyModel>>;
}

/// Load balancers of one region
pub struct LoadBalancers<Cl> {
    client: Arc<Cl>,
    region: String,
}

impl<Cl> LoadBalancers<Cl> {
    pub fn new(client: Arc<Cl>, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }
}

#[async_trait]
impl<Cl: ElbClient> ResourceApi for LoadBalancers<Cl> {
    type Model = LoadBalancerModel;
    type ListArgs = LoadBalancerFilter;

    async fn create(&self, request: &LoadBalancerModel) -> ApiResult<LoadBalancerModel> {
        self.client.create_load_balancer(request).await
    }

    async fn update(&self, id: &str, request: &LoadBalancerModel) -> ApiResult<LoadBalancerModel> {
        self.client.modify_load_balancer(id, request).await
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        self.client.delete_load_balancer(id).await
    }

    async fn get(&self, id: &str) -> ApiResult<LoadBalancerModel> {
        self.client.describe_load_balancer(id).await
    }

    async fn list(
        &self,
        filter: &LoadBalancerFilter,
        marker: &str,
    ) -> ApiResult<Page<LoadBalancerModel>> {
        self.client.list_load_balancers(filter, marker).await
    }

    fn list_scope(&self, filter: &LoadBalancerFilter) -> String {
        match &filter.vpc_id {
            Some(vpc_id) => format!("{}/{}", self.region, vpc_id),
            None => self.region.clone(),
        }
    }
}

/// Members of one server pool
pub struct Members<Cl> {
    client: Arc<Cl>,
    pool_id: String,
}

impl<Cl> Members<Cl> {
    pub fn new(client: Arc<Cl>, pool_id: impl Into<String>) -> Self {
        Self {
            client,
            pool_id: pool_id.into(),
        }
    }
}

#[async_trait]
impl<Cl: ElbClient> ResourceApi for Members<Cl> {
    type Model = MemberModel;
    type ListArgs = ();

    async fn create(&self, member: &MemberModel) -> ApiResult<MemberModel> {
        self.client.add_member(&self.pool_id, member).await
    }

    async fn update(&self, id: &str, member: &MemberModel) -> ApiResult<MemberModel> {
        self.client.modify_member(id, member).await
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        self.client.remove_member(id).await
    }

    async fn get(&self, id: &str) -> ApiResult<MemberModel> {
        self.client.describe_member(id).await
    }

    async fn list(&self, _args: &(), marker: &str) -> ApiResult<Page<MemberModel>> {
        self.client.list_members(&self.pool_id, marker).await
    }

    fn list_scope(&self, _args: &()) -> String {
        self.pool_id.clone()
    }
}

/// Health check policies of one server pool
pub struct HealthPolicies<Cl> {
    client: Arc<Cl>,
    pool_id: String,
}

impl<Cl> HealthPolicies<Cl> {
    pub fn new(client: Arc<Cl>, pool_id: impl Into<String>) -> Self {
        Self {
            client,
            pool_id: pool_id.into(),
        }
    }
}

#[async_trait]
impl<Cl: ElbClient> ResourceApi for HealthPolicies<Cl> {
    type Model = HealthPolicyModel;
    type ListArgs = ();

    async fn create(&self, policy: &HealthPolicyModel) -> ApiResult<HealthPolicyModel> {
        self.client.create_health_policy(&self.pool_id, policy).await
    }

    async fn update(&self, id: &str, policy: &HealthPolicyModel) -> ApiResult<HealthPolicyModel> {
        self.client.modify_health_policy(id, policy).await
    }

    async fn delete(&self, id: &str) -> ApiResult<()> {
        self.client.delete_health_policy(id).await
    }

    async fn get(&self, id: &str) -> ApiResult<HealthPolicyModel> {
        self.client.describe_health_policy(id).await
    }

    async fn list(&self, _args: &(), marker: &str) -> ApiResult<Page<HealthPolicyModel>> {
        self.client.list_health_policies(&self.pool_id, marker).await
    }

    fn list_scope(&self, _args: &()) -> String {
        self.pool_id.clone()
    }
}
