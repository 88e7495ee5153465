//! In-memory load balancer API for integration tests

use async_trait::async_trait;
use converge_config::EngineSettings;
use converge_elb::{
    ElbClient, ElbProvider, HealthPolicyModel, LoadBalancerFilter, LoadBalancerModel, MemberModel,
};
use converge_engine::{ApiError, Page};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type ApiResult<T> = Result<T, ApiError>;

#[derive(Default)]
struct State {
    load_balancers: BTreeMap<String, (LoadBalancerModel, usize)>,
    members: BTreeMap<String, Vec<MemberModel>>,
    policies: BTreeMap<String, Vec<HealthPolicyModel>>,
    next_id: usize,
    calls: Vec<String>,
    failures: BTreeMap<String, ApiError>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Record the call and return the injected failure for it, if any
    fn call(&mut self, name: &str, detail: impl std::fmt::Display) -> ApiResult<()> {
        self.calls.push(format!("{} {}", name, detail));
        match self.failures.remove(name) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Shared-state fake; clones see the same account
#[derive(Clone, Default)]
pub struct FakeElb {
    state: Arc<Mutex<State>>,
    /// Describe calls a load balancer stays in a transitional status
    transition_polls: usize,
    page_size: usize,
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError::not_found(format!("{}NotFound", what), format!("{} {} not found", what, id))
}

fn paginate<T: Clone>(items: &[T], marker: &str, page_size: usize) -> ApiResult<Page<T>> {
    let start: usize = if marker.is_empty() {
        0
    } else {
        marker
            .parse()
            .map_err(|_| ApiError::new(Some(400), "InvalidMarker", marker))?
    };
    let end = (start + page_size).min(items.len());
    let page = items[start.min(end)..end].to_vec();
    Ok(if end < items.len() {
        Page::truncated(page, end.to_string())
    } else {
        Page::last(page)
    })
}

impl FakeElb {
    pub fn new() -> Self {
        Self {
            transition_polls: 1,
            page_size: 2,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Make the next call to `name` fail with `err`
    pub fn fail_next(&self, name: &str, err: ApiError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(name.to_string(), err);
    }

    pub fn load_balancer(&self, id: &str) -> Option<LoadBalancerModel> {
        self.state
            .lock()
            .unwrap()
            .load_balancers
            .get(id)
            .map(|(lb, _)| lb.clone())
    }

    pub fn seed_members(&self, pool_id: &str, members: Vec<MemberModel>) {
        self.state
            .lock()
            .unwrap()
            .members
            .insert(pool_id.to_string(), members);
    }

    pub fn members(&self, pool_id: &str) -> Vec<MemberModel> {
        self.state
            .lock()
            .unwrap()
            .members
            .get(pool_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed_policies(&self, pool_id: &str, policies: Vec<HealthPolicyModel>) {
        self.state
            .lock()
            .unwrap()
            .policies
            .insert(pool_id.to_string(), policies);
    }

    pub fn policies(&self, pool_id: &str) -> Vec<HealthPolicyModel> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(pool_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ElbClient for FakeElb {
    async fn create_load_balancer(&self, request: &LoadBalancerModel) -> ApiResult<LoadBalancerModel> {
        let mut state = self.state.lock().unwrap();
        state.call("create_load_balancer", &request.load_balancer_name)?;
        let mut lb = request.clone();
        lb.load_balancer_id = state.next_id("lb");
        lb.load_balancer_status = "provisioning".to_string();
        state
            .load_balancers
            .insert(lb.load_balancer_id.clone(), (lb.clone(), self.transition_polls));
        Ok(lb)
    }

    async fn modify_load_balancer(
        &self,
        id: &str,
        request: &LoadBalancerModel,
    ) -> ApiResult<LoadBalancerModel> {
        let mut state = self.state.lock().unwrap();
        state.call("modify_load_balancer", id)?;
        let transition_polls = self.transition_polls;
        let (lb, polls) = state
            .load_balancers
            .get_mut(id)
            .ok_or_else(|| not_found("LoadBalancer", id))?;
        if !request.load_balancer_name.is_empty() {
            lb.load_balancer_name = request.load_balancer_name.clone();
        }
        if request.bandwidth.is_some() {
            lb.bandwidth = request.bandwidth;
        }
        if request.deletion_protection.is_some() {
            lb.deletion_protection = request.deletion_protection;
        }
        if request.listener.is_some() {
            lb.listener = request.listener.clone();
        }
        lb.load_balancer_status = "configuring".to_string();
        *polls = transition_polls;
        Ok(lb.clone())
    }

    async fn delete_load_balancer(&self, id: &str) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("delete_load_balancer", id)?;
        state
            .load_balancers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("LoadBalancer", id))
    }

    async fn describe_load_balancer(&self, id: &str) -> ApiResult<LoadBalancerModel> {
        let mut state = self.state.lock().unwrap();
        state.call("describe_load_balancer", id)?;
        let (lb, polls) = state
            .load_balancers
            .get_mut(id)
            .ok_or_else(|| not_found("LoadBalancer", id))?;
        if *polls == 0 {
            lb.load_balancer_status = "active".to_string();
        } else {
            *polls -= 1;
        }
        Ok(lb.clone())
    }

    async fn list_load_balancers(
        &self,
        filter: &LoadBalancerFilter,
        marker: &str,
    ) -> ApiResult<Page<LoadBalancerModel>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_load_balancers", format!("'{}'", marker))?;
        let matching: Vec<LoadBalancerModel> = state
            .load_balancers
            .values()
            .map(|(lb, _)| lb.clone())
            .filter(|lb| filter.vpc_id.as_ref().is_none_or(|vpc| &lb.vpc_id == vpc))
            .collect();
        paginate(&matching, marker, self.page_size)
    }

    async fn add_member(&self, pool_id: &str, member: &MemberModel) -> ApiResult<MemberModel> {
        let mut state = self.state.lock().unwrap();
        state.call("add_member", format!("{}:{}", member.ip, member.port))?;
        let mut member = member.clone();
        member.member_id = state.next_id("m");
        state
            .members
            .entry(pool_id.to_string())
            .or_default()
            .push(member.clone());
        Ok(member)
    }

    async fn modify_member(&self, member_id: &str, request: &MemberModel) -> ApiResult<MemberModel> {
        let mut state = self.state.lock().unwrap();
        state.call("modify_member", member_id)?;
        let member = state
            .members
            .values_mut()
            .flatten()
            .find(|m| m.member_id == member_id)
            .ok_or_else(|| not_found("Member", member_id))?;
        if request.weight.is_some() {
            member.weight = request.weight;
        }
        if !request.description.is_empty() {
            member.description = request.description.clone();
        }
        Ok(member.clone())
    }

    async fn remove_member(&self, member_id: &str) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("remove_member", member_id)?;
        let mut found = false;
        for members in state.members.values_mut() {
            let before = members.len();
            members.retain(|m| m.member_id != member_id);
            found |= members.len() != before;
        }
        if found {
            Ok(())
        } else {
            Err(not_found("Member", member_id))
        }
    }

    async fn describe_member(&self, member_id: &str) -> ApiResult<MemberModel> {
        let mut state = self.state.lock().unwrap();
        state.call("describe_member", member_id)?;
        state
            .members
            .values()
            .flatten()
            .find(|m| m.member_id == member_id)
            .cloned()
            .ok_or_else(|| not_found("Member", member_id))
    }

    async fn list_members(&self, pool_id: &str, marker: &str) -> ApiResult<Page<MemberModel>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_members", format!("{} '{}'", pool_id, marker))?;
        let members = state.members.get(pool_id).cloned().unwrap_or_default();
        paginate(&members, marker, self.page_size)
    }

    async fn create_health_policy(
        &self,
        pool_id: &str,
        policy: &HealthPolicyModel,
    ) -> ApiResult<HealthPolicyModel> {
        let mut state = self.state.lock().unwrap();
        state.call("create_health_policy", &policy.policy_type)?;
        let mut policy = policy.clone();
        policy.policy_id = state.next_id("bp");
        state
            .policies
            .entry(pool_id.to_string())
            .or_default()
            .push(policy.clone());
        Ok(policy)
    }

    async fn modify_health_policy(
        &self,
        policy_id: &str,
        request: &HealthPolicyModel,
    ) -> ApiResult<HealthPolicyModel> {
        let mut state = self.state.lock().unwrap();
        state.call("modify_health_policy", policy_id)?;
        let policy = state
            .policies
            .values_mut()
            .flatten()
            .find(|p| p.policy_id == policy_id)
            .ok_or_else(|| not_found("HealthPolicy", policy_id))?;
        if request.health_check.is_some() {
            policy.health_check = request.health_check;
        }
        if request.interval.is_some() {
            policy.interval = request.interval;
        }
        if request.healthy_threshold.is_some() {
            policy.healthy_threshold = request.healthy_threshold;
        }
        Ok(policy.clone())
    }

    async fn delete_health_policy(&self, policy_id: &str) -> ApiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.call("delete_health_policy", policy_id)?;
        for policies in state.policies.values_mut() {
            policies.retain(|p| p.policy_id != policy_id);
        }
        Ok(())
    }

    async fn describe_health_policy(&self, policy_id: &str) -> ApiResult<HealthPolicyModel> {
        let mut state = self.state.lock().unwrap();
        state.call("describe_health_policy", policy_id)?;
        state
            .policies
            .values()
            .flatten()
            .find(|p| p.policy_id == policy_id)
            .cloned()
            .ok_or_else(|| not_found("HealthPolicy", policy_id))
    }

    async fn list_health_policies(
        &self,
        pool_id: &str,
        marker: &str,
    ) -> ApiResult<Page<HealthPolicyModel>> {
        let mut state = self.state.lock().unwrap();
        state.call("list_health_policies", format!("{} '{}'", pool_id, marker))?;
        let policies = state.policies.get(pool_id).cloned().unwrap_or_default();
        paginate(&policies, marker, self.page_size)
    }
}

/// Settings with millisecond-scale polling so tests finish quickly
pub fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.convergence.poll_interval_secs = 1;
    settings.convergence.timeout_secs = 10;
    settings
}

/// Provider whose every region connects to `fake`
pub fn provider(fake: &FakeElb) -> ElbProvider<FakeElb> {
    let fake = fake.clone();
    ElbProvider::new(&fast_settings(), move |_region: &String| Ok(fake.clone()))
}
