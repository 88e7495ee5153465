//! Descriptor tables for the load balancer resource family

use crate::config::{
    HealthPolicyConfig, ListenerConfig, LoadBalancerConfig, MemberConfig,
};
use crate::model::{HealthPolicyModel, ListenerModel, LoadBalancerModel, MemberModel};
use converge_config::EngineSettings;
use converge_engine::{
    CollectionDescriptor, ConvergencePolicy, DELETED_STATUS, EngineError, ResourceDescriptor,
    Result, SparseMapper, Transform, bind_field,
};
use serde::Serialize;
use std::fmt;

/// Settings key for load balancer timing overrides
pub const LOAD_BALANCER: &str = "load_balancer";

pub const ADDRESS_TYPES: &[&str] = &["internet", "intranet"];

pub const PROTOCOLS: &[&str] = &["TCP", "UDP", "HTTP", "HTTPS"];

fn address_type(value: &String) -> std::result::Result<String, String> {
    if ADDRESS_TYPES.contains(&value.as_str()) {
        Ok(value.clone())
    } else {
        Err(format!("must be one of: {}", ADDRESS_TYPES.join(", ")))
    }
}

/// Protocol names are sent upper case
fn protocol(value: &String) -> std::result::Result<String, String> {
    let upper = value.to_uppercase();
    if PROTOCOLS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(format!("must be one of: {}", PROTOCOLS.join(", ")))
    }
}

fn same(value: &String) -> Option<String> {
    Some(value.clone())
}

fn not_empty(value: &String) -> bool {
    !value.is_empty()
}

pub fn listener_mapper() -> SparseMapper<ListenerConfig, ListenerModel> {
    let mapper = SparseMapper::<ListenerConfig, ListenerModel>::new();
    let mapper = bind_field!(mapper, protocol => protocol, Transform::new(protocol, same));
    let mapper = bind_field!(mapper, port => listener_port, Transform::optional());
    let mapper = bind_field!(mapper, backend_port => backend_port, Transform::optional());
    bind_field!(mapper, idle_timeout => idle_timeout, Transform::plain())
}

pub fn load_balancer_mapper() -> SparseMapper<LoadBalancerConfig, LoadBalancerModel> {
    let mapper = SparseMapper::<LoadBalancerConfig, LoadBalancerModel>::new();
    let mapper = bind_field!(
        mapper,
        name => load_balancer_name,
        Transform::plain().present_if(not_empty)
    );
    let mapper = bind_field!(mapper, address_type => address_type, Transform::new(address_type, same));
    let mapper = bind_field!(mapper, spec => load_balancer_spec, Transform::plain());
    let mapper = bind_field!(mapper, vpc_id => vpc_id, Transform::plain());
    let mapper = bind_field!(mapper, vswitch_id => v_switch_id, Transform::plain());
    let mapper = bind_field!(
        mapper,
        bandwidth => bandwidth,
        Transform::new(
            |mbps: &i64| {
                if *mbps > 0 {
                    Ok(Some(*mbps))
                } else {
                    Err("must be greater than 0".to_string())
                }
            },
            |mbps: &Option<i64>| *mbps,
        )
    );
    let mapper = bind_field!(
        mapper,
        bandwidth_package_id => bandwidth_package_id,
        Transform::plain().present_if(not_empty)
    );
    let mapper = bind_field!(mapper, deletion_protection => deletion_protection, Transform::optional());
    mapper
        .block(
            "listener",
            |c| &c.listener,
            |c| &mut c.listener,
            |r| &r.listener,
            |r| &mut r.listener,
            listener_mapper(),
        )
        .exclusive(&["bandwidth", "bandwidth_package_id"])
}

fn statuses(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Load balancer descriptor with timings taken from `settings`
pub fn load_balancer_descriptor(
    settings: &EngineSettings,
) -> ResourceDescriptor<LoadBalancerConfig, LoadBalancerModel> {
    let policy = |pending: &[&str], target: &[&str]| {
        settings.policy_for(
            LOAD_BALANCER,
            ConvergencePolicy::new(statuses(pending), statuses(target)),
        )
    };

    ResourceDescriptor {
        kind: "load balancer",
        mapper: load_balancer_mapper(),
        id_of: |m| m.load_balancer_id.clone(),
        status_of: |m| m.load_balancer_status.clone(),
        create_policy: policy(&["provisioning"], &["active"]),
        update_policy: Some(policy(&["configuring"], &["active"])),
        delete_policy: Some(policy(&["active", "deleting"], &[DELETED_STATUS])),
        rate_limited: true,
    }
}

/// Pool members are correlated by address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MemberKey {
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

pub fn member_mapper() -> SparseMapper<MemberConfig, MemberModel> {
    let mapper = SparseMapper::<MemberConfig, MemberModel>::new();
    let mapper = bind_field!(mapper, ip => ip, Transform::plain().present_if(not_empty));
    let mapper = bind_field!(mapper, port => port, Transform::plain());
    let mapper = bind_field!(mapper, weight => weight, Transform::optional());
    bind_field!(mapper, description => description, Transform::plain())
}

/// Build the desired member models; `ip` and `port` are required
pub fn desired_members(configs: &[MemberConfig]) -> Result<Vec<MemberModel>> {
    let mapper = member_mapper();
    configs
        .iter()
        .enumerate()
        .map(|(index, config)| {
            if config.ip.as_deref().is_none_or(str::is_empty) {
                return Err(EngineError::validation(format!("members.{index}.ip"), "required"));
            }
            if config.port.is_none_or(|port| port == 0) {
                return Err(EngineError::validation(
                    format!("members.{index}.port"),
                    "required",
                ));
            }
            mapper.build(config)
        })
        .collect()
}

fn member_matches(observed: &MemberModel, desired: &MemberModel) -> bool {
    desired.weight.is_none_or(|w| observed.weight == Some(w))
        && (desired.description.is_empty() || observed.description == desired.description)
}

pub fn member_collection() -> CollectionDescriptor<MemberKey, MemberModel> {
    CollectionDescriptor {
        kind: "pool member",
        key_of: |m| MemberKey {
            ip: m.ip.clone(),
            port: m.port,
        },
        equal: member_matches,
        id_of: |m| m.member_id.clone(),
    }
}

pub fn health_policy_mapper() -> SparseMapper<HealthPolicyConfig, HealthPolicyModel> {
    let mapper = SparseMapper::<HealthPolicyConfig, HealthPolicyModel>::new();
    let mapper = bind_field!(mapper, policy_type => policy_type, Transform::new(protocol, same));
    let mapper = bind_field!(mapper, health_check => health_check, Transform::optional());
    let mapper = bind_field!(mapper, interval => interval, Transform::optional());
    let mapper = bind_field!(mapper, healthy_threshold => healthy_threshold, Transform::optional());
    bind_field!(mapper, path => path, Transform::plain().present_if(not_empty))
}

/// Build the desired policy models; `type` is required
pub fn desired_health_policies(configs: &[HealthPolicyConfig]) -> Result<Vec<HealthPolicyModel>> {
    let mapper = health_policy_mapper();
    configs
        .iter()
        .enumerate()
        .map(|(index, config)| {
            if config.policy_type.is_none() {
                return Err(EngineError::validation(
                    format!("health_policies.{index}.type"),
                    "required",
                ));
            }
            mapper.build(config)
        })
        .collect()
}

fn policy_matches(observed: &HealthPolicyModel, desired: &HealthPolicyModel) -> bool {
    fn same_if_set<T: PartialEq>(observed: &Option<T>, desired: &Option<T>) -> bool {
        desired.is_none() || observed == desired
    }

    same_if_set(&observed.health_check, &desired.health_check)
        && same_if_set(&observed.interval, &desired.interval)
        && same_if_set(&observed.healthy_threshold, &desired.healthy_threshold)
        && (desired.path.is_empty() || observed.path == desired.path)
}

/// Health check policies are keyed by their type; one policy per type
pub fn health_policy_collection() -> CollectionDescriptor<String, HealthPolicyModel> {
    CollectionDescriptor {
        kind: "health check policy",
        key_of: |p| p.policy_type.clone(),
        equal: policy_matches,
        id_of: |p| p.policy_id.clone(),
    }
}
