//! Desired-state configuration of a load balancer and its pool

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub name: Option<String>,
    pub address_type: Option<String>,
    pub spec: Option<String>,
    pub vpc_id: Option<String>,
    pub vswitch_id: Option<String>,
    /// Pay-by-bandwidth cap (Mbps); conflicts with `bandwidth_package_id`
    pub bandwidth: Option<i64>,
    pub bandwidth_package_id: Option<String>,
    pub deletion_protection: Option<bool>,
    /// At most one listener block
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub listener: Vec<ListenerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub protocol: Option<String>,
    pub port: Option<i64>,
    pub backend_port: Option<i64>,
    pub idle_timeout: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberConfig {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub weight: Option<u32>,
    pub description: Option<String>,
}

impl MemberConfig {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: Some(ip.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicyConfig {
    #[serde(rename = "type")]
    pub policy_type: Option<String>,
    pub health_check: Option<bool>,
    pub interval: Option<i64>,
    pub healthy_threshold: Option<i64>,
    pub path: Option<String>,
}

/// Desired membership of one server pool, as read from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub members: Vec<MemberConfig>,
    pub health_policies: Vec<HealthPolicyConfig>,
}
