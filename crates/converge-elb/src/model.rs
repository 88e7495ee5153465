//! Wire models of the load balancer API

use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadBalancerModel {
    pub load_balancer_id: String,
    pub load_balancer_name: String,
    /// "internet" or "intranet"
    pub address_type: String,
    pub load_balancer_spec: String,
    pub vpc_id: String,
    pub v_switch_id: String,
    pub bandwidth: Option<i64>,
    pub bandwidth_package_id: String,
    pub deletion_protection: Option<bool>,
    pub load_balancer_status: String,
    pub listener: Option<ListenerModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ListenerModel {
    pub protocol: String,
    pub listener_port: Option<i64>,
    pub backend_port: Option<i64>,
    pub idle_timeout: i64,
}

/// A backend server registered in a server pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MemberModel {
    pub member_id: String,
    pub ip: String,
    pub port: u16,
    pub weight: Option<u32>,
    pub description: String,
}

/// A health check policy attached to a server pool, one per policy type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HealthPolicyModel {
    pub policy_id: String,
    /// "TCP", "UDP" or "HTTP"
    pub policy_type: String,
    pub health_check: Option<bool>,
    pub interval: Option<i64>,
    pub healthy_threshold: Option<i64>,
    pub path: String,
}

/// Parse a JSON array of members as returned by the list API
pub fn members_from_json(json: &str) -> Result<Vec<MemberModel>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json)?)
}

/// Parse a JSON array of health check policies as returned by the list API
pub fn health_policies_from_json(json: &str) -> Result<Vec<HealthPolicyModel>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json)?)
}
