//! Elastic load balancer resources for Converge
//!
//! A load balancer with one optional listener, plus two keyed
//! sub-collections of its server pool:
//!
//! - members, keyed by `(ip, port)`
//! - health check policies, keyed by policy type
//!
//! Everything type-specific lives in the descriptor tables in
//! [`descriptor`]; the engine does the mapping, diffing and waiting.
//!
//! # Example
//!
//! ```ignore
//! use converge_config::load_settings;
//! use converge_elb::{ElbProvider, MemberConfig};
//!
//! let (settings, _) = load_settings()?;
//! let provider = ElbProvider::new(&settings, |region| MyClient::connect(region));
//!
//! let summary = provider
//!     .sync_members("eu-1", "pool-1", &[MemberConfig::new("10.0.0.1", 80)])
//!     .await?;
//! println!("{summary}");
//! ```

pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod model;
pub mod provider;

pub use client::{ElbClient, HealthPolicies, LoadBalancerFilter, LoadBalancers, Members};
pub use config::{HealthPolicyConfig, ListenerConfig, LoadBalancerConfig, MemberConfig, PoolConfig};
pub use descriptor::MemberKey;
pub use error::{ElbError, Result};
pub use model::{
    HealthPolicyModel, ListenerModel, LoadBalancerModel, MemberModel, health_policies_from_json,
    members_from_json,
};
pub use provider::{ElbProvider, plan_health_policies, plan_members};
