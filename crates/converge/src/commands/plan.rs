use super::{read_text, read_yaml};
use colored::Colorize;
use converge_elb::{
    HealthPolicyModel, MemberModel, PoolConfig, health_policies_from_json, members_from_json,
    plan_health_policies, plan_members,
};
use converge_engine::ReconcilePlan;
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;

fn describe_member(member: &MemberModel) -> String {
    let mut text = format!("{}:{}", member.ip, member.port);
    if let Some(weight) = member.weight {
        text.push_str(&format!(" weight={}", weight));
    }
    if !member.description.is_empty() {
        text.push_str(&format!(" \"{}\"", member.description));
    }
    text
}

fn describe_policy(policy: &HealthPolicyModel) -> String {
    let mut text = policy.policy_type.clone();
    if let Some(enabled) = policy.health_check {
        text.push_str(&format!(" health_check={}", enabled));
    }
    if let Some(interval) = policy.interval {
        text.push_str(&format!(" interval={}s", interval));
    }
    if let Some(threshold) = policy.healthy_threshold {
        text.push_str(&format!(" healthy_threshold={}", threshold));
    }
    if !policy.path.is_empty() {
        text.push_str(&format!(" path={}", policy.path));
    }
    text
}

fn print_plan<K, T>(
    kind: &str,
    plan: &ReconcilePlan<K, T>,
    describe: impl Fn(&T) -> String,
    json: bool,
) -> anyhow::Result<()>
where
    K: Display + Serialize,
    T: Serialize,
{
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    println!("{}", format!("Plan for {}:", kind).bold());
    if !plan.has_changes() {
        println!("  {}", "No changes. Observed state matches.".green());
    }
    for deletion in &plan.to_delete {
        println!("  {} {}", "-".red().bold(), describe(&deletion.observed).red());
    }
    for update in &plan.to_update {
        println!(
            "  {} {}: {} → {}",
            "~".yellow().bold(),
            update.key.to_string().yellow(),
            describe(&update.observed).dimmed(),
            describe(&update.desired)
        );
    }
    for item in &plan.to_create {
        println!("  {} {}", "+".green().bold(), describe(item).green());
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
    Ok(())
}

/// Preview the member plan of a pool from a desired YAML file and an
/// observed JSON listing
pub fn handle_members(desired: &Path, observed: &Path, json: bool) -> anyhow::Result<()> {
    let pool: PoolConfig = read_yaml(desired)?;
    let observed = members_from_json(&read_text(observed)?)?;
    tracing::debug!(
        "{} desired members, {} observed",
        pool.members.len(),
        observed.len()
    );

    let plan = plan_members(&pool.members, &observed)?;
    print_plan("pool members", &plan, describe_member, json)
}

/// Preview the health check policy plan of a pool
pub fn handle_health_policies(desired: &Path, observed: &Path, json: bool) -> anyhow::Result<()> {
    let pool: PoolConfig = read_yaml(desired)?;
    let observed = health_policies_from_json(&read_text(observed)?)?;
    tracing::debug!(
        "{} desired policies, {} observed",
        pool.health_policies.len(),
        observed.len()
    );

    let plan = plan_health_policies(&pool.health_policies, &observed)?;
    print_plan("health check policies", &plan, describe_policy, json)
}
