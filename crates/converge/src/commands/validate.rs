use super::read_yaml;
use colored::Colorize;
use converge_elb::LoadBalancerConfig;
use converge_elb::descriptor::load_balancer_mapper;
use std::path::Path;

/// Check a load balancer config and show the create request it produces
pub fn handle(path: &Path) -> anyhow::Result<()> {
    println!("{}", "Validating load balancer config...".blue());

    let config: LoadBalancerConfig = read_yaml(path)?;
    let mapper = load_balancer_mapper();
    match mapper.build(&config) {
        Ok(request) => {
            println!("{}", "✓ Config is valid".green().bold());
            println!();
            println!("Configured fields: {}", mapper.configured_paths(&config).join(", "));
            println!();
            println!("Create request:");
            println!("{}", serde_json::to_string_pretty(&request)?);
            Ok(())
        }
        Err(e) => {
            // main reports the error itself
            println!("{}", "✗ Config is invalid".red().bold());
            Err(e.into())
        }
    }
}
