use colored::Colorize;

pub fn handle(init: bool) -> anyhow::Result<()> {
    if init {
        let path = converge_config::init_global_settings()?;
        println!(
            "{} {}",
            "✓ Global settings file:".green().bold(),
            path.display().to_string().cyan()
        );
    }

    let (settings, source) = converge_config::load_settings()?;
    match source {
        Some(path) => println!("Settings: {}", path.display().to_string().cyan()),
        None => println!("Settings: {}", "(built-in defaults)".dimmed()),
    }
    println!();
    print!("{}", settings.to_yaml()?);
    Ok(())
}
