//! Configuration view and validation commands: `conductor config`.

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use conductor::conductor_config::{CONFIG_FILE_NAME, ConductorToml};
use conductor::config::Config;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Conductor Configuration");
            println!("=======================");
            println!();
            println!("Root: {}", config.root.display());

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found, using defaults.", CONFIG_FILE_NAME);
            }
            println!();

            // Effective values include environment overrides
            println!("Effective values (with env overrides):");
            println!();
            let rendered = toml::to_string_pretty(&config.settings)
                .context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }
            println!();

            if !config_path.exists() {
                println!("Run 'conductor config init' to create a {} file.", CONFIG_FILE_NAME);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE_NAME);
                return Ok(());
            }

            let toml = ConductorToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE_NAME, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.root).with_context(|| {
                format!("Failed to create directory: {}", config.root.display())
            })?;
            std::fs::write(&config_path, ConductorToml::default_file_contents()).with_context(
                || format!("Failed to write config file: {}", config_path.display()),
            )?;

            println!("Created {} at {}", CONFIG_FILE_NAME, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] max_attempts, retry_delay_secs, archive_on_success");
            println!("  - [logging] level, format, to_file");
            println!("  - [collaborators.<name>] command, working_dir");
            println!();
        }
    }

    Ok(())
}
