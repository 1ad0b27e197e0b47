//! Job root initialization and template listing.

use anyhow::Result;
use console::style;

use conductor::config::Config;
use conductor::init::{init_root, is_initialized};
use conductor::phase::TemplateRegistry;

pub fn cmd_init(config: &Config) -> Result<()> {
    let was_initialized = is_initialized(&config.root);

    let result = init_root(&config.root)?;

    if result.created {
        println!("Initialized conductor root at {}", result.root.display());
        println!();
        println!("Created directory structure:");
        println!("  conductor.toml  # Settings (use `conductor config show`)");
        println!("  active/         # Jobs in progress");
        println!("  archive/        # Finished jobs");
        println!("  workflows/      # Your workflow templates (*.json)");
        println!("  logs/           # Log files");
        println!();
        println!("Next steps:");
        println!("  1. Map collaborators to commands in conductor.toml");
        println!("  2. Run `conductor start <template> --subject \"...\"`");
    } else if was_initialized {
        println!("Conductor root already initialized at {}", result.root.display());
        println!("Directory structure verified.");
    } else {
        println!("Completed conductor initialization at {}", result.root.display());
    }

    Ok(())
}

pub fn cmd_templates(config: &Config) -> Result<()> {
    let registry = TemplateRegistry::load(&config.workflows_dir)?;

    println!();
    for template in registry.iter() {
        println!(
            "{} {}",
            style(&template.name).bold(),
            style(format!("(id prefix: {})", template.id_prefix)).dim()
        );
        if !template.description.is_empty() {
            println!("  {}", template.description);
        }
        let phases: Vec<&str> = template.phases.iter().map(|p| p.name.as_str()).collect();
        println!("  phases: {}", phases.join(" → "));
        if !template.variables.is_empty() {
            let vars: Vec<String> = template
                .variables
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            println!("  variables: {}", vars.join(", "));
        }
        println!();
    }
    Ok(())
}
