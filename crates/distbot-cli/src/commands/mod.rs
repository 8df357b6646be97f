//! CLI command implementations.

pub mod allowlist;
pub mod prompt;

use anyhow::{Context, Result};

pub fn validate(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;
    match distbot_config::parse_package_config(&content) {
        Ok(config) => {
            println!("Configuration is valid ({} jobs)", config.jobs.len());
            for job in &config.jobs {
                println!("  {} on {}", job.job, job.trigger);
            }
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
