//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use apkg_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "extract_dir, log_file, bind, upload_dir, upload_ttl_secs, \
                          sweep_interval_secs, max_upload_bytes, include_header, include_deck, \
                          template_positions, drop_empty_models";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to serialize config")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.server.bind);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  extract_dir:         {}", display_opt(&config.extract_dir));
            println!("  log_file:            {}", display_opt(&config.log_file));
            println!();
            println!("  [export]");
            println!("  include_header:      {}", config.export.include_header);
            println!("  include_deck:        {}", config.export.include_deck);
            println!(
                "  template_positions:  {}",
                join_positions(&config.export.template_positions)
            );
            println!("  drop_empty_models:   {}", config.export.drop_empty_models);
            println!();
            println!("  [server]");
            println!("  bind:                {}", config.server.bind);
            println!("  upload_dir:          {}", config.server.upload_dir.display());
            println!("  upload_ttl_secs:     {}", config.server.upload_ttl_secs);
            println!("  sweep_interval_secs: {}", config.server.sweep_interval_secs);
            println!("  max_upload_bytes:    {}", config.server.max_upload_bytes);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "extract_dir" => config.extract_dir = optional_path(value),
        "log_file" => config.log_file = optional_path(value),
        "bind" => {
            if value.trim().is_empty() {
                bail!("bind cannot be empty");
            }
            config.server.bind = value.to_string();
        }
        "upload_dir" => config.server.upload_dir = value.into(),
        "upload_ttl_secs" => {
            config.server.upload_ttl_secs = value
                .parse()
                .context("Invalid value for upload_ttl_secs. Use a number of seconds.")?;
        }
        "sweep_interval_secs" => {
            config.server.sweep_interval_secs = value
                .parse()
                .context("Invalid value for sweep_interval_secs. Use a number of seconds.")?;
        }
        "max_upload_bytes" => {
            config.server.max_upload_bytes = value
                .parse()
                .context("Invalid value for max_upload_bytes. Use a number of bytes.")?;
        }
        "include_header" => {
            config.export.include_header = value
                .parse()
                .context("Invalid value for include_header. Use 'true' or 'false'.")?;
        }
        "include_deck" => {
            config.export.include_deck = value
                .parse()
                .context("Invalid value for include_deck. Use 'true' or 'false'.")?;
        }
        "drop_empty_models" => {
            config.export.drop_empty_models = value
                .parse()
                .context("Invalid value for drop_empty_models. Use 'true' or 'false'.")?;
        }
        "template_positions" => {
            config.export.template_positions = parse_positions(value)?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                VALID_KEYS
            );
        }
    }
    Ok(())
}

fn optional_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.into())
    }
}

/// Parse a comma-separated list such as `0,1`; empty means none
fn parse_positions(value: &str) -> Result<Vec<i64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("Invalid template position '{}'", s))
        })
        .collect()
}

fn join_positions(positions: &[i64]) -> String {
    if positions.is_empty() {
        return "(none)".to_string();
    }
    positions
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn display_opt(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}
