//! Export command handler

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use apkg_core::{Config, ExportOptions};

use super::open_reader;
use crate::output::Output;
use crate::xlsx;

/// Flags for `export`
#[derive(Debug, Default)]
pub struct ExportArgs {
    pub archive: PathBuf,
    pub output: Option<PathBuf>,
    pub ords: Vec<i64>,
    pub no_header: bool,
    pub no_deck: bool,
    pub keep_empty: bool,
    pub extract_to: Option<PathBuf>,
    pub database: Option<PathBuf>,
}

impl ExportArgs {
    /// Apply the flags on top of the configured defaults
    pub fn options(&self, defaults: &ExportOptions) -> ExportOptions {
        let mut options = defaults.clone();
        if !self.ords.is_empty() {
            options.template_positions = self.ords.clone();
        }
        if self.no_header {
            options.include_header = false;
        }
        if self.no_deck {
            options.include_deck = false;
        }
        if self.keep_empty {
            options.drop_empty_models = false;
        }
        options
    }
}

/// Export an archive's cards as tables
pub fn run(args: ExportArgs, config: &Config, output: &Output) -> Result<()> {
    let options = args.options(&config.export);
    let reader = open_reader(
        &args.archive,
        config,
        args.extract_to.clone(),
        args.database.clone(),
    )?;

    let result = reader
        .export(&options)
        .with_context(|| format!("Failed to export {}", args.archive.display()))?;
    reader.close().context("Failed to clean up extracted archive")?;

    if let Some(path) = &args.output {
        xlsx::write_workbook(&result, path)?;
        info!("Wrote {} sheet(s) to {:?}", result.len(), path);
    }

    output.print_export(&result, args.output.as_deref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = ExportArgs {
            ords: vec![1, 0],
            no_header: true,
            keep_empty: true,
            ..Default::default()
        };

        let options = args.options(&ExportOptions::default());

        assert_eq!(options.template_positions, vec![1, 0]);
        assert!(!options.include_header);
        assert!(options.include_deck);
        assert!(!options.drop_empty_models);
    }

    #[test]
    fn test_no_flags_keep_configured_defaults() {
        let defaults = ExportOptions {
            template_positions: vec![2],
            include_deck: false,
            ..Default::default()
        };

        let options = ExportArgs::default().options(&defaults);
        assert_eq!(options, defaults);
    }
}
