//! Command handlers

pub mod config;
pub mod export;
pub mod inspect;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use apkg_core::{ApkgReader, Config, OpenOptions};

/// Open an archive, extracting where the flags or configuration say
fn open_reader(
    archive: &Path,
    config: &Config,
    extract_to: Option<PathBuf>,
    database: Option<PathBuf>,
) -> Result<ApkgReader> {
    let options = OpenOptions {
        database_path: database,
        extract_to: extract_to.or_else(|| config.extract_dir.clone()),
    };
    ApkgReader::open_with(archive, options)
        .with_context(|| format!("Failed to open {}", archive.display()))
}
