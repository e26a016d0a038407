//! Workbook output
//!
//! Writes an export as an `.xlsx` workbook, one worksheet per note type.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::Workbook;
use tracing::warn;

use apkg_core::ExportResult;

/// Longest worksheet name the format allows
const MAX_SHEET_NAME: usize = 31;

/// Longest string a cell can hold
const MAX_CELL_CHARS: usize = 32_767;

/// Characters not allowed in worksheet names
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Build a workbook from export tables
fn build_workbook(result: &ExportResult) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let names = sheet_names(result.names());

    for (table, sheet_name) in result.tables().iter().zip(names) {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&sheet_name)
            .with_context(|| format!("Invalid sheet name '{}'", sheet_name))?;

        for (r, row) in table.rows.iter().enumerate() {
            let row_index = u32::try_from(r)
                .with_context(|| format!("Too many rows in '{}'", table.name))?;
            for (c, cell) in row.iter().enumerate() {
                let col_index = u16::try_from(c)
                    .with_context(|| format!("Too many columns in '{}'", table.name))?;
                let text = fit_cell(cell);
                if text.len() < cell.len() {
                    warn!(
                        "Cell {}:{} of '{}' cut to {} characters",
                        r, c, sheet_name, MAX_CELL_CHARS
                    );
                }
                worksheet
                    .write_string(row_index, col_index, text)
                    .with_context(|| {
                        format!("Failed to write cell {}:{} of '{}'", r, c, table.name)
                    })?;
            }
        }
    }

    Ok(workbook)
}

/// Cut text to the longest string a cell can hold
fn fit_cell(text: &str) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Write an export to an `.xlsx` file
pub fn write_workbook(result: &ExportResult, path: &Path) -> Result<()> {
    let mut workbook = build_workbook(result)?;
    workbook
        .save(path)
        .with_context(|| format!("Failed to save workbook to {:?}", path))?;
    Ok(())
}

/// Turn table names into valid, unique worksheet names
///
/// Invalid characters become `_`, names are cut to 31 characters, and
/// names that collide (case-insensitively) get a numeric suffix.
pub fn sheet_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for name in names {
        let cleaned: String = name
            .chars()
            .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
            .collect();
        let cleaned = cleaned.trim_matches('\'');
        let base = if cleaned.trim().is_empty() {
            "Sheet".to_string()
        } else {
            cleaned.chars().take(MAX_SHEET_NAME).collect()
        };

        let mut candidate = base.clone();
        let mut n = 2;
        while !seen.insert(candidate.to_lowercase()) {
            let suffix = format!(" ({})", n);
            let keep = MAX_SHEET_NAME - suffix.chars().count();
            candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
            n += 1;
        }
        out.push(candidate);
    }

    out
}
