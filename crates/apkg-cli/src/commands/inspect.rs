//! Read-only inspection commands

use std::path::Path;

use anyhow::{Context, Result};

use apkg_core::{ApkgReader, Config};

use super::open_reader;
use crate::output::Output;

fn open(archive: &Path, config: &Config) -> Result<ApkgReader> {
    open_reader(archive, config, None, None)
}

/// List note types
pub fn models(archive: &Path, config: &Config, output: &Output) -> Result<()> {
    let reader = open(archive, config)?;
    output.print_models(reader.models());
    reader.close()?;
    Ok(())
}

/// List decks
pub fn decks(archive: &Path, config: &Config, output: &Output) -> Result<()> {
    let reader = open(archive, config)?;
    output.print_decks(reader.decks());
    reader.close()?;
    Ok(())
}

/// List every note
pub fn notes(archive: &Path, config: &Config, output: &Output) -> Result<()> {
    let reader = open(archive, config)?;
    let notes = reader
        .notes()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read notes")?;
    output.print_notes(&notes);
    reader.close()?;
    Ok(())
}

/// Show one note
pub fn note(archive: &Path, id: i64, config: &Config, output: &Output) -> Result<()> {
    let reader = open(archive, config)?;
    let note = reader.note_by_id(id)?;
    output.print_note(&note);
    reader.close()?;
    Ok(())
}

/// List cards, optionally only those at one template position
pub fn cards(archive: &Path, ord: Option<i64>, config: &Config, output: &Output) -> Result<()> {
    let reader = open(archive, config)?;
    let cards = match ord {
        Some(ord) => reader.cards_by_ord(ord).collect::<Result<Vec<_>, _>>(),
        None => reader.cards().collect::<Result<Vec<_>, _>>(),
    }
    .context("Failed to read cards")?;
    output.print_cards(&cards);
    reader.close()?;
    Ok(())
}

/// Show one card with its note
pub fn card(archive: &Path, id: i64, config: &Config, output: &Output) -> Result<()> {
    let reader = open(archive, config)?;
    let card = reader.card_by_id(id)?;
    output.print_card(&card);
    reader.close()?;
    Ok(())
}
