//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::path::Path;

use serde::Serialize;

use apkg_core::{Card, Deck, ExportResult, Model, Note};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a list of note types with their fields
    pub fn print_models(&self, models: &[Model]) {
        match self.format {
            OutputFormat::Human => {
                if models.is_empty() {
                    println!("No note types found.");
                    return;
                }
                for model in models {
                    println!(
                        "{} | {} | {}",
                        model.id,
                        truncate(&model.name, 30),
                        model.field_names().join(", ")
                    );
                }
                println!("\n{} note type(s)", models.len());
            }
            OutputFormat::Json => print_json(&models),
            OutputFormat::Quiet => {
                for model in models {
                    println!("{}", model.name);
                }
            }
        }
    }

    /// Print a list of decks
    pub fn print_decks(&self, decks: &[Deck]) {
        match self.format {
            OutputFormat::Human => {
                if decks.is_empty() {
                    println!("No decks found.");
                    return;
                }
                for deck in decks {
                    println!("{} | {}", deck.id, deck.name);
                }
                println!("\n{} deck(s)", decks.len());
            }
            OutputFormat::Json => print_json(&decks),
            OutputFormat::Quiet => {
                for deck in decks {
                    println!("{}", deck.name);
                }
            }
        }
    }

    /// Print a single note with every field
    pub fn print_note(&self, note: &Note) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", note.id);
                println!("Type:     {} ({})", note.model, note.mid);
                println!("Modified: {}", note.modified.format("%Y-%m-%d %H:%M"));
                if !note.tags.trim().is_empty() {
                    println!("Tags:     {}", note.tag_list().join(", "));
                }
                println!();
                for (name, value) in note.record.iter() {
                    println!("── {} ──", name);
                    println!("{}", value);
                }
            }
            OutputFormat::Json => print_json(note),
            OutputFormat::Quiet => {
                println!("{}", note.id);
            }
        }
    }

    /// Print a list of notes, one line each
    pub fn print_notes(&self, notes: &[Note]) {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return;
                }
                for note in notes {
                    let first = note.record.iter().next().map(|(_, v)| v).unwrap_or("");
                    println!(
                        "{} | {} | {}",
                        note.id,
                        truncate(&note.model, 20),
                        truncate_line(first, 50)
                    );
                }
                println!("\n{} note(s)", notes.len());
            }
            OutputFormat::Json => print_json(&notes),
            OutputFormat::Quiet => {
                for note in notes {
                    println!("{}", note.id);
                }
            }
        }
    }

    /// Print a single card with its note
    pub fn print_card(&self, card: &Card) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", card.id);
                println!("Deck:     {}", card.deck.name);
                println!("Template: {}", card.ord);
                println!("Due:      {}", card.due);
                println!("Interval: {} day(s)", card.interval);
                println!("Reviews:  {} ({} lapse(s))", card.reps, card.lapses);
                println!();
                println!("── Note ──");
                self.print_note(&card.note);
            }
            OutputFormat::Json => print_json(card),
            OutputFormat::Quiet => {
                println!("{}", card.id);
            }
        }
    }

    /// Print a list of cards, one line each
    pub fn print_cards(&self, cards: &[Card]) {
        match self.format {
            OutputFormat::Human => {
                if cards.is_empty() {
                    println!("No cards found.");
                    return;
                }
                for card in cards {
                    let first = card.note.record.iter().next().map(|(_, v)| v).unwrap_or("");
                    println!(
                        "{} | ord {} | {} | {}",
                        card.id,
                        card.ord,
                        truncate(&card.deck.name, 20),
                        truncate_line(first, 40)
                    );
                }
                println!("\n{} card(s)", cards.len());
            }
            OutputFormat::Json => print_json(&cards),
            OutputFormat::Quiet => {
                for card in cards {
                    println!("{}", card.id);
                }
            }
        }
    }

    /// Print the outcome of an export
    ///
    /// With no destination file, JSON mode prints the tables themselves.
    pub fn print_export(&self, result: &ExportResult, written_to: Option<&Path>) {
        match self.format {
            OutputFormat::Human => {
                if result.is_empty() {
                    println!("Nothing to export.");
                    return;
                }
                for table in result.tables() {
                    println!("{} ({} row(s))", table.name, table.data_len());
                }
                if let Some(path) = written_to {
                    println!();
                    println!("✓ Wrote {}", path.display());
                }
            }
            OutputFormat::Json => match written_to {
                Some(path) => {
                    let sheets: Vec<_> = result
                        .tables()
                        .iter()
                        .map(|t| serde_json::json!({"name": t.name, "rows": t.data_len()}))
                        .collect();
                    print_json(&serde_json::json!({"path": path, "sheets": sheets}));
                }
                None => print_json(result),
            },
            OutputFormat::Quiet => {
                if let Some(path) = written_to {
                    println!("{}", path.display());
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
