//! apkg-export core library
//!
//! Reads Anki deck packages (`.apkg`: a zip holding a SQLite collection and
//! media) and projects their notes, cards and decks into tables suitable for
//! spreadsheet export.
//!
//! # Quick Start
//!
//! ```text
//! let reader = ApkgReader::open("deck.apkg")?;
//!
//! // Raw access
//! let note = reader.note_by_id(1_500_000_000_000)?;
//!
//! // Tabular projection, one table per note type
//! let tables = reader.export(&ExportOptions::default())?;
//! reader.close()?;
//! ```
//!
//! # Modules
//!
//! - `archive`: zip extraction and collection database lookup
//! - `schema`: note types and decks from the `col` table
//! - `reader`: the reader session, lookups and scans
//! - `export`: per-note-type tables
//! - `models`: data structures
//! - `config`: application configuration

pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod reader;
pub mod schema;

pub use config::{Config, ServerConfig};
pub use error::{ApkgError, ApkgResult};
pub use export::{ExportOptions, ExportResult, Rows, Table};
pub use models::{Card, Deck, FieldRecord, Model, ModelField, Note};
pub use reader::{ApkgReader, OpenOptions};
pub use schema::Schema;
