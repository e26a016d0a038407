//! Archive reader session
//!
//! `ApkgReader` owns everything a session acquires: the extraction
//! directory and a read-only connection to the collection database. Both
//! are released when the reader is dropped (connection first), on every
//! exit path. `close` does the same but reports release failures.
//!
//! ## Usage
//!
//! ```ignore
//! let reader = ApkgReader::open("deck.apkg")?;
//!
//! for note in reader.notes() {
//!     let note = note?;
//!     println!("{}: {:?}", note.id, note.record.get("Front"));
//! }
//!
//! let tables = reader.export(&ExportOptions::default())?;
//! reader.close()?;
//! ```

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use crate::archive::{extract, locate_database, relocate_database, ExtractDir};
use crate::error::{ApkgError, ApkgResult};
use crate::export::{export_tables, ExportOptions, ExportResult};
use crate::models::{split_fields, timestamp, Card, Deck, FieldRecord, Model, Note};
use crate::schema::{load_schema, Schema};

/// Rows fetched per query while scanning a table
const PAGE_SIZE: i64 = 256;

const NOTE_COLUMNS: &str = "id, guid, mid, mod, tags, flds";
const CARD_COLUMNS: &str = "id, nid, did, ord, mod, type, queue, due, ivl, reps, lapses";

/// Where to extract to and where to put the database
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Move the collection database here before opening it
    pub database_path: Option<PathBuf>,
    /// Extract into this directory instead of a temporary one
    pub extract_to: Option<PathBuf>,
}

/// A read-only session over one deck archive
pub struct ApkgReader {
    // Declared before `extract_dir` so the connection closes first on drop.
    conn: Connection,
    schema: Schema,
    archive_path: PathBuf,
    database_path: PathBuf,
    extract_dir: ExtractDir,
}

impl ApkgReader {
    /// Open an archive, extracting it to a temporary directory
    pub fn open(archive_path: impl AsRef<Path>) -> ApkgResult<Self> {
        Self::open_with(archive_path, OpenOptions::default())
    }

    /// Open an archive with explicit extraction and database locations
    pub fn open_with(archive_path: impl AsRef<Path>, options: OpenOptions) -> ApkgResult<Self> {
        let archive_path = archive_path.as_ref().to_path_buf();
        if !archive_path.is_file() {
            return Err(ApkgError::ArchiveNotFound { path: archive_path });
        }

        let extract_dir = ExtractDir::create(options.extract_to.as_deref())?;
        extract(&archive_path, extract_dir.path())?;

        let mut database_path = locate_database(extract_dir.path())?;
        if let Some(target) = options.database_path.as_deref() {
            database_path = relocate_database(&database_path, target)?;
        }

        let conn = Connection::open_with_flags(
            &database_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let schema = load_schema(&conn)?;

        info!(
            "Opened {:?} ({} models, {} decks) in {:?}",
            archive_path,
            schema.models().len(),
            schema.decks().len(),
            extract_dir.path()
        );

        Ok(Self {
            conn,
            schema,
            archive_path,
            database_path,
            extract_dir,
        })
    }

    /// Close the connection and remove a temporary extraction directory
    pub fn close(self) -> ApkgResult<()> {
        let Self {
            conn,
            archive_path,
            extract_dir,
            ..
        } = self;

        conn.close().map_err(|(_, e)| ApkgError::Database(e))?;
        extract_dir.close()?;

        info!("Closed {:?}", archive_path);
        Ok(())
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn extract_dir(&self) -> &Path {
        self.extract_dir.path()
    }

    // ==================== Schema ====================

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// All models, in collection order
    pub fn models(&self) -> &[Model] {
        self.schema.models()
    }

    /// All decks, in collection order
    pub fn decks(&self) -> &[Deck] {
        self.schema.decks()
    }

    pub fn model_by_id(&self, id: impl ToString) -> Option<&Model> {
        self.schema.model_by_id(id)
    }

    pub fn deck_by_id(&self, id: impl ToString) -> Option<&Deck> {
        self.schema.deck_by_id(id)
    }

    // ==================== Notes ====================

    /// Get a note by id
    pub fn note_by_id(&self, id: i64) -> ApkgResult<Note> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM notes WHERE id = ?", NOTE_COLUMNS),
                params![id],
                NoteRow::from_row,
            )
            .optional()?
            .ok_or(ApkgError::NotFound { kind: "Note", id })?;

        self.format_note(row)
    }

    /// Iterate every note in ascending id order
    ///
    /// Rows are fetched lazily in pages; each call starts a fresh scan.
    pub fn notes(&self) -> impl Iterator<Item = ApkgResult<Note>> + '_ {
        Scan::new(self, Self::note_page).map(move |row| row.and_then(|r| self.format_note(r)))
    }

    pub fn note_count(&self) -> ApkgResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?)
    }

    // ==================== Cards ====================

    /// Get a card by id, joined with its note and deck
    pub fn card_by_id(&self, id: i64) -> ApkgResult<Card> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM cards WHERE id = ?", CARD_COLUMNS),
                params![id],
                CardRow::from_row,
            )
            .optional()?
            .ok_or(ApkgError::NotFound { kind: "Card", id })?;

        self.format_card(row)
    }

    /// Iterate every card in ascending id order
    pub fn cards(&self) -> impl Iterator<Item = ApkgResult<Card>> + '_ {
        Scan::new(self, Self::card_page).map(move |row| row.and_then(|r| self.format_card(r)))
    }

    /// Iterate cards at one template position
    ///
    /// Filtering happens on the fetched rows, before the note and deck are
    /// joined, so cards at other positions are never formatted.
    pub fn cards_by_ord(&self, ord: i64) -> impl Iterator<Item = ApkgResult<Card>> + '_ {
        Scan::new(self, Self::card_page)
            .filter(move |row| row.as_ref().map_or(true, |r| r.ord == ord))
            .map(move |row| row.and_then(|r| self.format_card(r)))
    }

    pub fn card_count(&self) -> ApkgResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?)
    }

    /// Distinct template positions used by cards, ascending
    pub fn template_positions(&self) -> ApkgResult<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT ord FROM cards ORDER BY ord")?;
        let positions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(positions)
    }

    // ==================== Export ====================

    /// Project cards into per-model tables
    pub fn export(&self, options: &ExportOptions) -> ApkgResult<ExportResult> {
        export_tables(self, options)
    }

    // ==================== Private helpers ====================

    fn note_page(&self, after: i64) -> ApkgResult<Vec<NoteRow>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM notes WHERE id > ? ORDER BY id LIMIT ?",
            NOTE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![after, PAGE_SIZE], NoteRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn card_page(&self, after: i64) -> ApkgResult<Vec<CardRow>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM cards WHERE id > ? ORDER BY id LIMIT ?",
            CARD_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![after, PAGE_SIZE], CardRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Join a note row with its model's field names
    fn format_note(&self, row: NoteRow) -> ApkgResult<Note> {
        let model = self
            .schema
            .model_by_id(row.mid)
            .ok_or(ApkgError::UnknownModel {
                mid: row.mid,
                note_id: row.id,
            })?;

        let names = model.field_names();
        let values = split_fields(&row.flds);
        if names.len() != values.len() {
            return Err(ApkgError::FieldCountMismatch {
                note_id: row.id,
                model: model.name.clone(),
                expected: names.len(),
                actual: values.len(),
            });
        }

        let record = FieldRecord::from_pairs(
            names
                .into_iter()
                .zip(values.iter().map(|v| v.to_string()))
                .collect(),
        );

        Ok(Note {
            id: row.id,
            guid: row.guid,
            mid: row.mid,
            model: model.name.clone(),
            modified: timestamp(row.modified),
            tags: row.tags,
            flds: row.flds,
            record,
        })
    }

    /// Join a card row with its note and deck
    fn format_card(&self, row: CardRow) -> ApkgResult<Card> {
        let note = self.note_by_id(row.nid)?;
        let deck = self
            .schema
            .deck_by_id(row.did)
            .ok_or(ApkgError::UnknownDeck {
                did: row.did,
                card_id: row.id,
            })?
            .clone();

        debug!("Formatted card {} (note {}, ord {})", row.id, row.nid, row.ord);

        Ok(Card {
            id: row.id,
            nid: row.nid,
            did: row.did,
            ord: row.ord,
            modified: timestamp(row.modified),
            card_type: row.card_type,
            queue: row.queue,
            due: row.due,
            interval: row.interval,
            reps: row.reps,
            lapses: row.lapses,
            note,
            deck,
        })
    }
}

// ==================== Internal structs ====================

trait KeyedRow {
    fn key(&self) -> i64;
}

struct NoteRow {
    id: i64,
    guid: String,
    mid: i64,
    modified: i64,
    tags: String,
    flds: String,
}

impl NoteRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            guid: row.get(1)?,
            mid: row.get(2)?,
            modified: row.get(3)?,
            tags: row.get(4)?,
            flds: row.get(5)?,
        })
    }
}

impl KeyedRow for NoteRow {
    fn key(&self) -> i64 {
        self.id
    }
}

struct CardRow {
    id: i64,
    nid: i64,
    did: i64,
    ord: i64,
    modified: i64,
    card_type: i64,
    queue: i64,
    due: i64,
    interval: i64,
    reps: i64,
    lapses: i64,
}

impl CardRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            nid: row.get(1)?,
            did: row.get(2)?,
            ord: row.get(3)?,
            modified: row.get(4)?,
            card_type: row.get(5)?,
            queue: row.get(6)?,
            due: row.get(7)?,
            interval: row.get(8)?,
            reps: row.get(9)?,
            lapses: row.get(10)?,
        })
    }
}

impl KeyedRow for CardRow {
    fn key(&self) -> i64 {
        self.id
    }
}

/// Keyset-paginated table scan
///
/// Holds no statement between pages, so any number of scans can run over
/// the same reader.
struct Scan<'r, R> {
    reader: &'r ApkgReader,
    fetch: fn(&ApkgReader, i64) -> ApkgResult<Vec<R>>,
    buffer: VecDeque<R>,
    after: i64,
    exhausted: bool,
}

impl<'r, R: KeyedRow> Scan<'r, R> {
    fn new(reader: &'r ApkgReader, fetch: fn(&ApkgReader, i64) -> ApkgResult<Vec<R>>) -> Self {
        Self {
            reader,
            fetch,
            buffer: VecDeque::new(),
            after: i64::MIN,
            exhausted: false,
        }
    }
}

impl<R: KeyedRow> Iterator for Scan<'_, R> {
    type Item = ApkgResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match (self.fetch)(self.reader, self.after) {
                Ok(page) => {
                    self.exhausted = (page.len() as i64) < PAGE_SIZE;
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let row = self.buffer.pop_front()?;
        self.after = row.key();
        Some(Ok(row))
    }
}
