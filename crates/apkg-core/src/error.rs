//! Archive error handling
//!
//! Typed errors for every stage of reading an archive: extraction,
//! schema loading, and record joining.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading an archive
#[derive(Error, Debug)]
pub enum ApkgError {
    /// The archive file does not exist
    #[error("Archive not found: '{path}'")]
    ArchiveNotFound { path: PathBuf },

    /// The archive is not a valid zip file or failed to decompress
    #[error("Archive '{path}' is not a valid deck package: {source}")]
    ArchiveCorrupt {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Neither known database filename was present after extraction
    #[error("No collection database found in '{dir}' (looked for {})", crate::archive::DATABASE_NAMES.join(", "))]
    DatabaseNotFound { dir: PathBuf },

    /// The `col` table is empty or its JSON blobs could not be parsed
    #[error("Invalid collection schema: {details}")]
    SchemaParse { details: String },

    /// A note references a model that is not in the schema
    #[error("Unknown model {mid} referenced by note {note_id}")]
    UnknownModel { mid: i64, note_id: i64 },

    /// A card references a deck that is not in the schema
    #[error("Unknown deck {did} referenced by card {card_id}")]
    UnknownDeck { did: i64, card_id: i64 },

    /// Lookup by id found no row
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: i64 },

    /// A note has a different number of field values than its model has fields
    #[error("Note {note_id} has {actual} field value(s) but model '{model}' defines {expected}")]
    FieldCountMismatch {
        note_id: i64,
        model: String,
        expected: usize,
        actual: usize,
    },

    /// Failed to create the extraction directory or move the database
    #[error("Failed to extract '{path}': {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ApkgError {
    /// Create an error from an I/O error on the archive path
    ///
    /// A missing file becomes `ArchiveNotFound`; anything else is an
    /// extraction failure.
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => ApkgError::ArchiveNotFound { path },
            _ => ApkgError::Extract {
                path,
                source: error,
            },
        }
    }

    /// Whether this error was caused by the archive's content rather than
    /// the environment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ApkgError::ArchiveCorrupt { .. }
                | ApkgError::DatabaseNotFound { .. }
                | ApkgError::SchemaParse { .. }
                | ApkgError::UnknownModel { .. }
                | ApkgError::UnknownDeck { .. }
                | ApkgError::FieldCountMismatch { .. }
        )
    }
}

/// Result type for archive operations
pub type ApkgResult<T> = Result<T, ApkgError>;
