//! Builds deck packages on disk for tests
//!
//! Mirrors the layout real exports use: a SQLite collection with `col`,
//! `notes` and `cards` tables, zipped together with a `media` manifest.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde_json::json;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const SCHEMA: &str = r#"
CREATE TABLE col (
    id      integer primary key,
    crt     integer not null,
    mod     integer not null,
    ver     integer not null,
    models  text not null,
    decks   text not null
);
CREATE TABLE notes (
    id      integer primary key,
    guid    text not null,
    mid     integer not null,
    mod     integer not null,
    usn     integer not null,
    tags    text not null,
    flds    text not null,
    sfld    text not null,
    csum    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE cards (
    id      integer primary key,
    nid     integer not null,
    did     integer not null,
    ord     integer not null,
    mod     integer not null,
    usn     integer not null,
    type    integer not null,
    queue   integer not null,
    due     integer not null,
    ivl     integer not null,
    factor  integer not null,
    reps    integer not null,
    lapses  integer not null,
    left    integer not null,
    odue    integer not null,
    odid    integer not null,
    flags   integer not null,
    data    text not null
);
"#;

pub struct FixtureModel {
    pub id: i64,
    pub name: String,
    /// Field names in template order
    pub fields: Vec<String>,
}

pub struct FixtureNote {
    pub id: i64,
    pub mid: i64,
    pub flds: String,
    pub tags: String,
}

pub struct FixtureCard {
    pub id: i64,
    pub nid: i64,
    pub did: i64,
    pub ord: i64,
}

/// Describes the content of a package to write
pub struct Fixture {
    pub models: Vec<FixtureModel>,
    pub decks: Vec<(i64, String)>,
    pub notes: Vec<FixtureNote>,
    pub cards: Vec<FixtureCard>,
    pub database_name: &'static str,
    pub with_col_row: bool,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            decks: vec![(1, "Default".to_string())],
            notes: Vec::new(),
            cards: Vec::new(),
            database_name: "collection.anki21",
            with_col_row: true,
        }
    }
}

impl Fixture {
    pub fn model(mut self, id: i64, name: &str, fields: &[&str]) -> Self {
        self.models.push(FixtureModel {
            id,
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn deck(mut self, id: i64, name: &str) -> Self {
        self.decks.push((id, name.to_string()));
        self
    }

    pub fn note(mut self, id: i64, mid: i64, fields: &[&str], tags: &str) -> Self {
        self.notes.push(FixtureNote {
            id,
            mid,
            flds: fields.join("\u{1f}"),
            tags: tags.to_string(),
        });
        self
    }

    pub fn card(mut self, id: i64, nid: i64, did: i64, ord: i64) -> Self {
        self.cards.push(FixtureCard { id, nid, did, ord });
        self
    }

    /// Write the collection database to `path`
    pub fn write_database(&self, path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        if self.with_col_row {
            let mut models = serde_json::Map::new();
            for model in &self.models {
                // Stored out of order on purpose; readers must sort by ord.
                let mut flds: Vec<_> = model
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(ord, name)| json!({"name": name, "ord": ord, "sticky": false}))
                    .collect();
                flds.reverse();
                models.insert(
                    model.id.to_string(),
                    json!({"id": model.id, "name": model.name, "type": 0, "flds": flds}),
                );
            }

            let mut decks = serde_json::Map::new();
            for (id, name) in &self.decks {
                decks.insert(
                    id.to_string(),
                    json!({"id": id, "name": name, "collapsed": false, "desc": ""}),
                );
            }

            conn.execute(
                "INSERT INTO col (id, crt, mod, ver, models, decks) VALUES (1, 0, 0, 11, ?, ?)",
                params![
                    serde_json::Value::Object(models).to_string(),
                    serde_json::Value::Object(decks).to_string()
                ],
            )
            .unwrap();
        }

        for note in &self.notes {
            let sfld = note.flds.split('\u{1f}').next().unwrap_or("").to_string();
            conn.execute(
                "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
                 VALUES (?, ?, ?, ?, -1, ?, ?, ?, 0, 0, '')",
                params![
                    note.id,
                    format!("guid{}", note.id),
                    note.mid,
                    1_600_000_000i64,
                    note.tags,
                    note.flds,
                    sfld
                ],
            )
            .unwrap();
        }

        for card in &self.cards {
            conn.execute(
                "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                                    reps, lapses, left, odue, odid, flags, data)
                 VALUES (?, ?, ?, ?, 1600000000, -1, 0, 0, ?, 0, 2500, 0, 0, 0, 0, 0, 0, '')",
                params![card.id, card.nid, card.did, card.ord, card.id],
            )
            .unwrap();
        }
    }

    /// Write a complete package into `dir` and return its path
    pub fn build(&self, dir: &Path) -> PathBuf {
        let db_path = dir.join("fixture.db");
        self.write_database(&db_path);
        let archive = dir.join("deck.apkg");
        write_zip(
            &archive,
            &[
                (self.database_name, std::fs::read(&db_path).unwrap()),
                ("media", b"{\"0\": \"image.png\"}".to_vec()),
                ("0", vec![0x89, b'P', b'N', b'G']),
            ],
        );
        std::fs::remove_file(&db_path).unwrap();
        archive
    }
}

/// Zip the given entries into `path`
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// A two-model package with two decks and both template positions
///
/// - "Basic" (Front, Back): notes 100, 101, 102
/// - "Cloze" (Text, Extra): note 200
/// - cards 1000.. at ord 0, 2000.. at ord 1
pub fn sample() -> Fixture {
    Fixture::default()
        .model(10, "Basic", &["Front", "Back"])
        .model(20, "Cloze", &["Text", "Extra"])
        .deck(2, "Spanish")
        .note(100, 10, &["hola", "hello"], " greeting ")
        .note(101, 10, &["adios", "goodbye"], "")
        .note(102, 10, &["gato", "cat"], " animal noun ")
        .note(200, 20, &["{{c1::Madrid}} is the capital", ""], "geo")
        .card(1000, 100, 2, 0)
        .card(1001, 101, 2, 0)
        .card(1002, 102, 1, 0)
        .card(1003, 200, 1, 0)
        .card(2000, 100, 2, 1)
        .card(2001, 102, 1, 1)
}

/// One eight-field model with `count` notes, each with one primary card
pub fn phrases(count: i64) -> Fixture {
    let fields = [
        "Phrase", "Reading", "Meaning", "Example", "Translation", "Audio", "Notes", "Source",
    ];
    let mut fixture = Fixture::default().model(42, "Japanese Phrase", &fields);
    for i in 0..count {
        let values: Vec<String> = fields.iter().map(|f| format!("{} {}", f, i)).collect();
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        fixture = fixture
            .note(5000 + i, 42, &values, "jp")
            .card(9000 + i, 5000 + i, 1, 0);
    }
    fixture
}
