//! Collection schema cache
//!
//! Note types and decks are stored as JSON objects in the single row of the
//! `col` table, keyed by their numeric id as a string. They are loaded once
//! when a reader opens and never change afterwards.

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApkgError, ApkgResult};
use crate::models::{Deck, Model};

/// Models and decks of a collection, in document order
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: Vec<Model>,
    decks: Vec<Deck>,
    model_index: HashMap<String, usize>,
    deck_index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(models: Vec<Model>, decks: Vec<Deck>) -> Self {
        let model_index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        let deck_index = decks
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();

        Self {
            models,
            decks,
            model_index,
            deck_index,
        }
    }

    /// Look up a model by id
    pub fn model_by_id(&self, id: impl ToString) -> Option<&Model> {
        self.model_index
            .get(&id.to_string())
            .map(|&i| &self.models[i])
    }

    /// Look up a deck by id
    pub fn deck_by_id(&self, id: impl ToString) -> Option<&Deck> {
        self.deck_index
            .get(&id.to_string())
            .map(|&i| &self.decks[i])
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn decks(&self) -> &[Deck] {
        &self.decks
    }
}

/// Load models and decks from the `col` table
pub fn load_schema(conn: &Connection) -> ApkgResult<Schema> {
    let row: Option<(String, String)> = conn
        .query_row("SELECT models, decks FROM col LIMIT 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()?;

    let (models_json, decks_json) = row.ok_or_else(|| ApkgError::SchemaParse {
        details: "the col table has no rows".to_string(),
    })?;

    let models = parse_keyed::<Model>("models", &models_json)?
        .into_iter()
        .map(|(id, mut model)| {
            model.id = id;
            model
        })
        .collect();

    let decks = parse_keyed::<Deck>("decks", &decks_json)?
        .into_iter()
        .map(|(id, mut deck)| {
            deck.extra.remove("id");
            deck.id = id;
            deck
        })
        .collect();

    Ok(Schema::new(models, decks))
}

/// Parse a JSON object of `id -> entry`, keeping key order
fn parse_keyed<T: DeserializeOwned>(column: &str, json: &str) -> ApkgResult<Vec<(String, T)>> {
    let value: Value = serde_json::from_str(json).map_err(|e| ApkgError::SchemaParse {
        details: format!("col.{} is not valid JSON: {}", column, e),
    })?;

    let Value::Object(entries) = value else {
        return Err(ApkgError::SchemaParse {
            details: format!("col.{} is not a JSON object", column),
        });
    };

    entries
        .into_iter()
        .map(|(id, entry)| {
            let parsed = serde_json::from_value(entry).map_err(|e| ApkgError::SchemaParse {
                details: format!("col.{} entry {}: {}", column, id, e),
            })?;
            Ok((id, parsed))
        })
        .collect()
}
