//! Tabular export
//!
//! Projects cards into one table per note type, ready to hand to a
//! spreadsheet writer: the first row is an optional header (field names,
//! `tags`, and optionally `deck`), followed by one row per card.

use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::error::ApkgResult;
use crate::reader::ApkgReader;

/// Header cell for the tags column
pub const TAGS_HEADER: &str = "tags";
/// Header cell for the deck column
pub const DECK_HEADER: &str = "deck";

/// A table: rows of string cells
pub type Rows = Vec<Vec<String>>;

/// What to include in an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Start every table with a header row
    pub include_header: bool,
    /// Append the deck name to every row
    pub include_deck: bool,
    /// Template positions to export, scanned in this order
    pub template_positions: Vec<i64>,
    /// Leave out note types that end up with no data rows
    pub drop_empty_models: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_header: true,
            include_deck: true,
            template_positions: vec![0],
            drop_empty_models: true,
        }
    }
}

/// A table for one note type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub rows: Rows,
    has_header: bool,
}

impl Table {
    /// Number of rows excluding the header
    pub fn data_len(&self) -> usize {
        self.rows.len() - usize::from(self.has_header)
    }

    pub fn header(&self) -> Option<&[String]> {
        if self.has_header {
            self.rows.first().map(Vec::as_slice)
        } else {
            None
        }
    }
}

/// Tables keyed by note type name, in insertion order
///
/// Serializes as a JSON object of `name -> rows`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportResult {
    tables: Vec<Table>,
    index: HashMap<String, usize>,
}

impl ExportResult {
    pub fn get(&self, name: &str) -> Option<&Rows> {
        self.index.get(name).map(|&i| &self.tables[i].rows)
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Table names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Start a table with a header row, replacing any table of the same name
    fn seed(&mut self, name: &str, header: Vec<String>) {
        let table = Table {
            name: name.to_string(),
            rows: vec![header],
            has_header: true,
        };
        match self.index.get(name) {
            Some(&i) => self.tables[i] = table,
            None => {
                self.index.insert(name.to_string(), self.tables.len());
                self.tables.push(table);
            }
        }
    }

    /// Append a data row, creating the table on first use
    fn push(&mut self, name: &str, row: Vec<String>) {
        let i = match self.index.get(name) {
            Some(&i) => i,
            None => {
                self.index.insert(name.to_string(), self.tables.len());
                self.tables.push(Table {
                    name: name.to_string(),
                    rows: Vec::new(),
                    has_header: false,
                });
                self.tables.len() - 1
            }
        };
        self.tables[i].rows.push(row);
    }

    fn drop_empty(&mut self) {
        self.tables.retain(|t| t.data_len() > 0);
        self.index = self
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
    }
}

impl Serialize for ExportResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for table in &self.tables {
            map.serialize_entry(&table.name, &table.rows)?;
        }
        map.end()
    }
}

/// Build per-model tables from the cards of an open archive
pub fn export_tables(reader: &ApkgReader, options: &ExportOptions) -> ApkgResult<ExportResult> {
    let mut result = ExportResult::default();

    if options.include_header {
        for model in reader.models() {
            let mut header = model.field_names();
            header.push(TAGS_HEADER.to_string());
            if options.include_deck {
                header.push(DECK_HEADER.to_string());
            }
            result.seed(&model.name, header);
        }
    }

    for &ord in &options.template_positions {
        let mut count = 0usize;
        for card in reader.cards_by_ord(ord) {
            let card = card?;
            let note = &card.note;

            // flds is already stored in field order; no re-sort needed
            let mut row: Vec<String> = note.field_values().into_iter().map(String::from).collect();
            row.push(note.tags.clone());
            if options.include_deck {
                row.push(card.deck.name.clone());
            }

            result.push(&note.model, row);
            count += 1;
        }
        debug!("Exported {} card(s) at template position {}", count, ord);
    }

    if options.drop_empty_models {
        result.drop_empty();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_default_options() {
        let options = ExportOptions::default();
        assert!(options.include_header);
        assert!(options.include_deck);
        assert_eq!(options.template_positions, vec![0]);
        assert!(options.drop_empty_models);
    }

    #[test]
    fn test_options_partial_deserialize() {
        let options: ExportOptions = toml::from_str("include_deck = false").unwrap();
        assert!(!options.include_deck);
        assert!(options.include_header);
        assert_eq!(options.template_positions, vec![0]);
    }

    #[test]
    fn test_result_keeps_insertion_order() {
        let mut result = ExportResult::default();
        result.seed("Zeta", row(&["Q", "tags"]));
        result.seed("Alpha", row(&["A", "tags"]));
        result.push("Alpha", row(&["a", ""]));
        result.push("Later", row(&["x"]));

        let names: Vec<&str> = result.names().collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Later"]);
        assert_eq!(result.table("Alpha").unwrap().data_len(), 1);
        assert!(result.table("Later").unwrap().header().is_none());
    }

    #[test]
    fn test_drop_empty_keeps_single_data_row_without_header() {
        let mut result = ExportResult::default();
        result.seed("Empty", row(&["A", "tags"]));
        result.push("Headless", row(&["only row"]));

        result.drop_empty();

        assert!(result.get("Empty").is_none());
        assert_eq!(result.get("Headless").unwrap().len(), 1);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_reseeding_replaces_table() {
        let mut result = ExportResult::default();
        result.seed("Dup", row(&["A"]));
        result.push("Dup", row(&["a"]));
        result.seed("Dup", row(&["B"]));

        assert_eq!(result.len(), 1);
        assert_eq!(result.get("Dup").unwrap(), &vec![row(&["B"])]);
    }

    #[test]
    fn test_serialize_as_ordered_object() {
        let mut result = ExportResult::default();
        result.seed("B", row(&["f", "tags"]));
        result.push("B", row(&["1", "t"]));
        result.push("A", row(&["2", ""]));

        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"B":[["f","tags"],["1","t"]],"A":[["2",""]]}"#
        );
    }
}
