//! Data models for deck archives
//!
//! Defines the structures read out of a collection: note types (models),
//! decks, notes and cards. Models and decks come from the JSON blobs in the
//! `col` table; notes and cards come from their own tables.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Separator between field values in a note's `flds` column
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// A note type: the ordered set of fields shared by a family of notes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Model {
    /// Stringified numeric id (the key in the `models` blob)
    #[serde(skip_deserializing)]
    pub id: String,
    /// Display name, also used as the sheet name on export
    pub name: String,
    /// Field definitions as stored (not necessarily sorted)
    #[serde(rename = "flds", default)]
    pub fields: Vec<ModelField>,
}

impl Model {
    /// Field names sorted by their template position
    pub fn field_names(&self) -> Vec<String> {
        let mut fields: Vec<&ModelField> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.ord);
        fields.into_iter().map(|f| f.name.clone()).collect()
    }

    /// Number of fields a note of this type carries
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// A single field definition within a model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelField {
    pub name: String,
    pub ord: i64,
}

/// A named grouping of cards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deck {
    /// Stringified numeric id (the key in the `decks` blob)
    #[serde(skip_deserializing)]
    pub id: String,
    pub name: String,
    /// Remaining deck attributes, kept as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Field values of a note keyed by their model's field names
///
/// Keeps the model's field order; serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRecord(Vec<(String, String)>);

impl FieldRecord {
    /// Pair field names with values. Both sides must already have equal length.
    pub(crate) fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// Look up a value by field name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(field name, value)` pairs in model order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for FieldRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A flashcard content record joined with its model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Note {
    pub id: i64,
    pub guid: String,
    /// Model id
    pub mid: i64,
    /// Resolved model name
    pub model: String,
    pub modified: DateTime<Utc>,
    /// Raw space-delimited tag string, as stored
    pub tags: String,
    /// Raw field values joined by `FIELD_SEPARATOR`, as stored
    pub flds: String,
    /// Field name to value, in model field order
    pub record: FieldRecord,
}

impl Note {
    /// Field values in on-disk order
    pub fn field_values(&self) -> Vec<&str> {
        split_fields(&self.flds)
    }

    /// Tags as a list
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags.split_whitespace().collect()
    }
}

/// A card: one template position of a note, placed in a deck
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Card {
    pub id: i64,
    /// Note id
    pub nid: i64,
    /// Deck id
    pub did: i64,
    /// Template position
    pub ord: i64,
    pub modified: DateTime<Utc>,
    #[serde(rename = "type")]
    pub card_type: i64,
    pub queue: i64,
    pub due: i64,
    pub interval: i64,
    pub reps: i64,
    pub lapses: i64,
    pub note: Note,
    pub deck: Deck,
}

/// Split a `flds` column into its values
pub fn split_fields(flds: &str) -> Vec<&str> {
    flds.split(FIELD_SEPARATOR).collect()
}

/// Convert a seconds timestamp from the collection into a `DateTime`
pub(crate) fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(fields: &[(&str, i64)]) -> Model {
        Model {
            id: "1".to_string(),
            name: "Basic".to_string(),
            fields: fields
                .iter()
                .map(|(name, ord)| ModelField {
                    name: name.to_string(),
                    ord: *ord,
                })
                .collect(),
        }
    }

    #[test]
    fn test_field_names_sorted_by_ord() {
        let m = model(&[("Back", 1), ("Extra", 2), ("Front", 0)]);
        assert_eq!(m.field_names(), vec!["Front", "Back", "Extra"]);
        assert_eq!(m.field_count(), 3);
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields("a\u{1f}b\u{1f}"), vec!["a", "b", ""]);
        assert_eq!(split_fields(""), vec![""]);
    }

    #[test]
    fn test_model_deserialize_ignores_extra_keys() {
        let json = r#"{"id": 1342697561419, "name": "Basic", "type": 0,
            "flds": [{"name": "Front", "ord": 0, "sticky": false}, {"name": "Back", "ord": 1}]}"#;
        let m: Model = serde_json::from_str(json).unwrap();

        assert_eq!(m.name, "Basic");
        assert!(m.id.is_empty());
        assert_eq!(m.field_names(), vec!["Front", "Back"]);
    }

    #[test]
    fn test_deck_keeps_extra_attributes() {
        let json = r#"{"id": 1, "name": "Default", "collapsed": false, "desc": ""}"#;
        let d: Deck = serde_json::from_str(json).unwrap();

        assert_eq!(d.name, "Default");
        assert!(d.extra.contains_key("collapsed"));
        assert!(!d.extra.contains_key("name"));
    }

    #[test]
    fn test_field_record_serializes_as_ordered_object() {
        let record = FieldRecord::from_pairs(vec![
            ("Front".to_string(), "hola".to_string()),
            ("Back".to_string(), "hello".to_string()),
        ]);

        assert_eq!(record.get("Back"), Some("hello"));
        assert_eq!(record.get("Missing"), None);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"Front":"hola","Back":"hello"}"#
        );
    }

    #[test]
    fn test_timestamp_conversion() {
        assert_eq!(timestamp(0), DateTime::UNIX_EPOCH);
        assert_eq!(timestamp(86_400).format("%Y-%m-%d").to_string(), "1970-01-02");
    }
}
