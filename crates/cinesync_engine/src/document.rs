//! Index document types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A document (full or partial) addressed to the index by id.
///
/// Writers merge `body` into the stored document with the same id, so
/// sending the same document twice leaves the index unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDocument {
    /// Stable document id.
    pub id: String,
    /// Top-level fields to write.
    pub body: Map<String, Value>,
}

impl IndexDocument {
    /// Creates a document from raw fields.
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    /// Creates a document from a serializable struct.
    ///
    /// Values that do not serialize to a JSON object yield an empty body.
    pub fn from_serialize<T: Serialize>(id: impl Into<String>, value: &T) -> Self {
        let body = match serde_json::to_value(value) {
            Ok(Value::Object(body)) => body,
            _ => Map::new(),
        };
        Self::new(id, body)
    }
}

/// A `{id, name}` pair nested inside a film document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    /// Related entity id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
}

/// Cast and crew fields of a film document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonsPatch {
    /// First director by name.
    pub director: Option<String>,
    /// Actor names, sorted.
    pub actors_names: Vec<String>,
    /// Writer names, sorted.
    pub writers_names: Vec<String>,
    /// Actors, sorted by name then id.
    pub actors: Vec<NamedRef>,
    /// Writers, sorted by name then id.
    pub writers: Vec<NamedRef>,
}

/// Genre fields of a film document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenresPatch {
    /// Genre names, sorted and unique.
    pub genre: Vec<String>,
}

/// A complete film work document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmDocument {
    /// Film work id.
    pub id: Uuid,
    /// Rating, if the source has a usable one.
    pub imdb_rating: Option<f64>,
    /// Title, empty if missing.
    pub title: String,
    /// Description, if any.
    pub description: Option<String>,
    /// Cast and crew.
    #[serde(flatten)]
    pub persons: PersonsPatch,
    /// Genres.
    #[serde(flatten)]
    pub genres: GenresPatch,
}

impl From<&FilmDocument> for IndexDocument {
    fn from(doc: &FilmDocument) -> Self {
        IndexDocument::from_serialize(doc.id.to_string(), doc)
    }
}

/// An entry of the `genres` index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreDocument {
    /// Genre id.
    pub id: Uuid,
    /// Genre name, empty if missing.
    pub name: String,
}

impl From<&GenreDocument> for IndexDocument {
    fn from(doc: &GenreDocument) -> Self {
        IndexDocument::from_serialize(doc.id.to_string(), doc)
    }
}

/// An entry of the `persons` index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDocument {
    /// Person id.
    pub id: Uuid,
    /// Full name, empty if missing.
    pub full_name: String,
}

impl From<&PersonDocument> for IndexDocument {
    fn from(doc: &PersonDocument) -> Self {
        IndexDocument::from_serialize(doc.id.to_string(), doc)
    }
}
