//! Document mapping.
//!
//! Pure functions from source rows to index documents, selected by the
//! stream's shape. Mapping never fails: missing or malformed optional data
//! becomes an empty or neutral value so one bad row cannot abort a batch.
//! Nested lists are sorted, which makes mapping the same rows twice produce
//! identical documents.

use crate::document::{
    FilmDocument, GenreDocument, GenresPatch, IndexDocument, NamedRef, PersonDocument,
    PersonsPatch,
};
use crate::row::RawRow;
use crate::stream::{DocumentKind, EntityStream, Relation, StreamKind};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// What one batch asks of the index.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentAction {
    /// Write a full document.
    Upsert(IndexDocument),
    /// Re-derive one nested relation of an existing root document.
    Refresh {
        /// Target root document.
        root_id: Uuid,
        /// Relation to re-derive.
        relation: Relation,
    },
}

/// Maps one batch of `stream` rows.
///
/// Root rows become full documents. Association and related rows fan out to
/// one refresh request per affected root id, deduplicated in first-seen
/// order.
pub fn map_batch(stream: &EntityStream, rows: &[RawRow]) -> Vec<DocumentAction> {
    match &stream.kind {
        StreamKind::Root { document, .. } => rows
            .iter()
            .map(|row| DocumentAction::Upsert(map_root_row(*document, row)))
            .collect(),
        StreamKind::Association { relation, .. } | StreamKind::Related { relation, .. } => {
            let mut seen = HashSet::new();
            rows.iter()
                .flat_map(|row| row.root_ids.iter().copied())
                .filter(|root_id| seen.insert(*root_id))
                .map(|root_id| DocumentAction::Refresh {
                    root_id,
                    relation: *relation,
                })
                .collect()
        }
    }
}

fn map_root_row(kind: DocumentKind, row: &RawRow) -> IndexDocument {
    match kind {
        DocumentKind::FilmWork => IndexDocument::from(&film_document(row)),
        DocumentKind::Genre => IndexDocument::from(&genre_document(row)),
        DocumentKind::Person => IndexDocument::from(&person_document(row)),
    }
}

/// Maps re-derived relation rows (one per root id) to partial documents.
pub fn map_relation_rows(relation: Relation, rows: &[RawRow]) -> Vec<IndexDocument> {
    rows.iter()
        .map(|row| {
            let id = row.id.to_string();
            let value = row.get(relation.as_str());
            match relation {
                Relation::Persons => IndexDocument::from_serialize(id, &persons_patch(value)),
                Relation::Genres => IndexDocument::from_serialize(id, &genres_patch(value)),
            }
        })
        .collect()
}

/// Builds a film document from a `film_work` row with aggregated
/// `persons` and `genres`.
pub fn film_document(row: &RawRow) -> FilmDocument {
    FilmDocument {
        id: row.id,
        imdb_rating: row
            .get("rating")
            .or_else(|| row.get("imdb_rating"))
            .and_then(number),
        title: row.get("title").and_then(text).unwrap_or_default(),
        description: row.get("description").and_then(text),
        persons: persons_patch(row.get("persons")),
        genres: genres_patch(row.get("genres")),
    }
}

/// Builds a genre document from a `genre` row.
pub fn genre_document(row: &RawRow) -> GenreDocument {
    GenreDocument {
        id: row.id,
        name: row.get("name").and_then(text).unwrap_or_default(),
    }
}

/// Builds a person document from a `person` row.
pub fn person_document(row: &RawRow) -> PersonDocument {
    PersonDocument {
        id: row.id,
        full_name: row.get("full_name").and_then(text).unwrap_or_default(),
    }
}

/// Builds the cast and crew fields from `[{id, full_name, role}, ...]`.
///
/// Entries without a valid id or a known role are skipped.
pub fn persons_patch(value: Option<&Value>) -> PersonsPatch {
    let mut directors = Vec::new();
    let mut actors = Vec::new();
    let mut writers = Vec::new();

    for item in value.and_then(Value::as_array).into_iter().flatten() {
        let Some(id) = item.get("id").and_then(uuid) else {
            continue;
        };
        let name = item
            .get("full_name")
            .or_else(|| item.get("name"))
            .and_then(text)
            .unwrap_or_default();
        let role = item
            .get("role")
            .and_then(Value::as_str)
            .map(|r| r.trim().to_ascii_lowercase());

        let person = NamedRef { id, name };
        match role.as_deref() {
            Some("director") => directors.push(person),
            Some("actor") => actors.push(person),
            Some("writer") => writers.push(person),
            _ => {}
        }
    }

    for group in [&mut directors, &mut actors, &mut writers] {
        sort_people(group);
    }

    PersonsPatch {
        director: directors
            .into_iter()
            .map(|p| p.name)
            .find(|name| !name.is_empty()),
        actors_names: names(&actors),
        writers_names: names(&writers),
        actors,
        writers,
    }
}

/// Builds the genre fields from `[{id, name}, ...]` or `["name", ...]`.
pub fn genres_patch(value: Option<&Value>) -> GenresPatch {
    let mut genre: Vec<String> = value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| match item {
            Value::Object(_) => item.get("name").and_then(text),
            other => text(other),
        })
        .collect();
    genre.sort();
    genre.dedup();
    GenresPatch { genre }
}

fn sort_people(people: &mut Vec<NamedRef>) {
    people.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
    let mut seen = HashSet::new();
    people.retain(|p| seen.insert(p.id));
}

fn names(people: &[NamedRef]) -> Vec<String> {
    people
        .iter()
        .filter(|p| !p.name.is_empty())
        .map(|p| p.name.clone())
        .collect()
}

fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn uuid(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn row(n: u128) -> RawRow {
        RawRow::new(id(n), Utc.timestamp_opt(1_000, 0).unwrap())
    }

    #[test]
    fn film_row_maps_to_full_document() {
        let film = row(1)
            .with_field("title", "Star Wars")
            .with_field("description", "A long time ago")
            .with_field("rating", 8.6)
            .with_field(
                "persons",
                json!([
                    {"id": id(12).to_string(), "full_name": "Mark Hamill", "role": "actor"},
                    {"id": id(11).to_string(), "full_name": "Carrie Fisher", "role": "actor"},
                    {"id": id(13).to_string(), "full_name": "George Lucas", "role": "director"},
                    {"id": id(13).to_string(), "full_name": "George Lucas", "role": "writer"},
                ]),
            )
            .with_field(
                "genres",
                json!([{"id": id(21).to_string(), "name": "Sci-Fi"}, {"id": id(22).to_string(), "name": "Action"}]),
            );

        let doc = film_document(&film);
        assert_eq!(doc.id, id(1));
        assert_eq!(doc.title, "Star Wars");
        assert_eq!(doc.imdb_rating, Some(8.6));
        assert_eq!(doc.persons.director.as_deref(), Some("George Lucas"));
        assert_eq!(doc.persons.actors_names, vec!["Carrie Fisher", "Mark Hamill"]);
        assert_eq!(doc.persons.writers_names, vec!["George Lucas"]);
        assert_eq!(doc.persons.actors[0].id, id(11));
        assert_eq!(doc.genres.genre, vec!["Action", "Sci-Fi"]);
    }

    #[test]
    fn malformed_optional_data_degrades() {
        let film = row(2)
            .with_field("rating", "not a number")
            .with_field("description", "   ")
            .with_field(
                "persons",
                json!([
                    {"id": "garbage", "full_name": "Nobody", "role": "actor"},
                    {"id": id(5).to_string(), "role": "actor"},
                    {"id": id(6).to_string(), "full_name": "Grip", "role": "grip"},
                    "not an object",
                ]),
            )
            .with_field("genres", json!({"unexpected": "shape"}));

        let doc = film_document(&film);
        assert_eq!(doc.title, "");
        assert_eq!(doc.imdb_rating, None);
        assert_eq!(doc.description, None);
        assert_eq!(doc.persons.actors.len(), 1);
        assert!(doc.persons.actors_names.is_empty());
        assert!(doc.persons.writers.is_empty());
        assert!(doc.genres.genre.is_empty());
    }

    #[test]
    fn numeric_rating_string_is_parsed() {
        let doc = film_document(&row(3).with_field("rating", "7.25"));
        assert_eq!(doc.imdb_rating, Some(7.25));
    }

    #[test]
    fn genre_and_person_rows_map_to_lookup_documents() {
        let genre = row(4)
            .with_field("name", " Western ")
            .with_field("description", "Cowboys");
        let actions = map_batch(&catalog::genre_index(), &[genre]);
        match &actions[..] {
            [DocumentAction::Upsert(doc)] => {
                assert_eq!(doc.id, id(4).to_string());
                assert_eq!(doc.body["name"], "Western");
                assert!(!doc.body.contains_key("description"));
            }
            other => panic!("unexpected actions {:?}", other),
        }

        let person = person_document(&row(5).with_field("full_name", "Harrison Ford"));
        assert_eq!(person.full_name, "Harrison Ford");
        assert_eq!(person_document(&row(6)).full_name, "");
    }

    #[test]
    fn mapping_is_deterministic() {
        let a = row(1).with_field(
            "persons",
            json!([
                {"id": id(2).to_string(), "full_name": "B", "role": "actor"},
                {"id": id(1).to_string(), "full_name": "A", "role": "actor"},
            ]),
        );
        let b = row(1).with_field(
            "persons",
            json!([
                {"id": id(1).to_string(), "full_name": "A", "role": "actor"},
                {"id": id(2).to_string(), "full_name": "B", "role": "actor"},
            ]),
        );

        let stream = catalog::film_works();
        assert_eq!(map_batch(&stream, &[a]), map_batch(&stream, &[b]));
    }

    #[test]
    fn association_edge_targets_root_document() {
        let film = id(0xF);
        let person = id(0xA);
        let edge = row(0xE)
            .with_field("film_work_id", film.to_string())
            .with_field("person_id", person.to_string())
            .with_field("role", "actor")
            .with_root_ids(vec![film]);

        let actions = map_batch(&catalog::person_film_works(), &[edge]);
        assert_eq!(
            actions,
            vec![DocumentAction::Refresh {
                root_id: film,
                relation: Relation::Persons,
            }]
        );
    }

    #[test]
    fn related_rows_fan_out_without_duplicates() {
        let rows = vec![
            row(1).with_root_ids(vec![id(100), id(101)]),
            row(2).with_root_ids(vec![id(101), id(102)]),
            row(3),
        ];

        let actions = map_batch(&catalog::genres(), &rows);
        let targets: Vec<Uuid> = actions
            .iter()
            .map(|a| match a {
                DocumentAction::Refresh { root_id, relation } => {
                    assert_eq!(*relation, Relation::Genres);
                    *root_id
                }
                other => panic!("unexpected action {:?}", other),
            })
            .collect();
        assert_eq!(targets, vec![id(100), id(101), id(102)]);
    }

    #[test]
    fn relation_rows_become_partial_documents() {
        let rows = vec![
            row(7).with_field("genres", json!([{"id": id(1).to_string(), "name": "Drama"}])),
            row(8).with_field("genres", json!([])),
        ];

        let docs = map_relation_rows(Relation::Genres, &rows);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, id(7).to_string());
        assert_eq!(docs[0].body["genre"], json!(["Drama"]));
        assert_eq!(docs[1].body["genre"], json!([]));
        assert!(!docs[0].body.contains_key("title"));

        let docs = map_relation_rows(Relation::Persons, &[row(9)]);
        let mut keys: Vec<&String> = docs[0].body.keys().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["actors", "actors_names", "director", "writers", "writers_names"]
        );
    }
}
