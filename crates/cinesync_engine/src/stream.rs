//! Entity stream descriptors.
//!
//! A stream is one independently cursored flow from a source relation into
//! the index. Streams come in three shapes:
//!
//! - **Root** streams produce full documents (film works, genres, persons)
//!   into their own index
//! - **Association** streams watch a link table (`person_film_work`) whose
//!   rows point at exactly one root entity
//! - **Related** streams watch an entity table (`person`) and resolve every
//!   root entity linked to a changed row through a link table
//!
//! Association and related streams never create documents. They only ask
//! for one nested relation of an existing root document to be re-derived.

use crate::error::{SyncError, SyncResult};
use std::fmt;

/// A nested relation of a root document that can be re-derived on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Cast and crew: `director`, `actors`, `writers` and their name lists.
    Persons,
    /// Genre names.
    Genres,
}

impl Relation {
    /// Key under which the source returns the aggregated relation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Persons => "persons",
            Relation::Genres => "genres",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The document schema a root stream produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A film work document.
    FilmWork,
    /// A `{id, name}` genre document.
    Genre,
    /// A `{id, full_name}` person document.
    Person,
}

/// How a root relation aggregates one nested relation.
///
/// Rendered as a lateral join:
/// `link_relation.link_root_key = root.id` and
/// `target_relation.id = link_relation.link_target_key`, aggregating
/// `target_columns` and `link_columns` into one JSON object per edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationJoin {
    /// The nested relation this join produces.
    pub relation: Relation,
    /// Link (many-to-many) table.
    pub link_relation: String,
    /// Column of the link table holding the root id.
    pub link_root_key: String,
    /// Column of the link table holding the target id.
    pub link_target_key: String,
    /// Target entity table.
    pub target_relation: String,
    /// Target columns copied into each edge object.
    pub target_columns: Vec<String>,
    /// Link columns copied into each edge object.
    pub link_columns: Vec<String>,
}

/// The shape of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    /// Produces full documents with nested relations.
    Root {
        /// Document schema.
        document: DocumentKind,
        /// Target index of the documents.
        index: String,
        /// Nested relations assembled for every document.
        joins: Vec<RelationJoin>,
    },
    /// A link table; every row affects the root in `root_key`.
    Association {
        /// Name of the root stream.
        root: String,
        /// Relation of the root document to re-derive.
        relation: Relation,
        /// Column holding the root id.
        root_key: String,
    },
    /// An entity table linked to roots through `link_relation`.
    Related {
        /// Name of the root stream.
        root: String,
        /// Relation of the root document to re-derive.
        relation: Relation,
        /// Link table.
        link_relation: String,
        /// Column of the link table holding this entity's id.
        link_key: String,
        /// Column of the link table holding the root id.
        root_key: String,
    },
}

impl StreamKind {
    /// Returns the root stream name and relation of a dependent stream.
    pub fn root_relation(&self) -> Option<(&str, Relation)> {
        match self {
            StreamKind::Root { .. } => None,
            StreamKind::Association { root, relation, .. }
            | StreamKind::Related { root, relation, .. } => Some((root.as_str(), *relation)),
        }
    }

    /// Returns true for root streams.
    pub fn is_root(&self) -> bool {
        matches!(self, StreamKind::Root { .. })
    }
}

/// Static descriptor of one synchronizable source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityStream {
    /// Unique stream name, also the state store key.
    pub name: String,
    /// Qualified source table, e.g. `content.film_work`.
    pub source_relation: String,
    /// Column ordering the stream together with `id_column`.
    pub timestamp_column: String,
    /// Unique UUID column breaking timestamp ties.
    pub id_column: String,
    /// Stream shape.
    pub kind: StreamKind,
    /// Maximum rows per batch.
    pub batch_size: u32,
}

impl EntityStream {
    /// Creates a stream with `id` as id column and a page size of 100.
    pub fn new(
        name: impl Into<String>,
        source_relation: impl Into<String>,
        timestamp_column: impl Into<String>,
        kind: StreamKind,
    ) -> Self {
        Self {
            name: name.into(),
            source_relation: source_relation.into(),
            timestamp_column: timestamp_column.into(),
            id_column: "id".to_string(),
            kind,
            batch_size: 100,
        }
    }

    /// Sets the page size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the timestamp column.
    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = column.into();
        self
    }

    /// Target index of a root stream. Dependent streams write into the
    /// index of their root.
    pub fn index(&self) -> Option<&str> {
        match &self.kind {
            StreamKind::Root { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Sets the target index of a root stream; ignored for other shapes.
    pub fn with_index(mut self, name: impl Into<String>) -> Self {
        if let StreamKind::Root { index, .. } = &mut self.kind {
            *index = name.into();
        }
        self
    }

    /// Nested relations assembled by a root stream; empty for other shapes.
    pub fn join_clauses(&self) -> &[RelationJoin] {
        match &self.kind {
            StreamKind::Root { joins, .. } => joins,
            _ => &[],
        }
    }

    /// Returns the join producing `relation`, if this root declares one.
    pub fn join_for(&self, relation: Relation) -> Option<&RelationJoin> {
        self.join_clauses().iter().find(|j| j.relation == relation)
    }

    /// Validates the descriptor.
    ///
    /// Every table and column name ends up inside generated SQL, so each
    /// must be a plain (optionally schema-qualified) identifier.
    pub fn validate(&self) -> SyncResult<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::Config("stream name is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config(format!(
                "stream {} has a zero batch size",
                self.name
            )));
        }

        let mut names: Vec<&str> = vec![
            self.source_relation.as_str(),
            self.timestamp_column.as_str(),
            self.id_column.as_str(),
        ];
        match &self.kind {
            StreamKind::Root { index, joins, .. } => {
                if !is_index_name(index) {
                    return Err(SyncError::Config(format!(
                        "stream {} has an invalid index name: {:?}",
                        self.name, index
                    )));
                }
                for join in joins {
                    names.extend([
                        join.link_relation.as_str(),
                        join.link_root_key.as_str(),
                        join.link_target_key.as_str(),
                        join.target_relation.as_str(),
                    ]);
                    names.extend(join.target_columns.iter().map(String::as_str));
                    names.extend(join.link_columns.iter().map(String::as_str));
                }
            }
            StreamKind::Association { root_key, .. } => names.push(root_key.as_str()),
            StreamKind::Related {
                link_relation,
                link_key,
                root_key,
                ..
            } => names.extend([link_relation.as_str(), link_key.as_str(), root_key.as_str()]),
        }

        match names.into_iter().find(|n| !is_identifier(n)) {
            Some(bad) => Err(SyncError::Config(format!(
                "stream {} has an invalid identifier: {:?}",
                self.name, bad
            ))),
            None => Ok(()),
        }
    }
}

/// Returns true for `name` or `schema.name` made of `[A-Za-z_][A-Za-z0-9_]*` parts.
pub(crate) fn is_identifier(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Index names are lowercase and free of whitespace and path characters.
fn is_index_name(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with(['-', '_', '+'])
        && value.chars().all(|c| {
            !c.is_ascii_uppercase()
                && !c.is_whitespace()
                && !matches!(c, '\\' | '/' | '*' | '?' | '"' | '<' | '>' | '|' | ',' | '#' | ':')
        })
}
