//! The film catalog streams.
//!
//! Tables live in the `content` schema. Entity tables carry an `updated_at`
//! column, link tables only a `created_at` column.
//!
//! Three indexes are fed: `movies` with full film documents, and the flat
//! `genres` and `persons` lookup indexes. A changed genre or person row is
//! read by two streams, one for its own document and one that patches every
//! film it belongs to.

use crate::stream::{DocumentKind, EntityStream, Relation, RelationJoin, StreamKind};

/// Name of the film work root stream.
pub const FILM_WORKS: &str = "film_works";
/// Name of the genre root stream.
pub const GENRE_INDEX: &str = "genre_index";
/// Name of the person root stream.
pub const PERSON_INDEX: &str = "person_index";

/// Index of film documents.
pub const MOVIES: &str = "movies";
/// Index of genre documents.
pub const GENRES: &str = "genres";
/// Index of person documents.
pub const PERSONS: &str = "persons";

fn persons_join() -> RelationJoin {
    RelationJoin {
        relation: Relation::Persons,
        link_relation: "content.person_film_work".to_string(),
        link_root_key: "film_work_id".to_string(),
        link_target_key: "person_id".to_string(),
        target_relation: "content.person".to_string(),
        target_columns: vec!["id".to_string(), "full_name".to_string()],
        link_columns: vec!["role".to_string()],
    }
}

fn genres_join() -> RelationJoin {
    RelationJoin {
        relation: Relation::Genres,
        link_relation: "content.genre_film_work".to_string(),
        link_root_key: "film_work_id".to_string(),
        link_target_key: "genre_id".to_string(),
        target_relation: "content.genre".to_string(),
        target_columns: vec!["id".to_string(), "name".to_string()],
        link_columns: Vec::new(),
    }
}

/// Film works with their cast, crew and genres.
pub fn film_works() -> EntityStream {
    EntityStream::new(
        FILM_WORKS,
        "content.film_work",
        "updated_at",
        StreamKind::Root {
            document: DocumentKind::FilmWork,
            index: MOVIES.to_string(),
            joins: vec![persons_join(), genres_join()],
        },
    )
}

/// Genres as `{id, name}` documents.
pub fn genre_index() -> EntityStream {
    EntityStream::new(
        GENRE_INDEX,
        "content.genre",
        "updated_at",
        StreamKind::Root {
            document: DocumentKind::Genre,
            index: GENRES.to_string(),
            joins: Vec::new(),
        },
    )
}

/// Persons as `{id, full_name}` documents.
pub fn person_index() -> EntityStream {
    EntityStream::new(
        PERSON_INDEX,
        "content.person",
        "updated_at",
        StreamKind::Root {
            document: DocumentKind::Person,
            index: PERSONS.to_string(),
            joins: Vec::new(),
        },
    )
}

/// Changed persons; refreshes the cast of every film they appear in.
pub fn persons() -> EntityStream {
    EntityStream::new(
        "persons",
        "content.person",
        "updated_at",
        StreamKind::Related {
            root: FILM_WORKS.to_string(),
            relation: Relation::Persons,
            link_relation: "content.person_film_work".to_string(),
            link_key: "person_id".to_string(),
            root_key: "film_work_id".to_string(),
        },
    )
}

/// Changed genres; refreshes the genres of every film tagged with them.
pub fn genres() -> EntityStream {
    EntityStream::new(
        "genres",
        "content.genre",
        "updated_at",
        StreamKind::Related {
            root: FILM_WORKS.to_string(),
            relation: Relation::Genres,
            link_relation: "content.genre_film_work".to_string(),
            link_key: "genre_id".to_string(),
            root_key: "film_work_id".to_string(),
        },
    )
}

/// New cast credits; refreshes the cast of the credited film.
pub fn person_film_works() -> EntityStream {
    EntityStream::new(
        "person_film_works",
        "content.person_film_work",
        "created_at",
        StreamKind::Association {
            root: FILM_WORKS.to_string(),
            relation: Relation::Persons,
            root_key: "film_work_id".to_string(),
        },
    )
}

/// New genre tags; refreshes the genres of the tagged film.
pub fn genre_film_works() -> EntityStream {
    EntityStream::new(
        "genre_film_works",
        "content.genre_film_work",
        "created_at",
        StreamKind::Association {
            root: FILM_WORKS.to_string(),
            relation: Relation::Genres,
            root_key: "film_work_id".to_string(),
        },
    )
}

/// All catalog streams, roots first so documents exist before they are patched.
pub fn default_streams() -> Vec<EntityStream> {
    vec![
        film_works(),
        genre_index(),
        person_index(),
        persons(),
        genres(),
        person_film_works(),
        genre_film_works(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_and_names() {
        let names: Vec<String> = default_streams().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "film_works",
                "genre_index",
                "person_index",
                "persons",
                "genres",
                "person_film_works",
                "genre_film_works"
            ]
        );
    }

    #[test]
    fn genre_path_uses_genre_key() {
        let works = film_works();
        let join = works.join_for(Relation::Genres).unwrap();
        assert_eq!(join.link_target_key, "genre_id");

        match genres().kind {
            StreamKind::Related { link_key, .. } => assert_eq!(link_key, "genre_id"),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn each_root_feeds_its_own_index() {
        let indexes: Vec<(String, String)> = default_streams()
            .into_iter()
            .filter_map(|s| s.index().map(|i| (s.name.clone(), i.to_string())))
            .collect();
        assert_eq!(
            indexes,
            vec![
                (FILM_WORKS.to_string(), MOVIES.to_string()),
                (GENRE_INDEX.to_string(), GENRES.to_string()),
                (PERSON_INDEX.to_string(), PERSONS.to_string()),
            ]
        );
        assert!(genre_index().join_clauses().is_empty());
    }

    #[test]
    fn every_stream_validates() {
        for stream in default_streams() {
            stream.validate().unwrap();
        }
    }
}
