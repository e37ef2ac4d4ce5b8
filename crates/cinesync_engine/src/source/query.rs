//! SQL generation for stream reads.
//!
//! Every query returns the same four columns:
//!
//! | column     | type      | meaning                                  |
//! |------------|-----------|------------------------------------------|
//! | `id`       | `uuid`    | ordering id of the row                   |
//! | `ts`       | `timestamptz` | ordering timestamp of the row        |
//! | `data`     | `jsonb`   | all source columns plus aggregates       |
//! | `root_ids` | `uuid[]`  | root entities the row affects            |
//!
//! Identifiers are interpolated, values are always bound. Descriptors are
//! validated to contain plain identifiers before any query is built.

use crate::stream::{EntityStream, RelationJoin, StreamKind};

/// Alias of the stream's source table inside generated queries.
const SRC: &str = "src";

/// Builds the page query of `stream`.
///
/// With a cursor the binds are `$1` cursor timestamp, `$2` cursor id,
/// `$3` window end and `$4` limit. Without one they are `$1` window end and
/// `$2` limit.
pub fn read_query(stream: &EntityStream, with_cursor: bool) -> String {
    let ts = format!("{SRC}.{}", stream.timestamp_column);
    let id = format!("{SRC}.{}", stream.id_column);

    let (data, joins) = match &stream.kind {
        StreamKind::Root { joins, .. } => (
            format!("to_jsonb({SRC}){}", aggregate_fields(joins, " || ")),
            lateral_joins(joins, &stream.id_column),
        ),
        _ => (format!("to_jsonb({SRC})"), String::new()),
    };

    let predicate = if with_cursor {
        format!("(({ts} = $1 AND {id} > $2) OR {ts} > $1) AND {ts} <= $3")
    } else {
        format!("{ts} <= $1")
    };
    let limit = if with_cursor { "$4" } else { "$2" };

    format!(
        "SELECT {id} AS id, {ts} AS ts, {data} AS data, {root_ids} AS root_ids \
         FROM {table} {SRC}{joins} \
         WHERE {predicate} \
         ORDER BY {ts}, {id} \
         LIMIT {limit}",
        root_ids = root_ids_expr(&stream.kind, &id),
        table = stream.source_relation,
    )
}

/// Builds the query re-deriving one relation of a root stream.
///
/// `$1` binds the array of root ids.
pub fn relation_query(root: &EntityStream, join: &RelationJoin) -> String {
    let joins = std::slice::from_ref(join);
    let data = format!("jsonb_build_object(){}", aggregate_fields(joins, " || "));
    format!(
        "SELECT {SRC}.{id} AS id, {SRC}.{ts} AS ts, {data} AS data, '{{}}'::uuid[] AS root_ids \
         FROM {table} {SRC}{lateral} \
         WHERE {SRC}.{id} = ANY($1) \
         ORDER BY {SRC}.{id}",
        id = root.id_column,
        ts = root.timestamp_column,
        table = root.source_relation,
        lateral = lateral_joins(joins, &root.id_column),
    )
}

/// Builds the query counting rows of `stream` with a NULL timestamp.
pub fn unstamped_query(stream: &EntityStream) -> String {
    format!(
        "SELECT count(*) FROM {table} {SRC} WHERE {SRC}.{ts} IS NULL",
        table = stream.source_relation,
        ts = stream.timestamp_column,
    )
}

fn root_ids_expr(kind: &StreamKind, id: &str) -> String {
    match kind {
        StreamKind::Root { .. } => "'{}'::uuid[]".to_string(),
        StreamKind::Association { root_key, .. } => {
            format!("array_remove(ARRAY[{SRC}.{root_key}]::uuid[], NULL)")
        }
        StreamKind::Related {
            link_relation,
            link_key,
            root_key,
            ..
        } => format!(
            "COALESCE((SELECT array_agg(DISTINCT l.{root_key}) FROM {link_relation} l \
             WHERE l.{link_key} = {id} AND l.{root_key} IS NOT NULL), '{{}}'::uuid[])"
        ),
    }
}

fn aggregate_fields(joins: &[RelationJoin], separator: &str) -> String {
    joins
        .iter()
        .enumerate()
        .map(|(n, join)| {
            format!(
                "{separator}jsonb_build_object('{}', COALESCE(j{n}.items, '[]'::jsonb))",
                join.relation.as_str()
            )
        })
        .collect()
}

fn lateral_joins(joins: &[RelationJoin], root_id: &str) -> String {
    joins
        .iter()
        .enumerate()
        .map(|(n, join)| {
            let fields: Vec<String> = join
                .target_columns
                .iter()
                .map(|c| format!("'{c}', t.{c}"))
                .chain(join.link_columns.iter().map(|c| format!("'{c}', l.{c}")))
                .collect();
            format!(
                " LEFT JOIN LATERAL (\
                 SELECT jsonb_agg(jsonb_build_object({fields})) AS items \
                 FROM {link} l JOIN {target} t ON t.id = l.{target_key} \
                 WHERE l.{root_key} = {SRC}.{root_id}\
                 ) j{n} ON TRUE",
                fields = fields.join(", "),
                link = join.link_relation,
                target = join.target_relation,
                target_key = join.link_target_key,
                root_key = join.link_root_key,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::stream::Relation;

    #[test]
    fn cursor_predicate_and_order() {
        let sql = read_query(&catalog::persons(), true);
        assert!(sql.contains(
            "((src.updated_at = $1 AND src.id > $2) OR src.updated_at > $1) AND src.updated_at <= $3"
        ));
        assert!(sql.contains("ORDER BY src.updated_at, src.id LIMIT $4"));
    }

    #[test]
    fn first_page_has_no_lower_bound() {
        let sql = read_query(&catalog::film_works(), false);
        assert!(sql.contains("WHERE src.updated_at <= $1 ORDER BY"));
        assert!(sql.ends_with("LIMIT $2"));
        assert!(!sql.contains("$3"));
    }

    #[test]
    fn unstamped_rows_are_counted_separately() {
        assert_eq!(
            unstamped_query(&catalog::person_film_works()),
            "SELECT count(*) FROM content.person_film_work src WHERE src.created_at IS NULL"
        );
    }

    #[test]
    fn lookup_root_query_has_no_joins() {
        let sql = read_query(&catalog::genre_index(), true);
        assert!(sql.contains("to_jsonb(src) AS data"));
        assert!(sql.contains("FROM content.genre src WHERE"));
        assert!(!sql.contains("LATERAL"));
    }

    #[test]
    fn root_query_aggregates_relations() {
        let sql = read_query(&catalog::film_works(), true);
        assert!(sql.contains("FROM content.film_work src"));
        assert!(sql.contains("'persons', COALESCE(j0.items, '[]'::jsonb)"));
        assert!(sql.contains("'genres', COALESCE(j1.items, '[]'::jsonb)"));
        assert!(sql.contains("'id', t.id, 'full_name', t.full_name, 'role', l.role"));
        assert!(sql.contains(
            "FROM content.genre_film_work l JOIN content.genre t ON t.id = l.genre_id"
        ));
        assert!(sql.contains("'{}'::uuid[] AS root_ids"));
    }

    #[test]
    fn association_query_points_at_root() {
        let sql = read_query(&catalog::person_film_works(), true);
        assert!(sql.contains("array_remove(ARRAY[src.film_work_id]::uuid[], NULL) AS root_ids"));
        assert!(sql.contains("src.created_at"));
    }

    #[test]
    fn related_query_fans_out_through_link() {
        let sql = read_query(&catalog::genres(), true);
        assert!(sql.contains(
            "SELECT array_agg(DISTINCT l.film_work_id) FROM content.genre_film_work l \
             WHERE l.genre_id = src.id"
        ));
    }

    #[test]
    fn relation_query_selects_roots_by_id() {
        let works = catalog::film_works();
        let join = works.join_for(Relation::Persons).unwrap();
        let sql = relation_query(&works, join);
        assert!(sql.contains("WHERE src.id = ANY($1)"));
        assert!(sql.contains("'persons', COALESCE(j0.items"));
        assert!(!sql.contains("genres"));
    }
}
