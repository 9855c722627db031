//! # SQL rendering for the streaming engine.
//!
//! DDL cannot take bind parameters, so statements are rendered as text. Two
//! rules keep that safe:
//! - identifiers are [`ObjectName`]s, already restricted to `[a-z_][a-z0-9_]*`;
//! - every literal goes through [`quote_literal`].
//!
//! Records are stored as UTF-8 JSON bytes; the view decodes them once in a
//! subquery and filters with `->>`:
//!
//! ```text
//! CREATE MATERIALIZED VIEW view_x AS
//!   SELECT 'view_x' AS view_name, 'sink_x' AS sink_name, '<uuid>' AS workflow_id,
//!          data->>'body' AS body, (data->>'timestamp')::bigint AS timestamp
//!   FROM (SELECT CONVERT_FROM(data, 'utf8')::jsonb AS data FROM events_source)
//!   WHERE data->>'direction' = 'in' AND ... AND (data->>'timestamp')::bigint >= 1700000000
//! ```

use std::fmt::Write as _;

use crate::engine::ddl::{SinkDefinition, ViewDefinition};
use crate::listener::{Field, Operand, Operator, Predicate, Term};
use crate::naming::ObjectName;

/// Quotes `value` as a SQL string literal, doubling embedded single quotes.
///
/// # Example
/// ```
/// use listenvisor::engine::sql::quote_literal;
///
/// assert_eq!(quote_literal("in"), "'in'");
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// ```
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

fn field_expr(field: Field) -> String {
    let access = format!("data->>{}", quote_literal(field.key()));
    if field.is_integer() {
        format!("({access})::bigint")
    } else {
        access
    }
}

fn operand_expr(operand: &Operand) -> String {
    match operand {
        Operand::Text(t) => quote_literal(t),
        Operand::Uuid(id) => quote_literal(&id.hyphenated().to_string()),
        Operand::Int(n) => n.to_string(),
        Operand::TextSet(set) => {
            let items: Vec<String> = set.iter().map(|t| quote_literal(t)).collect();
            format!("({})", items.join(", "))
        }
    }
}

fn term_expr(term: &Term) -> String {
    let op = match term.op {
        Operator::Eq => "=",
        Operator::In => "IN",
        Operator::GtEq => ">=",
    };
    format!(
        "{} {} {}",
        field_expr(term.field),
        op,
        operand_expr(&term.operand)
    )
}

/// Renders a predicate as a `WHERE` condition (`TRUE` when empty).
pub fn render_predicate(predicate: &Predicate) -> String {
    if predicate.is_empty() {
        return "TRUE".to_string();
    }
    predicate
        .terms()
        .iter()
        .map(term_expr)
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `CREATE MATERIALIZED VIEW` for a listener view.
pub fn create_view(def: &ViewDefinition) -> String {
    let mut sql = String::new();
    let _ = write!(
        sql,
        "CREATE MATERIALIZED VIEW {name} AS SELECT {view} AS view_name, {sink} AS sink_name, \
         {wf} AS workflow_id, {body} AS body, {ts} AS timestamp \
         FROM (SELECT CONVERT_FROM(data, 'utf8')::jsonb AS data FROM {source}) \
         WHERE {filter}",
        name = def.name,
        view = quote_literal(def.name.as_str()),
        sink = quote_literal(def.sink_name.as_str()),
        wf = quote_literal(&def.workflow_id.hyphenated().to_string()),
        body = format!("data->>{}", quote_literal("body")),
        ts = field_expr(Field::Timestamp),
        source = def.source,
        filter = render_predicate(&def.predicate),
    );
    sql
}

/// `CREATE SINK ... INTO KAFKA ... FORMAT JSON` for a listener sink.
pub fn create_sink(def: &SinkDefinition) -> String {
    format!(
        "CREATE SINK {name} FROM {from} INTO KAFKA BROKER {broker} TOPIC {topic} FORMAT JSON",
        name = def.name,
        from = def.from,
        broker = quote_literal(&def.target.broker),
        topic = quote_literal(&def.target.topic),
    )
}

/// `DROP VIEW`.
pub fn drop_view(name: &ObjectName) -> String {
    format!("DROP VIEW {name}")
}

/// `DROP SINK`.
pub fn drop_sink(name: &ObjectName) -> String {
    format!("DROP SINK {name}")
}

/// Opens a transaction with a cursor over the changes of a listener view.
pub fn declare_tail(view: &ObjectName) -> String {
    format!(
        "BEGIN; DECLARE listen_cursor CURSOR FOR TAIL \
         (SELECT view_name, sink_name, workflow_id, body, timestamp FROM {view})"
    )
}

/// Reads the next batch from the cursor opened by [`declare_tail`]; blocks until one exists.
pub const FETCH_TAIL: &str = "FETCH 1 listen_cursor";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ddl::SinkTarget;
    use crate::listener::{Selectors, build_spec};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn view_def() -> ViewDefinition {
        let spec = build_spec(Selectors {
            resource_id: Uuid::from_u128(0x1a34b742_1ec4_11ed_861d_0242ac120002),
            lead_id: Uuid::from_u128(0x1f486320_1ec4_11ed_861d_0242ac120002),
            types: vec!["tg_start".into(), "tg_send_text".into()],
            since: 1_700_000_000,
        })
        .unwrap();
        let source = ObjectName::parse("events_source").unwrap();
        ViewDefinition::for_listener(&spec, &source, Uuid::nil())
    }

    #[test]
    fn test_view_filter_in_order() {
        let sql = create_view(&view_def());
        let filter = sql.split(" WHERE ").nth(1).unwrap();
        assert_eq!(
            filter,
            "data->>'direction' = 'in' \
             AND data->>'resource_id' = '1a34b742-1ec4-11ed-861d-0242ac120002' \
             AND data->>'lead_id' = '1f486320-1ec4-11ed-861d-0242ac120002' \
             AND data->>'type' IN ('tg_send_text', 'tg_start') \
             AND (data->>'timestamp')::bigint >= 1700000000"
        );
    }

    #[test]
    fn test_view_projects_trigger_row() {
        let def = view_def();
        let sql = create_view(&def);
        assert!(sql.starts_with(&format!("CREATE MATERIALIZED VIEW {} AS SELECT", def.name)));
        assert!(sql.contains(&format!("'{}' AS view_name", def.name)));
        assert!(sql.contains(&format!("'{}' AS sink_name", def.sink_name)));
        assert!(sql.contains("'00000000-0000-0000-0000-000000000000' AS workflow_id"));
        assert!(sql.contains("data->>'body' AS body"));
        assert!(sql.contains("(data->>'timestamp')::bigint AS timestamp"));
        assert!(sql.contains("FROM events_source)"));
    }

    #[test]
    fn test_sink_statement() {
        let def = SinkDefinition {
            name: ObjectName::parse("sink_a").unwrap(),
            from: ObjectName::parse("view_a").unwrap(),
            target: SinkTarget {
                broker: "redpanda:29092".into(),
                topic: "triggers".into(),
            },
        };
        assert_eq!(
            create_sink(&def),
            "CREATE SINK sink_a FROM view_a INTO KAFKA BROKER 'redpanda:29092' TOPIC 'triggers' FORMAT JSON"
        );
    }

    #[test]
    fn test_tail_reads_trigger_columns() {
        let view = ObjectName::parse("view_a").unwrap();
        assert_eq!(
            declare_tail(&view),
            "BEGIN; DECLARE listen_cursor CURSOR FOR TAIL \
             (SELECT view_name, sink_name, workflow_id, body, timestamp FROM view_a)"
        );
    }

    #[test]
    fn test_hostile_type_is_quoted() {
        let term = Term::in_set(Field::Type, vec!["x') OR TRUE --".to_string()]);
        assert_eq!(term_expr(&term), "data->>'type' IN ('x'') OR TRUE --')");
    }

    /// Reverses `quote_literal` the way a SQL lexer would.
    fn unquote(lit: &str) -> Option<String> {
        let inner = lit.strip_prefix('\'')?.strip_suffix('\'')?;
        let mut out = String::new();
        let mut chars = inner.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.next() != Some('\'') {
                    return None;
                }
            }
            out.push(c);
        }
        Some(out)
    }

    proptest! {
        #[test]
        fn prop_quoted_literal_is_one_token(s in ".*") {
            let q = quote_literal(&s);
            prop_assert_eq!(unquote(&q), Some(s));
        }

        #[test]
        fn prop_valid_names_render_bare(name in "[a-z_][a-z0-9_]{0,40}") {
            let n = ObjectName::parse(name.clone()).unwrap();
            prop_assert_eq!(drop_view(&n), format!("DROP VIEW {name}"));
        }
    }
}
